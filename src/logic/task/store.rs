//! SQLite task store.
//!
//! All state changes go through guarded UPDATE statements that name the
//! states they may leave, so an illegal transition (including any write
//! to a terminal task) turns into an affected-row count of zero and is
//! reported as a no-op instead of corrupting the row.

use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use log::{debug, warn};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::logic::score::Verdict;

use super::types::{Task, TaskState};

pub struct TaskStore {
    conn: Mutex<Connection>,
}

impl TaskStore {
    pub fn open(path: &Path) -> Result<Self> {
        Self::init(Connection::open(path)?)
    }

    pub fn in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS tasks (
                id          TEXT PRIMARY KEY,
                filename    TEXT NOT NULL,
                state       TEXT NOT NULL,
                tracking_id INTEGER,
                verdict     TEXT,
                reason      TEXT,
                created_at  TEXT NOT NULL,
                updated_at  TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_tasks_tracking ON tasks (tracking_id);
            CREATE INDEX IF NOT EXISTS idx_tasks_state ON tasks (state);",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn insert(&self, task: &Task) -> Result<()> {
        let verdict = encode_verdict(task.verdict.as_ref())?;
        self.conn.lock().execute(
            "INSERT INTO tasks (id, filename, state, tracking_id, verdict, reason, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                task.id.to_string(),
                task.filename,
                task.state.as_str(),
                task.tracking_id.map(|t| t as i64),
                verdict,
                task.reason,
                task.created_at.to_rfc3339(),
                task.updated_at.to_rfc3339(),
            ],
        )?;
        debug!("Inserted task {} ({})", task.id, task.filename);
        Ok(())
    }

    pub fn get(&self, id: Uuid) -> Result<Option<Task>> {
        self.conn
            .lock()
            .query_row(
                "SELECT id, filename, state, tracking_id, verdict, reason, created_at, updated_at
                 FROM tasks WHERE id = ?1",
                params![id.to_string()],
                row_to_task,
            )
            .optional()
            .map_err(Error::from)
    }

    pub fn find_by_tracking_id(&self, tracking_id: u64) -> Result<Option<Task>> {
        self.conn
            .lock()
            .query_row(
                "SELECT id, filename, state, tracking_id, verdict, reason, created_at, updated_at
                 FROM tasks WHERE tracking_id = ?1 ORDER BY created_at DESC LIMIT 1",
                params![tracking_id as i64],
                row_to_task,
            )
            .optional()
            .map_err(Error::from)
    }

    pub fn list(&self) -> Result<Vec<Task>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, filename, state, tracking_id, verdict, reason, created_at, updated_at
             FROM tasks ORDER BY created_at",
        )?;
        let tasks = stmt
            .query_map([], row_to_task)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(tasks)
    }

    /// Uploaded -> Processing, recording the sandbox tracking id.
    /// Returns false when the task was not in Uploaded.
    pub fn mark_processing(&self, id: Uuid, tracking_id: u64) -> Result<bool> {
        let changed = self.conn.lock().execute(
            "UPDATE tasks SET state = 'processing', tracking_id = ?2, updated_at = ?3
             WHERE id = ?1 AND state = 'uploaded'",
            params![id.to_string(), tracking_id as i64, Utc::now().to_rfc3339()],
        )?;
        Ok(changed == 1)
    }

    /// Processing -> Completed with the final verdict. Returns false
    /// when the task was not in Processing (duplicate callbacks land
    /// here and fall through harmlessly).
    pub fn mark_completed(&self, id: Uuid, verdict: &Verdict) -> Result<bool> {
        let encoded = encode_verdict(Some(verdict))?;
        let changed = self.conn.lock().execute(
            "UPDATE tasks SET state = 'completed', verdict = ?2, updated_at = ?3
             WHERE id = ?1 AND state = 'processing'",
            params![id.to_string(), encoded, Utc::now().to_rfc3339()],
        )?;
        if changed == 0 {
            warn!("Completion for task {} ignored (not processing)", id);
        }
        Ok(changed == 1)
    }

    /// Uploaded or Processing -> Failed with a reason. Returns false
    /// when the task was already terminal.
    pub fn mark_failed(&self, id: Uuid, reason: &str) -> Result<bool> {
        let changed = self.conn.lock().execute(
            "UPDATE tasks SET state = 'failed', reason = ?2, updated_at = ?3
             WHERE id = ?1 AND state IN ('uploaded', 'processing')",
            params![id.to_string(), reason, Utc::now().to_rfc3339()],
        )?;
        if changed == 0 {
            warn!("Failure for task {} ignored (already terminal)", id);
        }
        Ok(changed == 1)
    }

    /// Fail every Processing task whose last update is older than the
    /// threshold. Returns how many tasks were expired.
    pub fn expire_stale(&self, older_than_secs: u64) -> Result<usize> {
        let cutoff: DateTime<Utc> = Utc::now() - Duration::seconds(older_than_secs as i64);
        let changed = self.conn.lock().execute(
            "UPDATE tasks SET state = 'failed', reason = 'processing expired', updated_at = ?2
             WHERE state = 'processing' AND updated_at < ?1",
            params![cutoff.to_rfc3339(), Utc::now().to_rfc3339()],
        )?;
        if changed > 0 {
            warn!("Expired {} stale processing tasks", changed);
        }
        Ok(changed)
    }
}

fn encode_verdict(verdict: Option<&Verdict>) -> Result<Option<String>> {
    verdict
        .map(|v| serde_json::to_string(v).map_err(|e| Error::Storage(e.to_string())))
        .transpose()
}

fn row_to_task(row: &Row<'_>) -> rusqlite::Result<Task> {
    let id: String = row.get(0)?;
    let state: String = row.get(2)?;
    let tracking_id: Option<i64> = row.get(3)?;
    let verdict: Option<String> = row.get(4)?;
    let created_at: String = row.get(6)?;
    let updated_at: String = row.get(7)?;

    let parse_err = |msg: String| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            msg.into(),
        )
    };

    Ok(Task {
        id: Uuid::parse_str(&id).map_err(|e| parse_err(e.to_string()))?,
        filename: row.get(1)?,
        state: TaskState::parse(&state)
            .ok_or_else(|| parse_err(format!("unknown task state '{}'", state)))?,
        tracking_id: tracking_id.map(|t| t as u64),
        verdict: verdict
            .map(|v| serde_json::from_str(&v).map_err(|e| parse_err(e.to_string())))
            .transpose()?,
        reason: row.get(5)?,
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map_err(|e| parse_err(e.to_string()))?
            .with_timezone(&Utc),
        updated_at: DateTime::parse_from_rfc3339(&updated_at)
            .map_err(|e| parse_err(e.to_string()))?
            .with_timezone(&Utc),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::model::ModelProbabilities;
    use crate::logic::score::aggregate;

    fn verdict() -> Verdict {
        aggregate(ModelProbabilities {
            forest: 0.9,
            boost: 0.8,
            sequence: 0.7,
        })
    }

    #[test]
    fn test_insert_then_get() {
        let store = TaskStore::in_memory().unwrap();
        let task = Task::new("sample.exe");
        store.insert(&task).unwrap();

        let loaded = store.get(task.id).unwrap().unwrap();
        assert_eq!(loaded.id, task.id);
        assert_eq!(loaded.state, TaskState::Uploaded);
        assert_eq!(loaded.filename, "sample.exe");
    }

    #[test]
    fn test_full_lifecycle() {
        let store = TaskStore::in_memory().unwrap();
        let task = Task::new("sample.exe");
        store.insert(&task).unwrap();

        assert!(store.mark_processing(task.id, 42).unwrap());
        let loaded = store.get(task.id).unwrap().unwrap();
        assert_eq!(loaded.state, TaskState::Processing);
        assert_eq!(loaded.tracking_id, Some(42));

        assert!(store.mark_completed(task.id, &verdict()).unwrap());
        let loaded = store.get(task.id).unwrap().unwrap();
        assert_eq!(loaded.state, TaskState::Completed);
        assert!(loaded.verdict.is_some());
    }

    #[test]
    fn test_terminal_tasks_ignore_further_writes() {
        let store = TaskStore::in_memory().unwrap();
        let task = Task::new("sample.exe");
        store.insert(&task).unwrap();
        store.mark_processing(task.id, 1).unwrap();
        store.mark_completed(task.id, &verdict()).unwrap();

        // Duplicate completion and a late failure both fall through.
        assert!(!store.mark_completed(task.id, &verdict()).unwrap());
        assert!(!store.mark_failed(task.id, "late error").unwrap());

        let loaded = store.get(task.id).unwrap().unwrap();
        assert_eq!(loaded.state, TaskState::Completed);
        assert!(loaded.reason.is_none());
    }

    #[test]
    fn test_completion_requires_processing() {
        let store = TaskStore::in_memory().unwrap();
        let task = Task::new("sample.exe");
        store.insert(&task).unwrap();

        // Skipping Processing is rejected.
        assert!(!store.mark_completed(task.id, &verdict()).unwrap());
        assert_eq!(
            store.get(task.id).unwrap().unwrap().state,
            TaskState::Uploaded
        );
    }

    #[test]
    fn test_uploaded_can_fail_directly() {
        let store = TaskStore::in_memory().unwrap();
        let task = Task::new("sample.exe");
        store.insert(&task).unwrap();

        assert!(store.mark_failed(task.id, "submission refused").unwrap());
        let loaded = store.get(task.id).unwrap().unwrap();
        assert_eq!(loaded.state, TaskState::Failed);
        assert_eq!(loaded.reason.as_deref(), Some("submission refused"));
    }

    #[test]
    fn test_find_by_tracking_id() {
        let store = TaskStore::in_memory().unwrap();
        let task = Task::new("sample.exe");
        store.insert(&task).unwrap();
        store.mark_processing(task.id, 99).unwrap();

        let found = store.find_by_tracking_id(99).unwrap().unwrap();
        assert_eq!(found.id, task.id);
        assert!(store.find_by_tracking_id(100).unwrap().is_none());
    }

    #[test]
    fn test_expire_stale_only_touches_processing() {
        let store = TaskStore::in_memory().unwrap();
        let uploaded = Task::new("a.exe");
        let processing = Task::new("b.exe");
        store.insert(&uploaded).unwrap();
        store.insert(&processing).unwrap();
        store.mark_processing(processing.id, 7).unwrap();

        // Zero-second threshold: anything updated before "now" expires.
        std::thread::sleep(std::time::Duration::from_millis(5));
        let expired = store.expire_stale(0).unwrap();
        assert_eq!(expired, 1);
        assert_eq!(
            store.get(processing.id).unwrap().unwrap().state,
            TaskState::Failed
        );
        assert_eq!(
            store.get(uploaded.id).unwrap().unwrap().state,
            TaskState::Uploaded
        );
    }

    #[test]
    fn test_list_orders_by_creation() {
        let store = TaskStore::in_memory().unwrap();
        for name in ["a.exe", "b.exe", "c.exe"] {
            let mut task = Task::new(name);
            task.created_at = Utc::now();
            store.insert(&task).unwrap();
            std::thread::sleep(std::time::Duration::from_millis(2));
        }
        let names: Vec<String> = store.list().unwrap().into_iter().map(|t| t.filename).collect();
        assert_eq!(names, vec!["a.exe", "b.exe", "c.exe"]);
    }
}

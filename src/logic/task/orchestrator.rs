//! Task orchestrator.
//!
//! Submissions run on spawned tasks, but every state change flows
//! through one mpsc channel into a single consumer, so transitions for
//! a given task apply in a total order. A late or duplicate sandbox
//! callback reaches the consumer like any other event and falls through
//! the store's transition guards.

use std::sync::Arc;

use log::{error, info, warn};
use serde_json::Value;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::Result;
use crate::logic::pipeline::ScoringPipeline;
use crate::logic::report::Report;
use crate::logic::sandbox::SandboxApi;

use super::store::TaskStore;
use super::types::Task;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Sandbox-side outcome carried by an analysis callback.
const ANALYSIS_SUCCESS: &str = "success";

/// Everything that can change a task's state.
#[derive(Debug)]
pub enum TaskEvent {
    SubmissionCompleted {
        task_id: Uuid,
        tracking_id: u64,
    },
    SubmissionFailed {
        task_id: Uuid,
        reason: String,
    },
    AnalysisCallback {
        tracking_id: u64,
        /// Sandbox completion status; anything but "success" fails the
        /// task without scoring.
        status: String,
        report: Value,
    },
}

impl TaskEvent {
    /// Build the callback event for a fetched analysis payload. A
    /// failed detonation comes back as a status envelope instead of a
    /// report; a payload without a top-level "status" is a report.
    pub fn analysis_result(tracking_id: u64, report: Value) -> Self {
        let status = report
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or(ANALYSIS_SUCCESS)
            .to_string();
        Self::AnalysisCallback {
            tracking_id,
            status,
            report,
        }
    }
}

pub struct Orchestrator<S: SandboxApi> {
    store: Arc<TaskStore>,
    pipeline: Arc<ScoringPipeline>,
    sandbox: S,
    events_tx: mpsc::Sender<TaskEvent>,
    events_rx: Option<mpsc::Receiver<TaskEvent>>,
    /// Processing tasks older than this many seconds are failed by the
    /// periodic sweep. Zero disables expiry.
    processing_expiry_secs: u64,
}

impl<S: SandboxApi> Orchestrator<S> {
    pub fn new(
        store: Arc<TaskStore>,
        pipeline: Arc<ScoringPipeline>,
        sandbox: S,
        processing_expiry_secs: u64,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            store,
            pipeline,
            sandbox,
            events_tx,
            events_rx: Some(events_rx),
            processing_expiry_secs,
        }
    }

    /// Handle for feeding external callbacks into the event loop.
    pub fn event_sender(&self) -> mpsc::Sender<TaskEvent> {
        self.events_tx.clone()
    }

    /// Register a new sample and start its sandbox submission. The task
    /// is persisted as Uploaded before the submission future runs.
    pub async fn submit(&self, path: std::path::PathBuf) -> Result<Uuid> {
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        let task = Task::new(filename);
        let task_id = task.id;
        self.store.insert(&task)?;
        info!("Task {} created for {}", task_id, path.display());

        let sandbox = self.sandbox.clone();
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            let event = match sandbox.submit_file(&path).await {
                Ok(response) => TaskEvent::SubmissionCompleted {
                    task_id,
                    tracking_id: response.tracking_id,
                },
                Err(e) => TaskEvent::SubmissionFailed {
                    task_id,
                    reason: e.to_string(),
                },
            };
            if events.send(event).await.is_err() {
                error!("Event loop gone, dropping submission result for {}", task_id);
            }
        });

        Ok(task_id)
    }

    /// Run the single-consumer event loop until every sender is gone.
    pub async fn run(&mut self) {
        let Some(mut events_rx) = self.events_rx.take() else {
            error!("Orchestrator event loop started twice");
            return;
        };

        let mut sweep = tokio::time::interval(std::time::Duration::from_secs(30));
        loop {
            tokio::select! {
                event = events_rx.recv() => {
                    let Some(event) = event else { break };
                    if let Err(e) = self.apply(event).await {
                        error!("Event handling failed: {}", e);
                    }
                }
                _ = sweep.tick(), if self.processing_expiry_secs > 0 => {
                    if let Err(e) = self.store.expire_stale(self.processing_expiry_secs) {
                        error!("Expiry sweep failed: {}", e);
                    }
                }
            }
        }
        info!("Orchestrator event loop stopped");
    }

    async fn apply(&self, event: TaskEvent) -> Result<()> {
        match event {
            TaskEvent::SubmissionCompleted {
                task_id,
                tracking_id,
            } => {
                if self.store.mark_processing(task_id, tracking_id)? {
                    info!("Task {} processing (tracking {})", task_id, tracking_id);
                } else {
                    warn!("Task {} not in uploaded state, submission result ignored", task_id);
                }
            }
            TaskEvent::SubmissionFailed { task_id, reason } => {
                if self.store.mark_failed(task_id, &reason)? {
                    warn!("Task {} failed at submission: {}", task_id, reason);
                }
            }
            TaskEvent::AnalysisCallback {
                tracking_id,
                status,
                report,
            } => {
                let Some(task) = self.store.find_by_tracking_id(tracking_id)? else {
                    warn!("Callback for unknown tracking id {}", tracking_id);
                    return Ok(());
                };
                if status != ANALYSIS_SUCCESS {
                    let reason = report
                        .get("error")
                        .and_then(Value::as_str)
                        .map(|e| format!("sandbox analysis {}: {}", status, e))
                        .unwrap_or_else(|| format!("sandbox analysis {}", status));
                    if self.store.mark_failed(task.id, &reason)? {
                        warn!("Task {} failed: {}", task.id, reason);
                    }
                    return Ok(());
                }
                match Report::from_value(report)
                    .and_then(|r| self.pipeline.score_report(&r))
                {
                    Ok(verdict) => {
                        if self.store.mark_completed(task.id, &verdict)? {
                            info!(
                                "Task {} completed: {} ({:.1}/10)",
                                task.id,
                                verdict.label.as_str(),
                                verdict.score
                            );
                        }
                    }
                    Err(e) => {
                        if self.store.mark_failed(task.id, &e.to_string())? {
                            warn!("Task {} failed during scoring: {}", task.id, e);
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::features::{fit, FeatureRecord};
    use crate::logic::model::{Ensemble, ProbabilityModel};
    use crate::logic::sandbox::SubmitResponse;
    use crate::logic::task::types::TaskState;
    use serde_json::json;
    use std::path::Path;

    #[derive(Clone)]
    struct FakeSandbox {
        fail_submit: bool,
    }

    impl SandboxApi for FakeSandbox {
        async fn submit_file(&self, _path: &Path) -> Result<SubmitResponse> {
            if self.fail_submit {
                Err(crate::error::Error::ExternalService("sandbox down".into()))
            } else {
                Ok(SubmitResponse { tracking_id: 7 })
            }
        }

        async fn fetch_report(&self, _tracking_id: u64) -> Result<Value> {
            Ok(json!({"malstatus": "malicious", "malscore": 9.0}))
        }
    }

    struct Fixed(&'static str, f32);
    impl ProbabilityModel for Fixed {
        fn name(&self) -> &'static str {
            self.0
        }
        fn predict_proba(&self, _features: &[f32]) -> f32 {
            self.1
        }
    }

    fn pipeline() -> Arc<ScoringPipeline> {
        let mut record = FeatureRecord::new();
        record.push_number("malscore", 5.0);
        let transformer = fit(&[record]);
        let ensemble = Ensemble::new(vec![
            Box::new(Fixed("forest", 0.9)),
            Box::new(Fixed("boost", 0.8)),
            Box::new(Fixed("sequence", 0.7)),
        ]);
        Arc::new(ScoringPipeline::new(transformer, ensemble))
    }

    fn orchestrator(fail_submit: bool) -> (Orchestrator<FakeSandbox>, Arc<TaskStore>) {
        let store = Arc::new(TaskStore::in_memory().unwrap());
        let orch = Orchestrator::new(
            store.clone(),
            pipeline(),
            FakeSandbox { fail_submit },
            0,
        );
        (orch, store)
    }

    async fn wait_for_state(store: &TaskStore, id: Uuid, state: TaskState) {
        for _ in 0..100 {
            if store.get(id).unwrap().map(|t| t.state) == Some(state) {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!("task never reached {:?}", state);
    }

    #[tokio::test]
    async fn test_successful_submission_reaches_processing() {
        let (mut orch, store) = orchestrator(false);
        let events = orch.event_sender();
        let task_id = orch.submit("sample.exe".into()).await.unwrap();
        tokio::spawn(async move { orch.run().await });

        wait_for_state(&store, task_id, TaskState::Processing).await;
        let task = store.get(task_id).unwrap().unwrap();
        assert_eq!(task.tracking_id, Some(7));
        drop(events);
    }

    #[tokio::test]
    async fn test_failed_submission_fails_task() {
        let (mut orch, store) = orchestrator(true);
        let task_id = orch.submit("sample.exe".into()).await.unwrap();
        tokio::spawn(async move { orch.run().await });

        wait_for_state(&store, task_id, TaskState::Failed).await;
        let task = store.get(task_id).unwrap().unwrap();
        assert!(task.reason.unwrap().contains("sandbox down"));
    }

    #[tokio::test]
    async fn test_callback_completes_task_with_verdict() {
        let (mut orch, store) = orchestrator(false);
        let events = orch.event_sender();
        let task_id = orch.submit("sample.exe".into()).await.unwrap();
        tokio::spawn(async move { orch.run().await });
        wait_for_state(&store, task_id, TaskState::Processing).await;

        events
            .send(TaskEvent::analysis_result(
                7,
                json!({"malstatus": "malicious", "malscore": 9.0}),
            ))
            .await
            .unwrap();

        wait_for_state(&store, task_id, TaskState::Completed).await;
        let verdict = store.get(task_id).unwrap().unwrap().verdict.unwrap();
        // Fixed members: ((0.9 + 0.8 + 1) / 3) * 10 = 9.0.
        assert_eq!(verdict.score, 9.0);
    }

    #[tokio::test]
    async fn test_duplicate_callback_is_idempotent() {
        let (mut orch, store) = orchestrator(false);
        let events = orch.event_sender();
        let task_id = orch.submit("sample.exe".into()).await.unwrap();
        tokio::spawn(async move { orch.run().await });
        wait_for_state(&store, task_id, TaskState::Processing).await;

        for _ in 0..3 {
            events
                .send(TaskEvent::analysis_result(7, json!({"malscore": 9.0})))
                .await
                .unwrap();
        }

        wait_for_state(&store, task_id, TaskState::Completed).await;
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let task = store.get(task_id).unwrap().unwrap();
        assert_eq!(task.state, TaskState::Completed);
        assert!(task.verdict.is_some());
    }

    #[tokio::test]
    async fn test_callback_for_unknown_tracking_id_is_ignored() {
        let (mut orch, store) = orchestrator(false);
        let events = orch.event_sender();
        let task_id = orch.submit("sample.exe".into()).await.unwrap();
        tokio::spawn(async move { orch.run().await });
        wait_for_state(&store, task_id, TaskState::Processing).await;

        events
            .send(TaskEvent::analysis_result(12345, json!({"malscore": 1.0})))
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(
            store.get(task_id).unwrap().unwrap().state,
            TaskState::Processing
        );
    }

    #[tokio::test]
    async fn test_malformed_callback_report_fails_task() {
        let (mut orch, store) = orchestrator(false);
        let events = orch.event_sender();
        let task_id = orch.submit("sample.exe".into()).await.unwrap();
        tokio::spawn(async move { orch.run().await });
        wait_for_state(&store, task_id, TaskState::Processing).await;

        events
            .send(TaskEvent::analysis_result(7, json!([])))
            .await
            .unwrap();

        wait_for_state(&store, task_id, TaskState::Failed).await;
        let task = store.get(task_id).unwrap().unwrap();
        assert!(task.reason.unwrap().contains("Malformed report"));
    }

    #[tokio::test]
    async fn test_non_success_callback_fails_without_scoring() {
        let (mut orch, store) = orchestrator(false);
        let events = orch.event_sender();
        let task_id = orch.submit("sample.exe".into()).await.unwrap();
        tokio::spawn(async move { orch.run().await });
        wait_for_state(&store, task_id, TaskState::Processing).await;

        // A failed detonation comes back as a status envelope. It must
        // never reach extraction, where every field would default and
        // produce a verdict for a sample that was never analyzed.
        events
            .send(TaskEvent::analysis_result(
                7,
                json!({"status": "failed", "error": "analysis machine crashed"}),
            ))
            .await
            .unwrap();

        wait_for_state(&store, task_id, TaskState::Failed).await;
        let task = store.get(task_id).unwrap().unwrap();
        assert!(task.verdict.is_none());
        let reason = task.reason.unwrap();
        assert!(reason.contains("failed"));
        assert!(reason.contains("analysis machine crashed"));
    }

    #[tokio::test]
    async fn test_success_status_envelope_still_scores() {
        let (mut orch, store) = orchestrator(false);
        let events = orch.event_sender();
        let task_id = orch.submit("sample.exe".into()).await.unwrap();
        tokio::spawn(async move { orch.run().await });
        wait_for_state(&store, task_id, TaskState::Processing).await;

        events
            .send(TaskEvent::analysis_result(
                7,
                json!({"status": "success", "malscore": 9.0}),
            ))
            .await
            .unwrap();

        wait_for_state(&store, task_id, TaskState::Completed).await;
        assert!(store.get(task_id).unwrap().unwrap().verdict.is_some());
    }
}

//! Report loader.
//!
//! Wraps one raw sandbox analysis document. A report is a deeply nested
//! JSON tree produced by an external dynamic-analysis sandbox; any
//! section may be absent and absence always defaults instead of failing.
//! Only syntactically invalid input or empty/non-object content is an
//! error.

use std::path::Path;

use serde_json::Value;

use crate::error::{Error, Result};

/// One loaded sandbox report. Immutable after creation.
#[derive(Debug, Clone)]
pub struct Report {
    root: Value,
}

impl Report {
    /// Parse a report from raw bytes. Accepts a single JSON object or a
    /// list containing one; a list takes its first element.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let parsed: Value = serde_json::from_slice(bytes)
            .map_err(|e| Error::MalformedReport(e.to_string()))?;
        Self::from_value(parsed)
    }

    /// Parse a report from a file on disk.
    pub fn from_path(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .map_err(|e| Error::MalformedReport(format!("{}: {}", path.display(), e)))?;
        Self::from_slice(&bytes)
    }

    pub fn from_value(value: Value) -> Result<Self> {
        let root = match value {
            Value::Array(mut items) => {
                if items.is_empty() {
                    return Err(Error::MalformedReport("empty report list".to_string()));
                }
                items.swap_remove(0)
            }
            other => other,
        };

        if !root.is_object() {
            return Err(Error::MalformedReport(
                "report content is not an object".to_string(),
            ));
        }

        Ok(Self { root })
    }

    /// Walk a dotted path through nested objects. Returns `None` for
    /// any missing segment.
    pub fn at(&self, path: &[&str]) -> Option<&Value> {
        let mut current = &self.root;
        for segment in path {
            current = current.get(segment)?;
        }
        Some(current)
    }

    /// String at path, or the given default when absent or non-string.
    pub fn str_at(&self, path: &[&str], default: &str) -> String {
        self.at(path)
            .and_then(Value::as_str)
            .unwrap_or(default)
            .to_string()
    }

    /// Unsigned integer at path, 0 when absent or non-numeric.
    pub fn u64_at(&self, path: &[&str]) -> u64 {
        self.at(path).and_then(Value::as_u64).unwrap_or(0)
    }

    /// Float at path, 0.0 when absent or non-numeric.
    pub fn f64_at(&self, path: &[&str]) -> f64 {
        self.at(path).and_then(Value::as_f64).unwrap_or(0.0)
    }

    /// Array at path, empty slice when absent.
    pub fn array_at(&self, path: &[&str]) -> &[Value] {
        self.at(path)
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// A report paired with its ground-truth label (1 = malicious).
#[derive(Debug, Clone)]
pub struct LabeledReport {
    pub report: Report,
    pub label: u8,
}

/// Load a labeled training corpus from `<dir>/clean/*.json` (label 0)
/// and `<dir>/malicious/*.json` (label 1). Unreadable files are skipped
/// with a warning so one bad report cannot sink a training run.
pub fn load_labeled_dir(dir: &Path) -> Result<Vec<LabeledReport>> {
    let mut out = Vec::new();
    for (subdir, label) in [("clean", 0u8), ("malicious", 1u8)] {
        let path = dir.join(subdir);
        if !path.is_dir() {
            log::warn!("Dataset directory missing: {}", path.display());
            continue;
        }

        let mut entries: Vec<_> = std::fs::read_dir(&path)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().map(|ext| ext == "json").unwrap_or(false))
            .collect();
        entries.sort();

        for file in entries {
            match Report::from_path(&file) {
                Ok(report) => out.push(LabeledReport { report, label }),
                Err(e) => log::warn!("Skipping unreadable report {}: {}", file.display(), e),
            }
        }
    }

    if out.is_empty() {
        return Err(Error::Training(format!(
            "no reports found under {}",
            dir.display()
        )));
    }

    log::info!(
        "Loaded {} labeled reports ({} malicious)",
        out.len(),
        out.iter().filter(|r| r.label == 1).count()
    );
    Ok(out)
}

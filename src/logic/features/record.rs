//! Named feature record.
//!
//! The loosely-typed, ordered mapping produced by extraction and
//! consumed by the transformer. Order is preserved so downstream
//! encoders see columns in a stable sequence.

use serde::{Deserialize, Serialize};

/// A raw extracted value. Text stays text until the transform stage;
/// lists of numbers (call repeats, signature severities) keep their
/// native order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RawValue {
    Text(String),
    Number(f64),
    NumberList(Vec<f64>),
}

impl RawValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Coerce to a single numeric value. Lists coerce to their sum so
    /// aggregate signals (total repeat count) survive; text parses as a
    /// number when it can, otherwise the value is missing.
    pub fn coerce_numeric(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::NumberList(items) => Some(items.iter().sum()),
            Self::Text(s) => s.trim().parse::<f64>().ok(),
        }
    }
}

/// Ordered name -> raw value mapping, one per report.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeatureRecord {
    entries: Vec<(String, RawValue)>,
}

impl FeatureRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: &str, value: RawValue) {
        self.entries.push((name.to_string(), value));
    }

    pub fn push_text(&mut self, name: &str, value: String) {
        self.push(name, RawValue::Text(value));
    }

    pub fn push_number(&mut self, name: &str, value: f64) {
        self.push(name, RawValue::Number(value));
    }

    pub fn get(&self, name: &str) -> Option<&RawValue> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    pub fn set(&mut self, name: &str, value: RawValue) {
        if let Some(entry) = self.entries.iter_mut().find(|(n, _)| n == name) {
            entry.1 = value;
        } else {
            self.entries.push((name.to_string(), value));
        }
    }

    pub fn remove(&mut self, name: &str) {
        self.entries.retain(|(n, _)| n != name);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &RawValue)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

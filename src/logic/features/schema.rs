//! Feature schema.
//!
//! The exact ordered list of numeric column names a fitted model
//! expects. Established at fit time and persisted inside every model
//! artifact; a model and its schema are released together.
//!
//! Alignment invariant: live columns absent from the schema are
//! dropped, schema columns absent from the live set are zero-filled,
//! and the output order always equals the schema order.

use std::collections::HashMap;

use crc32fast::Hasher;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Bump when the schema representation itself changes shape.
pub const SCHEMA_VERSION: u8 = 1;

/// Fixed-length numeric vector aligned one-to-one with a schema.
pub type FeatureVector = Vec<f32>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSchema {
    pub version: u8,
    /// CRC32 over version + ordered column names, for cheap
    /// compatibility checks between persisted artifacts.
    pub layout_hash: u32,
    columns: Vec<String>,
}

impl FeatureSchema {
    pub fn new(columns: Vec<String>) -> Self {
        let layout_hash = compute_layout_hash(SCHEMA_VERSION, &columns);
        Self {
            version: SCHEMA_VERSION,
            layout_hash,
            columns,
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Recompute the layout hash and compare with the stored one.
    /// Detects artifacts whose column list was tampered with or
    /// truncated after serialization.
    pub fn validate(&self) -> Result<()> {
        let actual = compute_layout_hash(self.version, &self.columns);
        if actual != self.layout_hash {
            return Err(Error::Training(format!(
                "schema layout hash mismatch: stored {:08x}, computed {:08x}",
                self.layout_hash, actual
            )));
        }
        Ok(())
    }

    /// Align named numeric values to this schema. Missing columns fill
    /// with zero, extra columns drop, order is the schema order.
    pub fn align(&self, values: &HashMap<String, f32>) -> Result<FeatureVector> {
        let vector: FeatureVector = self
            .columns
            .iter()
            .map(|col| values.get(col).copied().unwrap_or(0.0))
            .collect();

        // Cannot fail given the construction above; kept as the
        // programming-error tripwire the contract requires.
        if vector.len() != self.columns.len() {
            return Err(Error::SchemaMismatch {
                expected: self.columns.len(),
                actual: vector.len(),
            });
        }
        Ok(vector)
    }
}

fn compute_layout_hash(version: u8, columns: &[String]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(&[version]);
    for name in columns {
        hasher.update(name.as_bytes());
        hasher.update(&[0]);
    }
    hasher.finalize()
}

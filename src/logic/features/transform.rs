//! Feature transform pipeline.
//!
//! Converts a named record into the fixed-length numeric vector a
//! fitted model expects. Stage order is fixed; later stages assume the
//! outputs of earlier ones:
//!
//! 1. missing-value fill with field defaults
//! 2. hex-to-integer conversion for address columns
//! 3. categorical encoding (`type`, `malstatus`)
//! 4. hashed text embedding per free-text column
//! 5. hash-identifier column drop (md5/sha1/sha256/ssdeep)
//! 6. numeric coercion (failures become missing, never an error)
//! 7. standardization of scale-sensitive columns with fit statistics
//! 8. schema alignment

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::Result;

use super::encoders::{hex_to_int, CategoricalEncoder, Scaler, TextVectorizer};
use super::record::{FeatureRecord, RawValue};
use super::schema::{FeatureSchema, FeatureVector};

/// Address-like columns carried as hex strings.
pub const HEX_COLUMNS: &[&str] = &[
    "pe_imagebase",
    "pe_entrypoint",
    "pe_reported_checksum",
    "pe_actual_checksum",
    "pe_overlay_offset",
    "pe_overlay_size",
];

/// Low-cardinality columns that get integer codes.
pub const CATEGORICAL_COLUMNS: &[&str] = &["type", "malstatus"];

/// Free-text columns that get embedded.
pub const TEXT_COLUMNS: &[&str] = &[
    "yara_names",
    "yara_descriptions",
    "yara_strings",
    "cape_yara_names",
    "cape_yara_descriptions",
    "cape_yara_strings",
    "pe_digital_signers",
    "pe_ep_bytes",
    "pe_sections",
    "pe_entropy",
    "pe_imports",
    "pe_exports",
    "pe_exported_dll_name",
    "custom_strings",
    "call_api",
    "sig_name",
    "sig_description",
    "ttp_signatures",
];

/// Identifier columns with no generalizing signal.
pub const HASH_COLUMNS: &[&str] = &["md5", "sha1", "sha256", "ssdeep", "filename"];

/// Columns standardized to zero mean / unit variance.
pub const SCALED_COLUMNS: &[&str] = &["size", "malscore", "behavior_process_count"];

/// Embedding width per text column.
pub const TEXT_VEC_DIM: usize = 8;

/// Immutable fitted state: schema, encoders and scaler statistics,
/// co-owned with the model artifact that was trained on them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FittedTransformer {
    pub schema: FeatureSchema,
    categorical: HashMap<String, CategoricalEncoder>,
    text: TextVectorizer,
    scalers: HashMap<String, Scaler>,
}

/// Fit encoders, scalers and the schema from training records.
pub fn fit(records: &[FeatureRecord]) -> FittedTransformer {
    // Categorical encoders see every value in the corpus.
    let mut categorical = HashMap::new();
    for col in CATEGORICAL_COLUMNS {
        let values: Vec<&str> = records
            .iter()
            .map(|r| r.get(col).and_then(RawValue::as_text).unwrap_or("unknown"))
            .collect();
        categorical.insert(col.to_string(), CategoricalEncoder::fit(values.into_iter()));
    }

    let text = TextVectorizer::new(TEXT_VEC_DIM);

    let mut fitted = FittedTransformer {
        schema: FeatureSchema::new(Vec::new()),
        categorical,
        text,
        scalers: HashMap::new(),
    };

    // Scaler statistics come from the un-scaled numeric values.
    for col in SCALED_COLUMNS {
        let values: Vec<f32> = records
            .iter()
            .map(|r| {
                r.get(col)
                    .and_then(RawValue::coerce_numeric)
                    .unwrap_or(0.0) as f32
            })
            .collect();
        fitted.scalers.insert(col.to_string(), Scaler::fit(&values));
    }

    // Schema column order: first-seen record order across the corpus,
    // so the fitted layout is stable for a given record layout.
    let mut columns: Vec<String> = Vec::new();
    for record in records {
        for (name, _) in fitted.numeric_values(record) {
            if !columns.contains(&name) {
                columns.push(name);
            }
        }
    }
    fitted.schema = FeatureSchema::new(columns);
    fitted
}

impl FittedTransformer {
    /// Transform one record into a schema-aligned vector. Total for any
    /// record; only a broken alignment (programming error) can fail.
    pub fn transform(&self, record: &FeatureRecord) -> Result<FeatureVector> {
        let values: HashMap<String, f32> = self.numeric_values(record).into_iter().collect();
        self.schema.align(&values)
    }

    pub fn transform_all(&self, records: &[FeatureRecord]) -> Result<Vec<FeatureVector>> {
        records.iter().map(|r| self.transform(r)).collect()
    }

    /// Stages 1-7: named numeric values before alignment, in record
    /// order so the fitted schema layout is deterministic.
    fn numeric_values(&self, record: &FeatureRecord) -> Vec<(String, f32)> {
        let mut out: Vec<(String, f32)> = Vec::new();

        for (name, raw) in record.iter() {
            // Stage 5: identifier columns drop outright.
            if HASH_COLUMNS.contains(&name) {
                continue;
            }

            // Stage 2: hex addresses.
            if HEX_COLUMNS.contains(&name) {
                let text = raw.as_text().unwrap_or("0");
                out.push((name.to_string(), hex_to_int(text) as f32));
                continue;
            }

            // Stage 3: categorical codes.
            if let Some(encoder) = self.categorical.get(name) {
                let text = raw.as_text().unwrap_or("unknown");
                out.push((name.to_string(), encoder.encode(text)));
                continue;
            }

            // Stage 4: text embeddings expand to `{col}_vecN`.
            if TEXT_COLUMNS.contains(&name) {
                let text = raw.as_text().unwrap_or("");
                for (i, value) in self.text.embed(text).into_iter().enumerate() {
                    out.push((format!("{}_vec{}", name, i), value));
                }
                continue;
            }

            // Stage 6: everything else coerces or goes missing.
            if let Some(value) = raw.coerce_numeric() {
                out.push((name.to_string(), value as f32));
            }
        }

        // Stage 7: standardize with fit-time statistics. Iteration
        // follows the const column list so output order is stable even
        // when a scaled column was missing from the record.
        for col in SCALED_COLUMNS {
            if let Some(scaler) = self.scalers.get(*col) {
                match out.iter_mut().find(|(name, _)| name == col) {
                    Some(entry) => entry.1 = scaler.transform(entry.1),
                    None => out.push((col.to_string(), scaler.transform(0.0))),
                }
            }
        }

        out
    }
}

//! Fitted encoder state.
//!
//! Every encoder here is fit once on the training records and then
//! passed immutably into each transform call. Nothing in this module
//! mutates after fitting, so training order and inference order cannot
//! couple through hidden state.

use serde::{Deserialize, Serialize};

/// Code reserved for categories never seen at fit time.
pub const UNKNOWN_CODE: f32 = 0.0;

/// Low-cardinality string column -> small integer code. Known
/// categories get codes 1..=n in sorted order; unseen values map to
/// the reserved unknown code instead of failing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoricalEncoder {
    categories: Vec<String>,
}

impl CategoricalEncoder {
    pub fn fit<'a>(values: impl Iterator<Item = &'a str>) -> Self {
        let mut categories: Vec<String> = values.map(str::to_string).collect();
        categories.sort();
        categories.dedup();
        Self { categories }
    }

    pub fn encode(&self, value: &str) -> f32 {
        match self.categories.iter().position(|c| c == value) {
            Some(index) => (index + 1) as f32,
            None => UNKNOWN_CODE,
        }
    }

    pub fn categories(&self) -> &[String] {
        &self.categories
    }
}

/// Hashed text embedding. Tokens hash into a fixed number of signed
/// buckets and the bucket sums are averaged over the token count, so
/// identical text always produces the identical dense vector with no
/// vocabulary to persist. Fit and inference share the representation
/// by construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextVectorizer {
    dim: usize,
}

impl TextVectorizer {
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn embed(&self, text: &str) -> Vec<f32> {
        let mut buckets = vec![0.0f32; self.dim];
        let mut count = 0usize;

        for token in text.split(|c: char| c.is_whitespace() || c == ',') {
            if token.is_empty() {
                continue;
            }
            let hash = crc32fast::hash(token.as_bytes());
            let bucket = (hash as usize) % self.dim;
            let sign = if (hash >> 16) & 1 == 0 { 1.0 } else { -1.0 };
            buckets[bucket] += sign;
            count += 1;
        }

        if count > 0 {
            for value in buckets.iter_mut() {
                *value /= count as f32;
            }
        }
        buckets
    }
}

/// Zero-mean unit-variance scaler. Statistics are captured at fit time
/// and reused verbatim at inference; they are never recomputed from
/// live data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scaler {
    pub mean: f32,
    pub std: f32,
}

impl Scaler {
    pub fn fit(values: &[f32]) -> Self {
        if values.is_empty() {
            return Self { mean: 0.0, std: 1.0 };
        }
        let mean = values.iter().sum::<f32>() / values.len() as f32;
        let variance =
            values.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / values.len() as f32;
        Self {
            mean,
            std: variance.sqrt(),
        }
    }

    pub fn transform(&self, value: f32) -> f32 {
        (value - self.mean) / self.std.max(1e-8)
    }
}

/// Hex string ("0x400000" or "400000") to integer; anything that does
/// not parse becomes 0, never an error.
pub fn hex_to_int(value: &str) -> f64 {
    let trimmed = value.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    u64::from_str_radix(digits, 16).map(|v| v as f64).unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categorical_known_and_unknown() {
        let encoder =
            CategoricalEncoder::fit(["exe", "dll", "exe"].into_iter());
        assert_eq!(encoder.categories(), &["dll".to_string(), "exe".to_string()]);
        assert_eq!(encoder.encode("dll"), 1.0);
        assert_eq!(encoder.encode("exe"), 2.0);
        assert_eq!(encoder.encode("never-seen"), UNKNOWN_CODE);
    }

    #[test]
    fn test_text_embedding_deterministic() {
        let vectorizer = TextVectorizer::new(8);
        let a = vectorizer.embed("CreateFileW, WriteFile RegSetValueExW");
        let b = vectorizer.embed("CreateFileW, WriteFile RegSetValueExW");
        assert_eq!(a, b);
        assert_eq!(a.len(), 8);
        assert!(a.iter().any(|v| *v != 0.0));
    }

    #[test]
    fn test_text_embedding_empty_is_zero() {
        let vectorizer = TextVectorizer::new(8);
        assert_eq!(vectorizer.embed(""), vec![0.0; 8]);
        assert_eq!(vectorizer.embed(" ,  , "), vec![0.0; 8]);
    }

    #[test]
    fn test_scaler_reuses_fit_statistics() {
        let scaler = Scaler::fit(&[1.0, 2.0, 3.0]);
        assert!((scaler.mean - 2.0).abs() < 1e-6);
        assert!((scaler.transform(2.0)).abs() < 1e-6);
        // Transforming out-of-distribution values uses the same stats.
        let far = scaler.transform(100.0);
        assert!(far > 10.0);
    }

    #[test]
    fn test_scaler_constant_column() {
        let scaler = Scaler::fit(&[5.0, 5.0, 5.0]);
        assert_eq!(scaler.transform(5.0), 0.0);
    }

    #[test]
    fn test_hex_to_int() {
        assert_eq!(hex_to_int("0x400000"), 4194304.0);
        assert_eq!(hex_to_int("400000"), 4194304.0);
        assert_eq!(hex_to_int("N/A"), 0.0);
        assert_eq!(hex_to_int(""), 0.0);
    }
}

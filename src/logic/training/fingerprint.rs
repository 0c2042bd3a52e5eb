//! Training-data fingerprinting.
//!
//! A fingerprint identifies the exact labelled corpus a model was
//! trained on. Each row (features plus label) serializes to bytes and
//! hashes individually; the per-row digests are sorted before the
//! final digest, so corpus order never changes the fingerprint.

use sha2::{Digest, Sha256};

/// Hex SHA-256 fingerprint of a labelled feature matrix.
pub fn fingerprint(features: &[Vec<f32>], labels: &[f32]) -> String {
    let mut row_digests: Vec<[u8; 32]> = features
        .iter()
        .zip(labels.iter())
        .map(|(row, label)| {
            let mut hasher = Sha256::new();
            for value in row {
                hasher.update(value.to_le_bytes());
            }
            hasher.update(label.to_le_bytes());
            hasher.finalize().into()
        })
        .collect();
    row_digests.sort_unstable();

    let mut hasher = Sha256::new();
    for digest in &row_digests {
        hasher.update(digest);
    }
    hex::encode(hasher.finalize())
}

/// Hex SHA-256 of arbitrary bytes, used for artifact checksums.
pub fn checksum(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

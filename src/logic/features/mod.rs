//! Feature extraction and transformation.
//!
//! `extract` turns a report into a named record; `transform::fit`
//! learns encoders, scalers and the column schema from a training
//! corpus; `FittedTransformer::transform` turns any record into a
//! schema-aligned numeric vector.

pub mod encoders;
pub mod extract;
pub mod record;
pub mod schema;
pub mod transform;


pub use extract::extract;
pub use record::{FeatureRecord, RawValue};
pub use schema::{FeatureSchema, FeatureVector};
pub use transform::{fit, FittedTransformer};

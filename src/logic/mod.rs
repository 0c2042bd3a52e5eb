//! Core logic modules.

pub mod features;
pub mod model;
pub mod pipeline;
pub mod report;
pub mod sandbox;
pub mod score;
pub mod task;
pub mod training;

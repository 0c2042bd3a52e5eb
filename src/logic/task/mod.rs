//! Task lifecycle: types, persistent store and the orchestrator.

pub mod orchestrator;
pub mod store;
pub mod types;

pub use orchestrator::{Orchestrator, TaskEvent};
pub use store::TaskStore;
pub use types::{Task, TaskState};

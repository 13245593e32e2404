//! Named task graph with dependency-ordered async execution.
//!
//! Tasks are registered by name with the tasks they depend on. Invoking a task
//! runs its transitive dependencies first, each at most once, and runs
//! independent tasks concurrently on the blocking pool.

pub mod graph;
pub mod runner;
pub mod task;

pub use graph::{GraphError, Plan, TaskGraph};
pub use runner::{execute, RunReport, TaskError};
pub use task::{Task, TaskAction, TaskFailure};

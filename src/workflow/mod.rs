// src/workflow/mod.rs

//! The workflow: owner of the dependency graph, the lifecycle state
//! machines, the concurrency semaphore, the scheduler, and the event plane
//! feeding the streaming iterators.

pub mod core;
pub mod iter;
pub mod state;

pub use self::core::{TaskEvent, Workflow, WorkflowConfig};
pub use iter::TaskFilter;
pub use state::{WorkflowState, WorkflowTransition, WORKFLOW_MACHINE};

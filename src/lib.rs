// src/lib.rs

//! `flowdag`: an in-process DAG task orchestration core.
//!
//! A [`Workflow`] owns an acyclic graph of [`Task`]s. Tasks declare the ids
//! they rely on; the scheduler executes them in a priority-aware
//! topological order under a bounded semaphore, moving each one through an
//! explicit lifecycle (`created → pending → running → succeeded/failed`,
//! with retry, cancellation, and removal). Results are consumed through
//! async streams: the default iterator yields every task as it settles,
//! [`Workflow::stream`] filters, and [`Workflow::try_iter`] fails fast on
//! the first task error.
//!
//! ```no_run
//! use flowdag::{TaskConfig, Workflow, WorkflowConfig};
//! use futures::StreamExt;
//! use serde_json::json;
//!
//! # async fn demo() -> flowdag::Result<()> {
//! let flow = Workflow::new(WorkflowConfig { max_concurrent: 2, id: None });
//! flow.add(|_| async { Ok(json!(1)) }, TaskConfig::new().id("a"))?;
//! flow.add(
//!     |deps| async move { Ok(json!(deps[0].as_i64().unwrap_or(0) + 1)) },
//!     TaskConfig::new().id("b").relies_on(["a"]),
//! )?;
//!
//! let mut results = Box::pin(flow.iter());
//! while let Some(task) = results.next().await {
//!     println!("{} -> {:?}", task.id(), task.result());
//! }
//! # Ok(())
//! # }
//! ```

pub mod dag;
pub mod errors;
pub mod fsm;
pub mod logging;
pub mod signal;
pub mod snapshot;
pub mod sync;
pub mod task;
pub mod workflow;

pub use errors::{Error, Result};
pub use serde_json::Value;
pub use snapshot::{TaskSnapshot, WorkflowSnapshot};
pub use task::{Task, TaskConfig, TaskState, TaskTransition};
pub use workflow::{TaskEvent, TaskFilter, Workflow, WorkflowConfig, WorkflowState, WorkflowTransition};

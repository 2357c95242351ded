// src/workflow/iter.rs

//! The three iteration modes over a workflow's results.
//!
//! All three are pull-based `futures::Stream`s fed by the task event plane
//! and may be consumed concurrently; each subscribes independently, so no
//! consumer steals events from another.

use std::collections::HashSet;
use std::sync::Arc;

use async_stream::stream;
use futures::{Stream, StreamExt};
use serde_json::Value;

use crate::errors::{Error, Result};
use crate::signal::WILDCARD;
use crate::task::{Task, TaskState};
use crate::workflow::core::{Workflow, WorkflowCore};

/// Filter applied by [`Workflow::stream`] and [`Workflow::try_iter`].
///
/// The default keeps only `succeeded` tasks that are terminal in the DAG
/// sense (nothing depends on them). Consumers wanting a full trace should
/// use [`TaskFilter::any_state`] and `only_terminal(false)`.
#[derive(Clone)]
pub struct TaskFilter {
    /// `None` means any state.
    states: Option<Vec<TaskState>>,
    only_terminal: bool,
    predicate: Option<Arc<dyn Fn(&Task) -> bool + Send + Sync>>,
}

impl Default for TaskFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskFilter {
    pub fn new() -> Self {
        Self {
            states: Some(vec![TaskState::Succeeded]),
            only_terminal: true,
            predicate: None,
        }
    }

    /// Match these lifecycle states only.
    pub fn states<I>(mut self, states: I) -> Self
    where
        I: IntoIterator<Item = TaskState>,
    {
        self.states = Some(states.into_iter().collect());
        self
    }

    /// Match every lifecycle state (the `"*"` filter).
    pub fn any_state(mut self) -> Self {
        self.states = None;
        self
    }

    /// Restrict to tasks that are terminal in the DAG sense.
    pub fn only_terminal(mut self, only_terminal: bool) -> Self {
        self.only_terminal = only_terminal;
        self
    }

    /// Extra predicate over the task.
    pub fn predicate<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Task) -> bool + Send + Sync + 'static,
    {
        self.predicate = Some(Arc::new(predicate));
        self
    }

    fn matches(&self, core: &WorkflowCore, task: &Arc<Task>) -> bool {
        if let Some(states) = &self.states {
            if !states.contains(&task.state()) {
                return false;
            }
        }
        if self.only_terminal && !core.is_dag_terminal(task.id()) {
            return false;
        }
        if let Some(predicate) = &self.predicate {
            if !predicate(task) {
                return false;
            }
        }
        true
    }
}

impl Workflow {
    /// Default async iteration: yields each task once as it reaches a
    /// terminal lifecycle event.
    ///
    /// The first pull starts the scheduler if the workflow is idle. A
    /// workflow that already settled replays its tasks in terminal order.
    /// After every registered task has been yielded the iterator invokes
    /// `end` and completes.
    pub fn iter(&self) -> impl Stream<Item = Arc<Task>> + Send + 'static {
        let core = self.core().clone();
        stream! {
            // Subscribe before starting the scheduler so no event is lost.
            let Ok(mut events) = core.plane().stream(&[WILDCARD]) else {
                return;
            };

            if core.is_finished() {
                for task in core.settled_snapshot() {
                    yield task;
                }
                return;
            }

            core.ensure_started();

            let mut yielded: HashSet<String> = HashSet::new();

            // Replay tasks that settled before this iterator subscribed.
            for task in core.settled_snapshot() {
                if yielded.insert(task.id().to_string()) {
                    yield task;
                }
            }
            if core.all_yielded(&yielded) {
                core.finish();
                return;
            }

            while let Some(event) = events.next().await {
                let task = event.task;
                if !task.is_settled() {
                    continue;
                }
                if !yielded.insert(task.id().to_string()) {
                    continue;
                }
                yield task;
                if core.all_yielded(&yielded) {
                    core.finish();
                    break;
                }
            }
        }
    }

    /// Filtered iteration over [`Workflow::iter`].
    pub fn stream(&self, filter: TaskFilter) -> impl Stream<Item = Arc<Task>> + Send + 'static {
        let core = self.core().clone();
        let inner = self.iter();
        stream! {
            let mut inner = Box::pin(inner);
            while let Some(task) = inner.next().await {
                if filter.matches(&core, &task) {
                    yield task;
                }
            }
        }
    }

    /// Fail-fast iteration: yields the *results* of matching tasks; the
    /// first task that settles `failed` aborts the workflow and surfaces
    /// its error, ending the stream.
    pub fn try_iter(
        &self,
        filter: TaskFilter,
    ) -> impl Stream<Item = Result<Value>> + Send + 'static {
        let core = self.core().clone();
        let inner = self.iter();
        stream! {
            let mut inner = Box::pin(inner);
            while let Some(task) = inner.next().await {
                if task.state() == TaskState::Failed {
                    let _ = core.abort_workflow();
                    let err = task.error().unwrap_or(Error::Cancelled);
                    yield Err(err);
                    return;
                }
                if filter.matches(&core, &task) {
                    yield Ok(task.result().unwrap_or(Value::Null));
                }
            }
        }
    }
}

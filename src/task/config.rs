// src/task/config.rs

use std::time::Duration;

/// Default base delay between retry attempts.
pub const DEFAULT_BACKOFF: Duration = Duration::from_millis(200);

/// Task construction options.
///
/// All fields are optional; the defaults are a fresh id, no dependencies,
/// priority 0, no retries, a 200 ms backoff base, and no timeout.
#[derive(Debug, Clone)]
pub struct TaskConfig {
    pub(crate) id: Option<String>,
    pub(crate) relies_on: Vec<String>,
    pub(crate) priority: i64,
    pub(crate) retry_limit: u32,
    pub(crate) backoff: Duration,
    pub(crate) timeout: Option<Duration>,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            id: None,
            relies_on: Vec::new(),
            priority: 0,
            retry_limit: 0,
            backoff: DEFAULT_BACKOFF,
            timeout: None,
        }
    }
}

impl TaskConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Explicit id; must be unique within the workflow.
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Ids of the tasks this one depends on; their settled values are passed
    /// to the work callable in this order.
    pub fn relies_on<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.relies_on = ids.into_iter().map(Into::into).collect();
        self
    }

    /// Tie-breaker in the topological sort; higher runs first.
    pub fn priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    /// Number of additional attempts after a failure.
    pub fn retry_limit(mut self, retry_limit: u32) -> Self {
        self.retry_limit = retry_limit;
        self
    }

    /// Base delay before retry `k`; the actual delay is `backoff × 2^k`.
    pub fn backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Per-attempt wall-clock budget.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

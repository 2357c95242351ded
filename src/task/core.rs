// src/task/core.rs

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::time::sleep;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::errors::{Error, Result};
use crate::fsm::{Named, StateMachine};
use crate::snapshot::TaskSnapshot;
use crate::sync::PauseGate;
use crate::task::config::TaskConfig;
use crate::task::state::{TaskState, TaskTransition, TASK_MACHINE};

/// Boxed user work: dependency values in, a value or an opaque error out.
pub type WorkFn = Arc<dyn Fn(Vec<Value>) -> BoxFuture<'static, anyhow::Result<Value>> + Send + Sync>;

/// One unit of work with dependencies, retry/timeout policy, and its own
/// lifecycle state machine.
pub struct Task {
    id: String,
    relies_on: Vec<String>,
    priority: i64,
    retry_limit: u32,
    backoff: Duration,
    timeout: Option<Duration>,
    work: WorkFn,
    fsm: StateMachine<TaskState, TaskTransition>,
    /// Started attempts; terminal failure means `attempts > retry_limit`.
    attempts: AtomicU32,
    result: Mutex<Option<Value>>,
    error: Arc<Mutex<Option<Error>>>,
    pause: Arc<PauseGate>,
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("relies_on", &self.relies_on)
            .field("priority", &self.priority)
            .field("retry_limit", &self.retry_limit)
            .field("backoff", &self.backoff)
            .field("timeout", &self.timeout)
            .field("attempts", &self.attempts)
            .finish_non_exhaustive()
    }
}

impl Task {
    /// Build a task in `created` state and wire its internal after-handlers.
    /// The workflow enqueues it (`created -> pending`) once registered.
    pub(crate) fn new(work: WorkFn, config: TaskConfig, pause: Arc<PauseGate>) -> Result<Arc<Self>> {
        let id = config
            .id
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let task = Arc::new(Self {
            fsm: StateMachine::new(id.clone(), &TASK_MACHINE),
            id,
            relies_on: config.relies_on,
            priority: config.priority,
            retry_limit: config.retry_limit,
            backoff: config.backoff,
            timeout: config.timeout,
            work,
            attempts: AtomicU32::new(0),
            result: Mutex::new(None),
            error: Arc::new(Mutex::new(None)),
            pause,
        });

        // `start` discards the previous attempt's error.
        let error = task.error.clone();
        task.fsm.on_after(
            &[TaskTransition::Start],
            Arc::new(move |_, _| {
                *error.lock() = None;
                Ok(())
            }),
        )?;

        // `cancel` installs the error reported if execution is attempted.
        let error = task.error.clone();
        task.fsm.on_after(
            &[TaskTransition::Cancel],
            Arc::new(move |_, _| {
                *error.lock() = Some(Error::Cancelled);
                Ok(())
            }),
        )?;

        Ok(task)
    }

    pub(crate) fn enqueue(&self) -> Result<()> {
        self.fsm.invoke(TaskTransition::Enqueue).map(|_| ())
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn relies_on(&self) -> &[String] {
        &self.relies_on
    }

    pub fn priority(&self) -> i64 {
        self.priority
    }

    pub fn retry_limit(&self) -> u32 {
        self.retry_limit
    }

    pub fn backoff(&self) -> Duration {
        self.backoff
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn state(&self) -> TaskState {
        self.fsm.current()
    }

    /// Number of started attempts so far.
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn result(&self) -> Option<Value> {
        self.result.lock().clone()
    }

    pub fn error(&self) -> Option<Error> {
        self.error.lock().clone()
    }

    /// The task's lifecycle event surface.
    pub fn lifecycle(&self) -> &StateMachine<TaskState, TaskTransition> {
        &self.fsm
    }

    /// Terminal in the lifecycle sense: no further transition applies to the
    /// current execution.
    pub fn is_settled(&self) -> bool {
        match self.state() {
            TaskState::Succeeded | TaskState::Cancelled | TaskState::Removed => true,
            TaskState::Failed => self.attempts() > self.retry_limit,
            _ => false,
        }
    }

    /// Cancel the task if it is still pending. In-flight work is never
    /// interrupted; on any other state this is a no-op returning `false`.
    pub fn cancel(&self) -> Result<bool> {
        self.try_invoke(TaskTransition::Cancel)
    }

    /// Move the task to `removed` from any live state; a removed task
    /// ignores further lifecycle calls.
    pub fn remove(&self) -> Result<bool> {
        self.try_invoke(TaskTransition::Remove)
    }

    fn try_invoke(&self, transition: TaskTransition) -> Result<bool> {
        match self.fsm.invoke(transition) {
            Ok(_) => Ok(true),
            Err(Error::InvalidTransition { .. }) => Ok(false),
            Err(err) => Err(err),
        }
    }

    pub fn snapshot(&self) -> TaskSnapshot {
        TaskSnapshot {
            id: self.id.clone(),
            state: self.state().as_str().to_string(),
            result: self.result(),
            error: self.error.lock().as_ref().map(|e| e.to_string()),
            relies_on: self.relies_on.clone(),
            priority: self.priority,
            timeout_ms: self.timeout.map(|t| t.as_millis() as u64),
            backoff_ms: self.backoff.as_millis() as u64,
            retry_limit: self.retry_limit,
            attempts: self.attempts(),
        }
    }

    /// Run the work with retry, timeout, and backoff.
    ///
    /// Each attempt first awaits the workflow's pause gate and checks for
    /// removal. A timed-out attempt fails through the `timeout` transition
    /// and participates in the retry loop like any other failure; the
    /// underlying work is not interrupted.
    pub(crate) async fn execute(&self, deps: Vec<Value>) -> Result<Value> {
        if self.state() == TaskState::Cancelled {
            let err = self.error.lock().clone().unwrap_or(Error::Cancelled);
            return Err(err);
        }

        self.attempts.store(0, Ordering::SeqCst);

        loop {
            self.pause.wait().await;

            if self.state() == TaskState::Removed {
                let err = Error::RemovedBeforeExecution(self.id.clone());
                *self.error.lock() = Some(err.clone());
                return Err(err);
            }

            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            self.fsm.invoke(TaskTransition::Start)?;
            debug!(task = %self.id, attempt, "attempt started");

            let (outcome, timed_out) = self.run_attempt(&deps).await;

            match outcome {
                Ok(value) => {
                    *self.result.lock() = Some(value.clone());
                    self.fsm.invoke(TaskTransition::Succeed)?;
                    debug!(task = %self.id, attempt, "task succeeded");
                    return Ok(value);
                }
                Err(err) => {
                    *self.error.lock() = Some(err.clone());
                    if self.state() == TaskState::Running {
                        let transition = if timed_out {
                            TaskTransition::Timeout
                        } else {
                            TaskTransition::Fail
                        };
                        self.fsm.invoke(transition)?;
                    }
                    if attempt > self.retry_limit {
                        warn!(task = %self.id, attempt, error = %err, "task failed; retries exhausted");
                        return Err(err);
                    }
                    self.fsm.invoke(TaskTransition::Retry)?;
                    let delay = self.backoff * 2u32.pow(attempt - 1);
                    debug!(
                        task = %self.id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "task failed; backing off before retry"
                    );
                    sleep(delay).await;
                }
            }
        }
    }

    async fn run_attempt(&self, deps: &[Value]) -> (Result<Value>, bool) {
        let fut = (self.work)(deps.to_vec());
        match self.timeout {
            Some(budget) => match tokio::time::timeout(budget, fut).await {
                Ok(done) => (done.map_err(Error::from), false),
                Err(_) => (Err(Error::TimedOut(budget.as_millis() as u64)), true),
            },
            None => (fut.await.map_err(Error::from), false),
        }
    }
}

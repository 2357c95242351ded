// src/workflow/core.rs

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future::{join_all, BoxFuture, Shared};
use futures::FutureExt;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::dag::Dag;
use crate::errors::{Error, Result};
use crate::fsm::{self, Context, Named, StateMachine};
use crate::signal::{Signaller, SubscriberId, WILDCARD};
use crate::snapshot::WorkflowSnapshot;
use crate::sync::{PauseGate, Semaphore};
use crate::task::{Task, TaskConfig, TaskState, TaskTransition, WorkFn};
use crate::workflow::state::{WorkflowState, WorkflowTransition, WORKFLOW_MACHINE};

/// Workflow construction options.
#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    /// Capacity of the concurrency semaphore.
    pub max_concurrent: usize,
    /// Explicit id; defaults to a fresh opaque one.
    pub id: Option<String>,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 1,
            id: None,
        }
    }
}

/// Event multiplexed from one task's state machine onto the workflow's
/// shared task event plane.
#[derive(Clone)]
pub struct TaskEvent {
    /// Event name, e.g. `succeeded.enter` or `retry.after`.
    pub name: String,
    pub task: Arc<Task>,
    pub ctx: Context<TaskState, TaskTransition>,
}

type SettledValue = Result<Value>;
type TaskFuture = Shared<BoxFuture<'static, SettledValue>>;

#[derive(Default)]
struct SettledLog {
    order: Vec<Arc<Task>>,
    ids: HashSet<String>,
}

/// Owner of the DAG, workflow state machine, semaphore, scheduler, and the
/// task event plane. Cheap to clone; all clones share one engine.
pub struct Workflow {
    core: Arc<WorkflowCore>,
}

impl Clone for Workflow {
    fn clone(&self) -> Self {
        Self {
            core: self.core.clone(),
        }
    }
}

impl Default for Workflow {
    fn default() -> Self {
        Self::new(WorkflowConfig::default())
    }
}

pub(crate) struct WorkflowCore {
    id: String,
    fsm: StateMachine<WorkflowState, WorkflowTransition>,
    dag: Mutex<Dag<Arc<Task>>>,
    /// Every registered task, including ones pending deferred removal.
    tasks: Mutex<HashMap<String, Arc<Task>>>,
    semaphore: Semaphore,
    pause: Arc<PauseGate>,
    /// Memoized task futures: each task runs once per workflow life.
    processed: Mutex<HashMap<String, TaskFuture>>,
    /// Vertices removed mid-execution, detached on the next end/abort.
    deferred_removals: Mutex<HashSet<String>>,
    /// Multiplexed lifecycle events of every task.
    plane: Signaller<TaskEvent>,
    /// Per-task wildcard forwarder subscriptions, for unregistration.
    forwarders: Mutex<HashMap<String, SubscriberId>>,
    /// Tasks that reached a terminal lifecycle event, in that order.
    settled: Mutex<SettledLog>,
    /// The scheduler runs exactly once per workflow life.
    started: AtomicBool,
}

impl Workflow {
    pub fn new(config: WorkflowConfig) -> Self {
        let id = config.id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let core = Arc::new(WorkflowCore {
            fsm: StateMachine::new(id.clone(), &WORKFLOW_MACHINE),
            dag: Mutex::new(Dag::new()),
            tasks: Mutex::new(HashMap::new()),
            semaphore: Semaphore::new(config.max_concurrent),
            pause: Arc::new(PauseGate::new()),
            processed: Mutex::new(HashMap::new()),
            deferred_removals: Mutex::new(HashSet::new()),
            plane: Signaller::new(fsm::event_names::<TaskState, TaskTransition>()),
            forwarders: Mutex::new(HashMap::new()),
            settled: Mutex::new(SettledLog::default()),
            started: AtomicBool::new(false),
            id,
        });
        WorkflowCore::install_internal_handlers(&core)
            .expect("internal handler wiring uses machine-derived event names");
        Self { core }
    }

    pub fn id(&self) -> &str {
        &self.core.id
    }

    pub fn state(&self) -> WorkflowState {
        self.core.fsm.current()
    }

    /// The workflow's lifecycle event surface.
    pub fn lifecycle(&self) -> &StateMachine<WorkflowState, WorkflowTransition> {
        &self.core.fsm
    }

    /// The multiplexed task event plane.
    pub fn task_events(&self) -> &Signaller<TaskEvent> {
        &self.core.plane
    }

    /// Number of permits currently held by executing tasks.
    pub fn active(&self) -> usize {
        self.core.semaphore.active()
    }

    pub fn max_concurrent(&self) -> usize {
        self.core.semaphore.max()
    }

    pub fn task(&self, id: &str) -> Option<Arc<Task>> {
        self.core.tasks.lock().get(id).cloned()
    }

    /// Registered tasks in insertion order.
    pub fn tasks(&self) -> Vec<Arc<Task>> {
        self.core
            .dag
            .lock()
            .iter()
            .map(|(_, task)| task.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.core.dag.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.core.dag.lock().is_empty()
    }

    /// Register a unit of work. The config's `relies_on` list becomes the
    /// vertex's depends-on edges; duplicate-id and cycle errors bubble up
    /// unchanged.
    pub fn add<W, Fut>(&self, work: W, config: TaskConfig) -> Result<Arc<Task>>
    where
        W: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        let work: WorkFn = Arc::new(move |deps| work(deps).boxed());
        self.core.add_task(work, config)
    }

    /// Remove a task. Mid-execution the vertex detachment is deferred until
    /// the workflow settles; the task's own `remove` transition fires
    /// immediately either way.
    pub fn remove(&self, id: &str) -> Result<Arc<Task>> {
        self.core.remove_task(id)
    }

    /// Idempotent while already paused.
    pub fn pause(&self) -> Result<()> {
        self.core.pause_workflow()
    }

    /// Idempotent while already executing.
    pub fn resume(&self) -> Result<()> {
        self.core.resume_workflow()
    }

    /// Cancels every still-pending task; running tasks finish their current
    /// attempt. Idempotent while already aborted.
    pub fn abort(&self) -> Result<()> {
        self.core.abort_workflow()
    }

    /// Completes once the workflow is not paused.
    pub async fn check_pause(&self) {
        self.core.pause.wait().await
    }

    pub fn snapshot(&self) -> WorkflowSnapshot {
        WorkflowSnapshot {
            id: self.core.id.clone(),
            state: self.state().as_str().to_string(),
            tasks: self
                .core
                .dag
                .lock()
                .iter()
                .map(|(_, task)| task.snapshot())
                .collect(),
        }
    }

    pub(crate) fn core(&self) -> &Arc<WorkflowCore> {
        &self.core
    }
}

impl WorkflowCore {
    fn install_internal_handlers(core: &Arc<Self>) -> Result<()> {
        // The pause gate latches with the workflow lifecycle.
        let pause = core.pause.clone();
        core.fsm.on_enter(
            &[WorkflowState::Paused],
            Arc::new(move |_, _| {
                pause.close();
                Ok(())
            }),
        )?;
        let pause = core.pause.clone();
        core.fsm.on_leave(
            &[WorkflowState::Paused],
            Arc::new(move |_, _| {
                pause.open();
                Ok(())
            }),
        )?;

        // Abort cancels everything still pending.
        let weak = Arc::downgrade(core);
        core.fsm.on_enter(
            &[WorkflowState::Aborted],
            Arc::new(move |_, _| {
                let Some(core) = weak.upgrade() else {
                    return Ok(());
                };
                let tasks: Vec<Arc<Task>> = core.tasks.lock().values().cloned().collect();
                for task in tasks {
                    if let Ok(true) = task.cancel() {
                        debug!(task = %task.id(), "cancelled by workflow abort");
                    }
                }
                Ok(())
            }),
        )?;

        // Deferred removals detach just before the workflow settles.
        let weak = Arc::downgrade(core);
        core.fsm.on_before(
            &[WorkflowTransition::End, WorkflowTransition::Abort],
            Arc::new(move |_, _| {
                if let Some(core) = weak.upgrade() {
                    core.drain_removals();
                }
                Ok(())
            }),
        )?;

        // Keep an ordered record of settled tasks for late iterators.
        let weak = Arc::downgrade(core);
        core.plane.on(
            &[WILDCARD],
            Arc::new(move |_, event: &TaskEvent| {
                let Some(core) = weak.upgrade() else {
                    return Ok(());
                };
                if event.task.is_settled() {
                    let mut log = core.settled.lock();
                    if log.ids.insert(event.task.id().to_string()) {
                        log.order.push(event.task.clone());
                    }
                }
                Ok(())
            }),
        )?;

        Ok(())
    }

    fn add_task(self: &Arc<Self>, work: WorkFn, config: TaskConfig) -> Result<Arc<Task>> {
        let relies_on = config.relies_on.clone();
        let task = Task::new(work, config, self.pause.clone())?;
        let id = task.id().to_string();

        self.dag.lock().add_vertex(id.clone(), task.clone(), &relies_on)?;

        // Forward every lifecycle event onto the shared task plane.
        let weak = Arc::downgrade(self);
        let weak_task = Arc::downgrade(&task);
        let sub = task.lifecycle().on(
            &[WILDCARD],
            Arc::new(move |event, ctx| {
                let (Some(core), Some(task)) = (weak.upgrade(), weak_task.upgrade()) else {
                    return Ok(());
                };
                core.plane.emit(
                    event,
                    &TaskEvent {
                        name: event.to_string(),
                        task,
                        ctx: ctx.clone(),
                    },
                )
            }),
        )?;
        self.forwarders.lock().insert(id.clone(), sub);

        // The plane forgets a task once it has been removed.
        let weak = Arc::downgrade(self);
        let forwarded = id.clone();
        task.lifecycle().on_after(
            &[TaskTransition::Remove],
            Arc::new(move |_, _| {
                if let Some(core) = weak.upgrade() {
                    core.unregister_forwarder(&forwarded);
                }
                Ok(())
            }),
        )?;

        self.tasks.lock().insert(id.clone(), task.clone());
        task.enqueue()?;

        debug!(workflow = %self.id, task = %id, deps = ?relies_on, "task added");
        Ok(task)
    }

    fn remove_task(&self, id: &str) -> Result<Arc<Task>> {
        let task = self
            .tasks
            .lock()
            .get(id)
            .cloned()
            .ok_or_else(|| Error::UnknownId(id.to_string()))?;

        match self.fsm.current() {
            WorkflowState::Executing | WorkflowState::Paused => {
                self.deferred_removals.lock().insert(id.to_string());
                task.remove()?;
                debug!(workflow = %self.id, task = %id, "removal deferred until the workflow settles");
            }
            _ => {
                task.remove()?;
                self.detach(id);
            }
        }

        Ok(task)
    }

    fn pause_workflow(&self) -> Result<()> {
        if self.fsm.current() == WorkflowState::Paused {
            return Ok(());
        }
        self.fsm.invoke(WorkflowTransition::Pause).map(|_| ())
    }

    fn resume_workflow(&self) -> Result<()> {
        if self.fsm.current() == WorkflowState::Executing {
            return Ok(());
        }
        self.fsm.invoke(WorkflowTransition::Resume).map(|_| ())
    }

    pub(crate) fn abort_workflow(&self) -> Result<()> {
        if self.fsm.current() == WorkflowState::Aborted {
            return Ok(());
        }
        self.fsm.invoke(WorkflowTransition::Abort).map(|_| ())
    }

    fn drain_removals(&self) {
        let ids: Vec<String> = self.deferred_removals.lock().drain().collect();
        for id in ids {
            self.detach(&id);
        }
    }

    fn detach(&self, id: &str) {
        self.unregister_forwarder(id);
        self.dag.lock().remove_vertex(id);
        self.processed.lock().remove(id);
        self.tasks.lock().remove(id);
        debug!(workflow = %self.id, task = %id, "task detached");
    }

    fn unregister_forwarder(&self, id: &str) {
        let sub = self.forwarders.lock().remove(id);
        if let Some(sub) = sub {
            if let Some(task) = self.tasks.lock().get(id).cloned() {
                task.lifecycle().off(&[WILDCARD], sub);
            }
        }
    }

    /// Start the scheduler exactly once; `begin` fires synchronously so
    /// callers observe `executing` (or a begin failure) immediately.
    pub(crate) fn ensure_started(self: &Arc<Self>) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }
        if self.fsm.current() == WorkflowState::Idle {
            if let Err(err) = self.fsm.invoke(WorkflowTransition::Begin) {
                warn!(workflow = %self.id, error = %err, "begin transition failed");
                return;
            }
        }
        let core = self.clone();
        tokio::spawn(async move { core.process().await });
    }

    /// One scheduler pass: submit every task in topological order (higher
    /// priority first) and wait for all futures to settle.
    async fn process(self: Arc<Self>) {
        if self.fsm.current() == WorkflowState::Aborted {
            return;
        }
        self.pause.wait().await;

        let order = self
            .dag
            .lock()
            .topo_sort(|a, b| b.priority().cmp(&a.priority()));
        info!(
            workflow = %self.id,
            tasks = order.len(),
            max_concurrent = self.semaphore.max(),
            "scheduler pass started"
        );

        let futures: Vec<TaskFuture> = order.iter().filter_map(|id| self.run(id)).collect();
        join_all(futures).await;

        info!(workflow = %self.id, "scheduler pass finished; all task futures settled");
    }

    /// Memoized submission: each task runs once; dependents and the
    /// scheduler share the same settled future. Errors are captured into
    /// the settled value so sibling branches keep making progress.
    fn run(self: &Arc<Self>, id: &str) -> Option<TaskFuture> {
        let Some(task) = self.tasks.lock().get(id).cloned() else {
            warn!(workflow = %self.id, task = %id, "run requested for unregistered task");
            return None;
        };

        let mut processed = self.processed.lock();
        if let Some(fut) = processed.get(id) {
            return Some(fut.clone());
        }

        let core = self.clone();
        let fut: TaskFuture = async move {
            core.semaphore
                .with_lock(|| async {
                    let deps = task.relies_on().to_vec();
                    let mut values = Vec::with_capacity(deps.len());
                    let mut dependency_failed = false;
                    for dep in &deps {
                        let Some(dep_fut) = core.run(dep) else {
                            warn!(task = %task.id(), dep = %dep, "dependency never registered; skipping");
                            continue;
                        };
                        match dep_fut.await {
                            Ok(value) => values.push(value),
                            Err(err) => {
                                debug!(
                                    task = %task.id(),
                                    dep = %dep,
                                    error = %err,
                                    "dependency settled with error"
                                );
                                dependency_failed = true;
                            }
                        }
                    }
                    if dependency_failed {
                        // Turns the task into an immediate failure when
                        // execute runs; its work is never invoked.
                        let _ = task.cancel();
                    }
                    task.execute(values).await
                })
                .await
        }
        .boxed()
        .shared();

        processed.insert(id.to_string(), fut.clone());
        Some(fut)
    }

    pub(crate) fn is_finished(&self) -> bool {
        matches!(
            self.fsm.current(),
            WorkflowState::Done | WorkflowState::Aborted
        )
    }

    /// Settled tasks so far, in terminal-event order.
    pub(crate) fn settled_snapshot(&self) -> Vec<Arc<Task>> {
        self.settled.lock().order.clone()
    }

    /// True once every registered task has been yielded.
    pub(crate) fn all_yielded(&self, yielded: &HashSet<String>) -> bool {
        self.tasks.lock().keys().all(|id| yielded.contains(id))
    }

    /// DAG-sense terminality: nothing depends on this task.
    pub(crate) fn is_dag_terminal(&self, id: &str) -> bool {
        self.dag.lock().is_terminal(id)
    }

    pub(crate) fn plane(&self) -> &Signaller<TaskEvent> {
        &self.plane
    }

    /// Invoked by the iterator that yields the last task; a concurrent
    /// iterator losing this race sees a no-op.
    pub(crate) fn finish(&self) {
        match self.fsm.current() {
            WorkflowState::Executing | WorkflowState::Paused => {
                match self.fsm.invoke(WorkflowTransition::End) {
                    Ok(_) => info!(workflow = %self.id, "workflow done"),
                    Err(err) => debug!(workflow = %self.id, error = %err, "end transition skipped"),
                }
            }
            _ => {}
        }
    }
}

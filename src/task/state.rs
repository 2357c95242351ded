// src/task/state.rs

use crate::fsm::{FromStates, MachineDef, Named, TransitionDef};

/// Task lifecycle states.
///
/// `succeeded`, `cancelled`, and `removed` are terminal; `failed` is
/// terminal only once retries are exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskState {
    Created,
    Pending,
    Running,
    Succeeded,
    Failed,
    Cancelled,
    Removed,
}

impl Named for TaskState {
    const ALL: &'static [Self] = &[
        TaskState::Created,
        TaskState::Pending,
        TaskState::Running,
        TaskState::Succeeded,
        TaskState::Failed,
        TaskState::Cancelled,
        TaskState::Removed,
    ];

    fn as_str(&self) -> &'static str {
        match self {
            TaskState::Created => "created",
            TaskState::Pending => "pending",
            TaskState::Running => "running",
            TaskState::Succeeded => "succeeded",
            TaskState::Failed => "failed",
            TaskState::Cancelled => "cancelled",
            TaskState::Removed => "removed",
        }
    }
}

/// Task lifecycle transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskTransition {
    Enqueue,
    Start,
    Succeed,
    Fail,
    Timeout,
    Retry,
    Cancel,
    Remove,
}

impl Named for TaskTransition {
    const ALL: &'static [Self] = &[
        TaskTransition::Enqueue,
        TaskTransition::Start,
        TaskTransition::Succeed,
        TaskTransition::Fail,
        TaskTransition::Timeout,
        TaskTransition::Retry,
        TaskTransition::Cancel,
        TaskTransition::Remove,
    ];

    fn as_str(&self) -> &'static str {
        match self {
            TaskTransition::Enqueue => "enqueue",
            TaskTransition::Start => "start",
            TaskTransition::Succeed => "succeed",
            TaskTransition::Fail => "fail",
            TaskTransition::Timeout => "timeout",
            TaskTransition::Retry => "retry",
            TaskTransition::Cancel => "cancel",
            TaskTransition::Remove => "remove",
        }
    }
}

/// Dispatch table for the task lifecycle.
///
/// Cancellation applies only while pending; a removed task accepts no
/// further transitions.
pub static TASK_MACHINE: MachineDef<TaskState, TaskTransition> = MachineDef {
    initial: TaskState::Created,
    transitions: &[
        (
            TaskTransition::Enqueue,
            TransitionDef {
                from: FromStates::One(TaskState::Created),
                to: TaskState::Pending,
            },
        ),
        (
            TaskTransition::Start,
            TransitionDef {
                from: FromStates::One(TaskState::Pending),
                to: TaskState::Running,
            },
        ),
        (
            TaskTransition::Succeed,
            TransitionDef {
                from: FromStates::One(TaskState::Running),
                to: TaskState::Succeeded,
            },
        ),
        (
            TaskTransition::Fail,
            TransitionDef {
                from: FromStates::One(TaskState::Running),
                to: TaskState::Failed,
            },
        ),
        (
            TaskTransition::Timeout,
            TransitionDef {
                from: FromStates::One(TaskState::Running),
                to: TaskState::Failed,
            },
        ),
        (
            TaskTransition::Retry,
            TransitionDef {
                from: FromStates::One(TaskState::Failed),
                to: TaskState::Pending,
            },
        ),
        (
            TaskTransition::Cancel,
            TransitionDef {
                from: FromStates::One(TaskState::Pending),
                to: TaskState::Cancelled,
            },
        ),
        (
            TaskTransition::Remove,
            TransitionDef {
                from: FromStates::Many(&[
                    TaskState::Created,
                    TaskState::Pending,
                    TaskState::Running,
                    TaskState::Succeeded,
                    TaskState::Failed,
                    TaskState::Cancelled,
                ]),
                to: TaskState::Removed,
            },
        ),
    ],
};

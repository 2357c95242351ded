// src/workflow/state.rs

use crate::fsm::{FromStates, MachineDef, Named, TransitionDef};

/// Workflow lifecycle states; `done` and `aborted` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkflowState {
    Idle,
    Executing,
    Paused,
    Done,
    Aborted,
}

impl Named for WorkflowState {
    const ALL: &'static [Self] = &[
        WorkflowState::Idle,
        WorkflowState::Executing,
        WorkflowState::Paused,
        WorkflowState::Done,
        WorkflowState::Aborted,
    ];

    fn as_str(&self) -> &'static str {
        match self {
            WorkflowState::Idle => "idle",
            WorkflowState::Executing => "executing",
            WorkflowState::Paused => "paused",
            WorkflowState::Done => "done",
            WorkflowState::Aborted => "aborted",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkflowTransition {
    Begin,
    Pause,
    Resume,
    End,
    Abort,
}

impl Named for WorkflowTransition {
    const ALL: &'static [Self] = &[
        WorkflowTransition::Begin,
        WorkflowTransition::Pause,
        WorkflowTransition::Resume,
        WorkflowTransition::End,
        WorkflowTransition::Abort,
    ];

    fn as_str(&self) -> &'static str {
        match self {
            WorkflowTransition::Begin => "begin",
            WorkflowTransition::Pause => "pause",
            WorkflowTransition::Resume => "resume",
            WorkflowTransition::End => "end",
            WorkflowTransition::Abort => "abort",
        }
    }
}

/// Dispatch table for the workflow lifecycle.
pub static WORKFLOW_MACHINE: MachineDef<WorkflowState, WorkflowTransition> = MachineDef {
    initial: WorkflowState::Idle,
    transitions: &[
        (
            WorkflowTransition::Begin,
            TransitionDef {
                from: FromStates::One(WorkflowState::Idle),
                to: WorkflowState::Executing,
            },
        ),
        (
            WorkflowTransition::Pause,
            TransitionDef {
                from: FromStates::One(WorkflowState::Executing),
                to: WorkflowState::Paused,
            },
        ),
        (
            WorkflowTransition::Resume,
            TransitionDef {
                from: FromStates::One(WorkflowState::Paused),
                to: WorkflowState::Executing,
            },
        ),
        (
            WorkflowTransition::End,
            TransitionDef {
                from: FromStates::Many(&[WorkflowState::Executing, WorkflowState::Paused]),
                to: WorkflowState::Done,
            },
        ),
        (
            WorkflowTransition::Abort,
            TransitionDef {
                from: FromStates::Many(&[WorkflowState::Executing, WorkflowState::Paused]),
                to: WorkflowState::Aborted,
            },
        ),
    ],
};

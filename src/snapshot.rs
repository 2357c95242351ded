// src/snapshot.rs

//! Structural snapshots of tasks and workflows, suitable for serialization
//! into logs or host-side persistence.

use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Serialize)]
pub struct TaskSnapshot {
    pub id: String,
    pub state: String,
    pub result: Option<Value>,
    /// Stringified task error, if any.
    pub error: Option<String>,
    pub relies_on: Vec<String>,
    pub priority: i64,
    pub timeout_ms: Option<u64>,
    pub backoff_ms: u64,
    pub retry_limit: u32,
    pub attempts: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkflowSnapshot {
    pub id: String,
    pub state: String,
    /// Task snapshots in insertion order.
    pub tasks: Vec<TaskSnapshot>,
}

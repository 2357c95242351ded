mod common;

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use serde_json::json;
use tokio::time::sleep;

use flowdag::{Error as FlowError, TaskConfig, TaskState, Workflow, WorkflowState};

type TestResult = Result<(), Box<dyn Error>>;

#[tokio::test]
async fn removal_before_start_detaches_immediately() -> TestResult {
    common::init_tracing();

    let flow = Workflow::default();
    flow.add(|_| async { Ok(json!(null)) }, TaskConfig::new().id("keep"))?;
    flow.add(|_| async { Ok(json!(null)) }, TaskConfig::new().id("drop"))?;
    assert_eq!(flow.len(), 2);

    let removed = flow.remove("drop")?;
    assert_eq!(removed.state(), TaskState::Removed);
    // Idle workflow: the vertex is detached on the spot.
    assert_eq!(flow.len(), 1);
    assert!(flow.task("drop").is_none());

    let err = flow.remove("drop").unwrap_err();
    assert!(matches!(err, FlowError::UnknownId(_)));
    Ok(())
}

#[tokio::test]
async fn mid_execution_removal_is_deferred_until_done() -> TestResult {
    common::init_tracing();

    let flow = Workflow::default();
    let gate = Arc::new(tokio::sync::Notify::new());

    {
        let gate = gate.clone();
        flow.add(
            move |_| {
                let gate = gate.clone();
                async move {
                    gate.notified().await;
                    Ok(json!("slow"))
                }
            },
            TaskConfig::new().id("slow"),
        )?;
    }
    flow.add(|_| async { Ok(json!("victim")) }, TaskConfig::new().id("victim"))?;

    let consumer = tokio::spawn({
        let flow = flow.clone();
        async move {
            flow.iter()
                .map(|task| (task.id().to_string(), task.state()))
                .collect::<Vec<_>>()
                .await
        }
    });

    sleep(Duration::from_millis(50)).await;
    assert_eq!(flow.state(), WorkflowState::Executing);

    // The remove transition fires immediately...
    let removed = flow.remove("victim")?;
    assert_eq!(removed.state(), TaskState::Removed);
    // ...but the vertex stays attached while the run is in flight.
    assert!(flow.task("victim").is_some());
    assert_eq!(flow.len(), 2);

    gate.notify_one();
    let yielded = consumer.await?;

    // The removed task was yielded like any other terminal task.
    assert!(yielded.contains(&("victim".to_string(), TaskState::Removed)));
    assert!(yielded.contains(&("slow".to_string(), TaskState::Succeeded)));

    // Detachment happened on the way into `done`.
    assert_eq!(flow.state(), WorkflowState::Done);
    assert!(flow.task("victim").is_none());
    assert_eq!(flow.len(), 1);
    Ok(())
}

#[tokio::test]
async fn pause_holds_back_new_attempts() -> TestResult {
    common::init_tracing();

    let flow = Workflow::default();
    let order: Arc<parking_lot::Mutex<Vec<&'static str>>> = Arc::default();

    for id in ["first", "second"] {
        let order = order.clone();
        flow.add(
            move |_| {
                order.lock().push(id);
                async {
                    sleep(Duration::from_millis(30)).await;
                    Ok(json!(null))
                }
            },
            TaskConfig::new().id(id),
        )?;
    }

    let consumer = tokio::spawn({
        let flow = flow.clone();
        async move { flow.iter().count().await }
    });

    sleep(Duration::from_millis(10)).await;
    flow.pause()?;
    assert_eq!(flow.state(), WorkflowState::Paused);
    // Pausing while paused is a no-op.
    flow.pause()?;

    // The first task finishes its attempt; the second stays gated.
    sleep(Duration::from_millis(60)).await;
    assert_eq!(order.lock().len(), 1);

    flow.resume()?;
    assert_eq!(flow.state(), WorkflowState::Executing);
    // Resuming while executing is a no-op.
    flow.resume()?;

    assert_eq!(consumer.await?, 2);
    assert_eq!(order.lock().as_slice(), ["first", "second"]);
    assert_eq!(flow.state(), WorkflowState::Done);
    Ok(())
}

#[tokio::test]
async fn pause_from_idle_is_a_state_error() -> TestResult {
    common::init_tracing();

    let flow = Workflow::default();
    let err = flow.pause().unwrap_err();
    assert!(matches!(err, FlowError::InvalidTransition { .. }));
    Ok(())
}

#[tokio::test]
async fn snapshots_capture_the_structural_state() -> TestResult {
    common::init_tracing();

    let flow = Workflow::default();
    flow.add(|_| async { Ok(json!(3)) }, TaskConfig::new().id("a"))?;
    flow.add(
        |deps| async move { Ok(deps[0].clone()) },
        TaskConfig::new()
            .id("b")
            .relies_on(["a"])
            .priority(2)
            .retry_limit(1)
            .timeout(Duration::from_millis(500)),
    )?;

    flow.iter().count().await;

    let snapshot = flow.snapshot();
    assert_eq!(snapshot.state, "done");
    assert_eq!(snapshot.tasks.len(), 2);

    let b = &snapshot.tasks[1];
    assert_eq!(b.id, "b");
    assert_eq!(b.state, "succeeded");
    assert_eq!(b.result, Some(json!(3)));
    assert_eq!(b.relies_on, vec!["a".to_string()]);
    assert_eq!(b.priority, 2);
    assert_eq!(b.retry_limit, 1);
    assert_eq!(b.timeout_ms, Some(500));
    assert_eq!(b.attempts, 1);
    assert!(b.error.is_none());

    let encoded = serde_json::to_value(&snapshot)?;
    assert_eq!(encoded["tasks"][0]["id"], json!("a"));
    Ok(())
}

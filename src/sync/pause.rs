// src/sync/pause.rs

use tokio::sync::watch;

/// A re-armable latch suspending task attempts while the workflow is paused.
///
/// The gate closes when the workflow enters `paused` and opens when it
/// leaves; [`PauseGate::wait`] suspends while closed and is a cheap no-op
/// while open.
pub struct PauseGate {
    tx: watch::Sender<bool>,
}

impl Default for PauseGate {
    fn default() -> Self {
        Self::new()
    }
}

impl PauseGate {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    pub fn close(&self) {
        self.tx.send_replace(true);
    }

    pub fn open(&self) {
        self.tx.send_replace(false);
    }

    pub fn is_closed(&self) -> bool {
        *self.tx.borrow()
    }

    /// Complete immediately if the gate is open, otherwise suspend until it
    /// opens.
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        while *rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn open_gate_is_a_no_op() {
        let gate = PauseGate::new();
        tokio::time::timeout(Duration::from_millis(10), gate.wait())
            .await
            .expect("open gate must not block");
    }

    #[tokio::test]
    async fn closed_gate_blocks_until_opened() {
        let gate = std::sync::Arc::new(PauseGate::new());
        gate.close();
        assert!(gate.is_closed());

        let waiter = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.wait().await })
        };

        // Still blocked after a beat.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        gate.open();
        tokio::time::timeout(Duration::from_millis(100), waiter)
            .await
            .expect("gate open must release waiters")
            .unwrap();
    }
}

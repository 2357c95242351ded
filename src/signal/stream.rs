// src/signal/stream.rs

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;

/// Pull-based, order-preserving buffer of event payloads.
///
/// Payloads enqueue as events are emitted, whether or not a consumer is
/// currently pulling, and are delivered in emission order. The stream is
/// infinite until [`EventStream::cancel`] is called; dropping the stream
/// also unsubscribes it from the signaller.
pub struct EventStream<D> {
    rx: mpsc::UnboundedReceiver<D>,
    unsubscribe: Option<Box<dyn FnOnce() + Send>>,
    cancelled: bool,
}

impl<D> EventStream<D> {
    pub(crate) fn new(
        rx: mpsc::UnboundedReceiver<D>,
        unsubscribe: Box<dyn FnOnce() + Send>,
    ) -> Self {
        Self {
            rx,
            unsubscribe: Some(unsubscribe),
            cancelled: false,
        }
    }

    /// Unsubscribe from the signaller. Buffered payloads are dropped and the
    /// stream ends on the next pull.
    pub fn cancel(&mut self) {
        self.cancelled = true;
        if let Some(f) = self.unsubscribe.take() {
            f();
        }
        self.rx.close();
    }
}

impl<D> Drop for EventStream<D> {
    fn drop(&mut self) {
        if let Some(f) = self.unsubscribe.take() {
            f();
        }
    }
}

impl<D> Stream for EventStream<D> {
    type Item = D;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<D>> {
        let this = self.get_mut();
        if this.cancelled {
            return Poll::Ready(None);
        }
        this.rx.poll_recv(cx)
    }
}

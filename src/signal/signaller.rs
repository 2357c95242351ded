// src/signal/signaller.rs

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::errors::{Error, Result};
use crate::signal::stream::EventStream;

/// Name subscribing a receiver to every event of the signaller.
pub const WILDCARD: &str = "*";

/// Callback invoked with the event name and a borrowed payload.
///
/// Returning an error aborts the remaining handler chain for that emission
/// and propagates to the emitter.
pub type Handler<D> = Arc<dyn Fn(&str, &D) -> Result<()> + Send + Sync>;

/// Token identifying one subscription, consumed by [`Signaller::off`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

struct Entry<D> {
    id: SubscriberId,
    handler: Handler<D>,
    once: bool,
    cancel: Option<CancellationToken>,
}

impl<D> Clone for Entry<D> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            handler: self.handler.clone(),
            once: self.once,
            cancel: self.cancel.clone(),
        }
    }
}

impl<D> Entry<D> {
    fn live(&self) -> bool {
        self.cancel.as_ref().map_or(true, |t| !t.is_cancelled())
    }
}

struct Inner<D> {
    names: Vec<String>,
    handlers: HashMap<String, Vec<Entry<D>>>,
    wildcards: Vec<Entry<D>>,
    next_id: u64,
}

impl<D> Inner<D> {
    fn remove_everywhere(&mut self, id: SubscriberId) {
        self.wildcards.retain(|e| e.id != id);
        for list in self.handlers.values_mut() {
            list.retain(|e| e.id != id);
        }
    }
}

/// Multi-event emitter over a closed set of legal event names.
///
/// Handlers for one event run synchronously in subscription order; wildcard
/// receivers run first, with the event name as context. Subscribing to a
/// name outside the declared set fails with [`Error::UnknownEvent`].
pub struct Signaller<D: Clone + Send + 'static> {
    inner: Arc<Mutex<Inner<D>>>,
}

impl<D: Clone + Send + 'static> Signaller<D> {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                names: names.into_iter().map(Into::into).collect(),
                handlers: HashMap::new(),
                wildcards: Vec::new(),
                next_id: 0,
            })),
        }
    }

    /// The declared event names.
    pub fn names(&self) -> Vec<String> {
        self.inner.lock().names.clone()
    }

    /// Subscribe `handler` to each named event (or `"*"` for all).
    pub fn on(&self, events: &[&str], handler: Handler<D>) -> Result<SubscriberId> {
        self.subscribe(events, handler, false, None)
    }

    /// Like [`Signaller::on`], but the subscription is dropped once `token`
    /// is cancelled.
    pub fn on_with_token(
        &self,
        events: &[&str],
        handler: Handler<D>,
        token: CancellationToken,
    ) -> Result<SubscriberId> {
        self.subscribe(events, handler, false, Some(token))
    }

    /// Subscribe once: the first invocation on any matching event
    /// unsubscribes the handler from all of them.
    pub fn once(&self, events: &[&str], handler: Handler<D>) -> Result<SubscriberId> {
        self.subscribe(events, handler, true, None)
    }

    fn subscribe(
        &self,
        events: &[&str],
        handler: Handler<D>,
        once: bool,
        cancel: Option<CancellationToken>,
    ) -> Result<SubscriberId> {
        let mut inner = self.inner.lock();
        for event in events {
            if *event != WILDCARD && !inner.names.iter().any(|n| n == event) {
                return Err(Error::UnknownEvent((*event).to_string()));
            }
        }

        let id = SubscriberId(inner.next_id);
        inner.next_id += 1;

        for event in events {
            let entry = Entry {
                id,
                handler: handler.clone(),
                once,
                cancel: cancel.clone(),
            };
            if *event == WILDCARD {
                inner.wildcards.push(entry);
            } else {
                inner
                    .handlers
                    .entry((*event).to_string())
                    .or_default()
                    .push(entry);
            }
        }

        Ok(id)
    }

    /// Remove one subscription from the named events. Idempotent.
    pub fn off(&self, events: &[&str], id: SubscriberId) {
        let mut inner = self.inner.lock();
        for event in events {
            if *event == WILDCARD {
                inner.wildcards.retain(|e| e.id != id);
            } else if let Some(list) = inner.handlers.get_mut(*event) {
                list.retain(|e| e.id != id);
            }
        }
    }

    /// Remove every subscriber on the named events; `"*"` clears all events
    /// plus wildcard receivers.
    pub fn clear(&self, events: &[&str]) {
        let mut inner = self.inner.lock();
        for event in events {
            if *event == WILDCARD {
                inner.handlers.clear();
                inner.wildcards.clear();
            } else {
                inner.handlers.remove(*event);
            }
        }
    }

    /// Synchronously invoke wildcard receivers, then the event's handlers,
    /// in subscription order. The first handler error aborts the chain.
    pub fn emit(&self, event: &str, data: &D) -> Result<()> {
        let (wildcards, named) = {
            let mut inner = self.inner.lock();
            if !inner.names.iter().any(|n| n == event) {
                return Err(Error::UnknownEvent(event.to_string()));
            }

            // Prune subscriptions whose cancel token fired.
            inner.wildcards.retain(Entry::live);
            if let Some(list) = inner.handlers.get_mut(event) {
                list.retain(Entry::live);
            }

            let wildcards = inner.wildcards.clone();
            let named = inner.handlers.get(event).cloned().unwrap_or_default();

            // One-shot entries are removed before their handler runs so a
            // reentrant emission cannot fire them twice.
            for entry in wildcards.iter().chain(named.iter()) {
                if entry.once {
                    inner.remove_everywhere(entry.id);
                }
            }

            (wildcards, named)
        };

        for entry in wildcards.iter().chain(named.iter()) {
            (entry.handler)(event, data)?;
        }

        Ok(())
    }

    /// A pull-based sequence of payloads from the listed events, buffered in
    /// emission order. Cancelling (or dropping) the stream unsubscribes.
    pub fn stream(&self, events: &[&str]) -> Result<EventStream<D>> {
        let (tx, rx) = mpsc::unbounded_channel();
        let handler: Handler<D> = Arc::new(move |_event, data: &D| {
            // A closed receiver just means the consumer went away; the
            // subscription itself is removed via cancel/drop.
            let _ = tx.send(data.clone());
            Ok(())
        });
        let id = self.subscribe(events, handler, false, None)?;

        let weak: Weak<Mutex<Inner<D>>> = Arc::downgrade(&self.inner);
        let unsubscribe = Box::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.lock().remove_everywhere(id);
            }
        });

        Ok(EventStream::new(rx, unsubscribe))
    }
}

// src/fsm/machine.rs

use std::fmt;
use std::hash::Hash;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::errors::{Error, Result};
use crate::signal::{EventStream, Handler, Signaller, SubscriberId};

/// A closed set of named values, implemented by state and transition enums.
pub trait Named: Copy + Eq + Hash + fmt::Debug + Send + Sync + 'static {
    const ALL: &'static [Self];

    fn as_str(&self) -> &'static str;
}

/// Source-state pattern of one transition; `Any` matches every state.
#[derive(Debug, Clone, Copy)]
pub enum FromStates<S: 'static> {
    Any,
    One(S),
    Many(&'static [S]),
}

impl<S: Named> FromStates<S> {
    fn matches(&self, state: S) -> bool {
        match self {
            FromStates::Any => true,
            FromStates::One(s) => *s == state,
            FromStates::Many(set) => set.contains(&state),
        }
    }
}

/// One row of the dispatch table.
#[derive(Debug, Clone, Copy)]
pub struct TransitionDef<S: 'static> {
    pub from: FromStates<S>,
    pub to: S,
}

/// Declarative machine definition: initial state plus dispatch table.
#[derive(Debug)]
pub struct MachineDef<S: 'static, T: 'static> {
    pub initial: S,
    pub transitions: &'static [(T, TransitionDef<S>)],
}

/// Context shared by the four events of one `invoke`.
#[derive(Debug, Clone)]
pub struct Context<S, T> {
    /// Id of the machine owner (task or workflow).
    pub id: String,
    pub from: S,
    pub to: S,
    pub transition: T,
}

/// Event name for `{transition}.before`.
pub fn before<T: Named>(transition: T) -> String {
    format!("{}.before", transition.as_str())
}

/// Event name for `{transition}.after`.
pub fn after<T: Named>(transition: T) -> String {
    format!("{}.after", transition.as_str())
}

/// Event name for `{state}.enter`.
pub fn enter<S: Named>(state: S) -> String {
    format!("{}.enter", state.as_str())
}

/// Event name for `{state}.leave`.
pub fn leave<S: Named>(state: S) -> String {
    format!("{}.leave", state.as_str())
}

/// The full legal event-name set of a machine over `S`/`T`.
pub fn event_names<S: Named, T: Named>() -> Vec<String> {
    let mut names = Vec::with_capacity(S::ALL.len() * 2 + T::ALL.len() * 2);
    for t in T::ALL {
        names.push(before(*t));
        names.push(after(*t));
    }
    for s in S::ALL {
        names.push(enter(*s));
        names.push(leave(*s));
    }
    names
}

/// A state machine instance with its own event surface.
///
/// The handler chain of one `invoke` is synchronous end-to-end; a handler
/// that fails aborts the remaining chain for that invocation.
pub struct StateMachine<S: Named, T: Named> {
    id: String,
    def: &'static MachineDef<S, T>,
    state: Mutex<S>,
    events: Signaller<Context<S, T>>,
}

impl<S: Named, T: Named> StateMachine<S, T> {
    pub fn new(id: impl Into<String>, def: &'static MachineDef<S, T>) -> Self {
        Self {
            id: id.into(),
            def,
            state: Mutex::new(def.initial),
            events: Signaller::new(event_names::<S, T>()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn current(&self) -> S {
        *self.state.lock()
    }

    /// True if `transition` is legal from the current state.
    pub fn can(&self, transition: T) -> bool {
        let state = self.current();
        self.lookup(transition)
            .map(|def| def.from.matches(state))
            .unwrap_or(false)
    }

    fn lookup(&self, transition: T) -> Option<&TransitionDef<S>> {
        self.def
            .transitions
            .iter()
            .find(|(t, _)| *t == transition)
            .map(|(_, def)| def)
    }

    /// Run one transition: validate, emit `before` and `leave`, assign the
    /// new state, then emit `enter` and `after`, all with one context value.
    pub fn invoke(&self, transition: T) -> Result<Context<S, T>> {
        let ctx = {
            let state = self.state.lock();
            let def = self.lookup(transition).ok_or(Error::InvalidTransition {
                from: state.as_str(),
                transition: transition.as_str(),
            })?;
            if !def.from.matches(*state) {
                return Err(Error::InvalidTransition {
                    from: state.as_str(),
                    transition: transition.as_str(),
                });
            }
            Context {
                id: self.id.clone(),
                from: *state,
                to: def.to,
                transition,
            }
        };

        trace!(
            machine = %self.id,
            from = ctx.from.as_str(),
            to = ctx.to.as_str(),
            transition = transition.as_str(),
            "invoking transition"
        );

        self.events.emit(&before(transition), &ctx)?;
        self.events.emit(&leave(ctx.from), &ctx)?;
        *self.state.lock() = ctx.to;
        self.events.emit(&enter(ctx.to), &ctx)?;
        self.events.emit(&after(transition), &ctx)?;
        Ok(ctx)
    }

    /// Subscribe to raw event names (validated against the machine's set).
    pub fn on(&self, events: &[&str], handler: Handler<Context<S, T>>) -> Result<SubscriberId> {
        self.events.on(events, handler)
    }

    /// Like [`StateMachine::on`], auto-unsubscribing once `token` cancels.
    pub fn on_with_token(
        &self,
        events: &[&str],
        handler: Handler<Context<S, T>>,
        token: CancellationToken,
    ) -> Result<SubscriberId> {
        self.events.on_with_token(events, handler, token)
    }

    pub fn once(&self, events: &[&str], handler: Handler<Context<S, T>>) -> Result<SubscriberId> {
        self.events.once(events, handler)
    }

    pub fn off(&self, events: &[&str], id: SubscriberId) {
        self.events.off(events, id)
    }

    pub fn clear(&self, events: &[&str]) {
        self.events.clear(events)
    }

    pub fn on_before(&self, transitions: &[T], handler: Handler<Context<S, T>>) -> Result<SubscriberId> {
        self.on_names(transitions.iter().map(|t| before(*t)), handler)
    }

    pub fn on_after(&self, transitions: &[T], handler: Handler<Context<S, T>>) -> Result<SubscriberId> {
        self.on_names(transitions.iter().map(|t| after(*t)), handler)
    }

    pub fn on_enter(&self, states: &[S], handler: Handler<Context<S, T>>) -> Result<SubscriberId> {
        self.on_names(states.iter().map(|s| enter(*s)), handler)
    }

    pub fn on_leave(&self, states: &[S], handler: Handler<Context<S, T>>) -> Result<SubscriberId> {
        self.on_names(states.iter().map(|s| leave(*s)), handler)
    }

    fn on_names(
        &self,
        names: impl Iterator<Item = String>,
        handler: Handler<Context<S, T>>,
    ) -> Result<SubscriberId> {
        let names: Vec<String> = names.collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        self.events.on(&refs, handler)
    }

    /// Pull-based stream over the named events (same contract as
    /// [`Signaller::stream`]).
    pub fn stream(&self, events: &[&str]) -> Result<EventStream<Context<S, T>>> {
        self.events.stream(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum Light {
        Red,
        Green,
        Broken,
    }

    impl Named for Light {
        const ALL: &'static [Self] = &[Light::Red, Light::Green, Light::Broken];

        fn as_str(&self) -> &'static str {
            match self {
                Light::Red => "red",
                Light::Green => "green",
                Light::Broken => "broken",
            }
        }
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum Switch {
        Go,
        Stop,
        Smash,
    }

    impl Named for Switch {
        const ALL: &'static [Self] = &[Switch::Go, Switch::Stop, Switch::Smash];

        fn as_str(&self) -> &'static str {
            match self {
                Switch::Go => "go",
                Switch::Stop => "stop",
                Switch::Smash => "smash",
            }
        }
    }

    static LIGHT_DEF: MachineDef<Light, Switch> = MachineDef {
        initial: Light::Red,
        transitions: &[
            (
                Switch::Go,
                TransitionDef {
                    from: FromStates::One(Light::Red),
                    to: Light::Green,
                },
            ),
            (
                Switch::Stop,
                TransitionDef {
                    from: FromStates::One(Light::Green),
                    to: Light::Red,
                },
            ),
            (
                Switch::Smash,
                TransitionDef {
                    from: FromStates::Any,
                    to: Light::Broken,
                },
            ),
        ],
    };

    #[test]
    fn invoke_moves_through_the_table() {
        let fsm = StateMachine::new("light", &LIGHT_DEF);
        assert_eq!(fsm.current(), Light::Red);

        let ctx = fsm.invoke(Switch::Go).unwrap();
        assert_eq!(ctx.from, Light::Red);
        assert_eq!(ctx.to, Light::Green);
        assert_eq!(fsm.current(), Light::Green);
    }

    #[test]
    fn invalid_transition_is_rejected_and_state_unchanged() {
        let fsm = StateMachine::new("light", &LIGHT_DEF);
        let err = fsm.invoke(Switch::Stop).unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidTransition {
                from: "red",
                transition: "stop"
            }
        ));
        assert_eq!(fsm.current(), Light::Red);
    }

    #[test]
    fn wildcard_from_matches_any_state() {
        let fsm = StateMachine::new("light", &LIGHT_DEF);
        fsm.invoke(Switch::Go).unwrap();
        assert!(fsm.can(Switch::Smash));
        fsm.invoke(Switch::Smash).unwrap();
        assert_eq!(fsm.current(), Light::Broken);
    }

    #[test]
    fn events_fire_in_before_leave_enter_after_order() {
        let fsm = StateMachine::new("light", &LIGHT_DEF);
        let log: Arc<parking_lot::Mutex<Vec<String>>> = Arc::default();
        let sink = log.clone();
        fsm.on(
            &["*"],
            Arc::new(move |event, ctx: &Context<Light, Switch>| {
                sink.lock()
                    .push(format!("{event}/{:?}->{:?}", ctx.from, ctx.to));
                Ok(())
            }),
        )
        .unwrap();

        fsm.invoke(Switch::Go).unwrap();
        assert_eq!(
            log.lock().as_slice(),
            [
                "go.before/Red->Green",
                "red.leave/Red->Green",
                "green.enter/Red->Green",
                "go.after/Red->Green",
            ]
        );
    }

    #[test]
    fn after_observer_sees_the_new_state() {
        let fsm = Arc::new(StateMachine::new("light", &LIGHT_DEF));
        let seen: Arc<parking_lot::Mutex<Option<Light>>> = Arc::default();
        let sink = seen.clone();
        let probe = Arc::downgrade(&fsm);
        fsm.on_after(
            &[Switch::Go],
            Arc::new(move |_, _| {
                if let Some(fsm) = probe.upgrade() {
                    *sink.lock() = Some(fsm.current());
                }
                Ok(())
            }),
        )
        .unwrap();

        fsm.invoke(Switch::Go).unwrap();
        assert_eq!(*seen.lock(), Some(Light::Green));
    }

    #[test]
    fn typed_subscriptions_reject_nothing_from_the_declared_sets() {
        let fsm = StateMachine::new("light", &LIGHT_DEF);
        fsm.on_enter(&[Light::Broken], Arc::new(|_, _| Ok(()))).unwrap();
        fsm.on_before(&[Switch::Smash], Arc::new(|_, _| Ok(()))).unwrap();
        assert!(fsm.stream(&["green.enter", "go.after"]).is_ok());
        assert!(matches!(
            fsm.stream(&["purple.enter"]),
            Err(Error::UnknownEvent(_))
        ));
    }
}

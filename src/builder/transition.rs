//! Builder for constructing state transitions.

use crate::builder::error::BuildError;
use crate::core::{EventContext, Guard, Identifier};
use crate::engine::{ActionResult, BoxError, Transition, TransitionAction};
use std::any::Any;
use std::sync::Arc;

/// Builder for constructing transitions with a fluent API.
///
/// A transition without a target is internal: its actions run but the
/// machine neither exits nor enters any state.
pub struct TransitionBuilder<S, E> {
    from: Option<S>,
    event: Option<E>,
    to: Option<S>,
    guard: Option<Guard<S, E>>,
    actions: Vec<TransitionAction<S, E>>,
}

impl<S: Identifier, E: Identifier> TransitionBuilder<S, E> {
    pub fn new() -> Self {
        Self {
            from: None,
            event: None,
            to: None,
            guard: None,
            actions: Vec::new(),
        }
    }

    /// Set the source state (required).
    pub fn from(mut self, state: S) -> Self {
        self.from = Some(state);
        self
    }

    /// Set the triggering event (required).
    pub fn on(mut self, event: E) -> Self {
        self.event = Some(event);
        self
    }

    /// Set the target state. Omit for an internal transition.
    pub fn to(mut self, state: S) -> Self {
        self.to = Some(state);
        self
    }

    pub fn guard(mut self, guard: Guard<S, E>) -> Self {
        self.guard = Some(guard);
        self
    }

    /// Add a guard using a closure.
    pub fn when<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&EventContext<S, E>) -> bool + Send + Sync + 'static,
    {
        self.guard = Some(Guard::new(predicate));
        self
    }

    /// Append an action. Actions run in the order they were added.
    pub fn action<F>(mut self, action: F) -> Self
    where
        F: Fn(&EventContext<S, E>) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.actions
            .push(Arc::new(move |ctx: &EventContext<S, E>| action(ctx).map(|()| None)));
        self
    }

    /// Append an action whose value is reported on the completion
    /// notification when it is the last value produced.
    pub fn action_with_result<T, F>(mut self, action: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(&EventContext<S, E>) -> Result<T, BoxError> + Send + Sync + 'static,
    {
        self.actions.push(Arc::new(move |ctx: &EventContext<S, E>| {
            action(ctx).map(|value| Some(ActionResult::new(value)))
        }));
        self
    }

    pub fn build(self) -> Result<Transition<S, E>, BuildError> {
        let source = self.from.ok_or(BuildError::MissingSourceState)?;
        let event = self.event.ok_or(BuildError::MissingEvent)?;

        Ok(Transition {
            source,
            event,
            target: self.to,
            guard: self.guard,
            actions: self.actions,
        })
    }
}

impl<S: Identifier, E: Identifier> Default for TransitionBuilder<S, E> {
    fn default() -> Self {
        Self::new()
    }
}

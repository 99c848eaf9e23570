//! Transitions and the user-code signatures they carry.

use super::error::BoxError;
use crate::core::{EventContext, Guard, Identifier};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Action run while a transition fires. May hand back a value that is
/// reported on the completion notification.
pub type TransitionAction<S, E> =
    Arc<dyn Fn(&EventContext<S, E>) -> Result<Option<ActionResult>, BoxError> + Send + Sync>;

/// Entry or exit handler. Receives the identifier of the state being entered
/// or exited.
pub type StateHandler<S> = Arc<dyn Fn(&S) -> Result<(), BoxError> + Send + Sync>;

/// Type-erased value produced by a transition action.
#[derive(Clone)]
pub struct ActionResult(Arc<dyn Any + Send + Sync>);

impl ActionResult {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Arc::new(value))
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        let value: &(dyn Any + Send + Sync) = &*self.0;
        value.downcast_ref::<T>()
    }
}

impl fmt::Debug for ActionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ActionResult(..)")
    }
}

/// An event-triggered edge leaving `source`.
///
/// With a `target` the transition exits and enters states on the way; without
/// one it is internal and only runs its actions.
pub struct Transition<S, E> {
    pub source: S,
    pub event: E,
    pub target: Option<S>,
    pub guard: Option<Guard<S, E>>,
    pub actions: Vec<TransitionAction<S, E>>,
}

impl<S: Identifier, E: Identifier> Transition<S, E> {
    /// Check whether the guard, if any, accepts this event context.
    pub fn can_fire(&self, context: &EventContext<S, E>) -> bool {
        self.guard.as_ref().is_none_or(|g| g.check(context))
    }

    pub fn is_internal(&self) -> bool {
        self.target.is_none()
    }
}

impl<S: Clone, E: Clone> Clone for Transition<S, E> {
    fn clone(&self) -> Self {
        Self {
            source: self.source.clone(),
            event: self.event.clone(),
            target: self.target.clone(),
            guard: self.guard.clone(),
            actions: self.actions.clone(),
        }
    }
}

impl<S: fmt::Debug, E: fmt::Debug> fmt::Debug for Transition<S, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transition")
            .field("source", &self.source)
            .field("event", &self.event)
            .field("target", &self.target)
            .field("guarded", &self.guard.is_some())
            .field("actions", &self.actions.len())
            .finish()
    }
}

//! Guard predicates for controlling state transitions.
//!
//! Guards decide whether a candidate transition fires for the event being
//! dispatched. They read the event context only; candidates registered for
//! the same event are tried in declaration order.

use super::context::EventContext;
use super::state::Identifier;
use std::sync::Arc;

/// Predicate that determines if a transition can fire.
///
/// # Example
///
/// ```rust
/// use statecraft::core::{EventArgs, EventContext, Guard, MachineId};
///
/// let fast_enough = Guard::new(|ctx: &EventContext<&'static str, &'static str>| {
///     ctx.args().get::<u32>(0).is_some_and(|speed| *speed > 10)
/// });
///
/// let slow = EventContext::new(MachineId::new(), "idle", "go", EventArgs::new().with(3u32));
/// let fast = EventContext::new(MachineId::new(), "idle", "go", EventArgs::new().with(30u32));
///
/// assert!(!fast_enough.check(&slow));
/// assert!(fast_enough.check(&fast));
/// ```
pub struct Guard<S, E> {
    predicate: Arc<dyn Fn(&EventContext<S, E>) -> bool + Send + Sync>,
}

impl<S: Identifier, E: Identifier> Guard<S, E> {
    /// Create a guard from a predicate over the event context.
    ///
    /// The predicate should be free of side effects on machine state; it may
    /// be evaluated for every dispatch of its event.
    pub fn new<F>(predicate: F) -> Self
    where
        F: Fn(&EventContext<S, E>) -> bool + Send + Sync + 'static,
    {
        Guard {
            predicate: Arc::new(predicate),
        }
    }

    /// Check if the guard accepts this event.
    pub fn check(&self, context: &EventContext<S, E>) -> bool {
        (self.predicate)(context)
    }
}

impl<S, E> Clone for Guard<S, E> {
    fn clone(&self) -> Self {
        Self {
            predicate: Arc::clone(&self.predicate),
        }
    }
}

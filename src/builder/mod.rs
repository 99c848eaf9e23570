//! Builder API for ergonomic state machine construction.
//!
//! This module provides fluent builders and macros for describing a state
//! hierarchy and its transitions. Building validates the whole tree at once
//! and produces an immutable [`StateTree`](crate::engine::StateTree).

pub mod error;
pub mod machine;
pub mod macros;
pub mod transition;

pub use error::BuildError;
pub use machine::StateMachineBuilder;
pub use transition::TransitionBuilder;

use crate::core::{EventContext, Guard, Identifier};
use crate::engine::Transition;

/// Create an unguarded external transition without actions.
///
/// # Example
///
/// ```
/// use statecraft::builder::simple_transition;
///
/// let transition = simple_transition("idle", "start", "running");
/// assert_eq!(transition.target, Some("running"));
/// ```
pub fn simple_transition<S: Identifier, E: Identifier>(from: S, event: E, to: S) -> Transition<S, E> {
    Transition {
        source: from,
        event,
        target: Some(to),
        guard: None,
        actions: Vec::new(),
    }
}

/// Create an external transition that only fires when `guard` accepts.
///
/// # Example
///
/// ```
/// use statecraft::builder::guarded_transition;
/// use statecraft::core::{EventArgs, EventContext, MachineId};
///
/// let transition = guarded_transition("idle", "start", "running", |ctx| {
///     ctx.args().get::<bool>(0) == Some(&true)
/// });
///
/// let armed = EventContext::new(MachineId::new(), "idle", "start", EventArgs::new().with(true));
/// assert!(transition.can_fire(&armed));
/// ```
pub fn guarded_transition<S, E, F>(from: S, event: E, to: S, guard: F) -> Transition<S, E>
where
    S: Identifier,
    E: Identifier,
    F: Fn(&EventContext<S, E>) -> bool + Send + Sync + 'static,
{
    Transition {
        guard: Some(Guard::new(guard)),
        ..simple_transition(from, event, to)
    }
}

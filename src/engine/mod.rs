//! Hierarchical dispatch engine.
//!
//! The engine resolves an event against the active leaf and its superstates,
//! runs the exit, action and entry sequence and reports the result. It is
//! driven directly by [`crate::passive::PassiveStateMachine`] and from a worker
//! thread by [`crate::active::ActiveStateMachine`].

mod error;
mod machine;
mod transition;
mod tree;

pub use error::{BoxError, HandlerError, HandlerKind, MachineError};
pub use machine::{DispatchOutcome, StateMachine};
pub use transition::{ActionResult, StateHandler, Transition, TransitionAction};
pub use tree::StateTree;

pub(crate) use error::panic_message;
pub(crate) use tree::Edge;

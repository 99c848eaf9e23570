//! Runtime errors raised by machines and by user handlers.

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Error type user handlers return.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Which kind of user code produced a [`HandlerError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HandlerKind {
    Entry,
    Exit,
    Guard,
    Action,
}

impl fmt::Display for HandlerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Entry => "entry",
            Self::Exit => "exit",
            Self::Guard => "guard",
            Self::Action => "action",
        };
        f.write_str(name)
    }
}

/// Failure captured from user-supplied guard, action, entry or exit code.
///
/// Handlers never unwind through the dispatch loop: returned errors and
/// panics are both captured here and routed to a notification.
#[derive(Clone, Debug, Error)]
pub enum HandlerError {
    #[error("{kind} handler of state {state} failed: {source}")]
    Failed {
        kind: HandlerKind,
        state: String,
        #[source]
        source: Arc<dyn std::error::Error + Send + Sync + 'static>,
    },

    #[error("{kind} handler of state {state} panicked: {message}")]
    Panicked {
        kind: HandlerKind,
        state: String,
        message: String,
    },
}

impl HandlerError {
    pub fn kind(&self) -> HandlerKind {
        match self {
            Self::Failed { kind, .. } | Self::Panicked { kind, .. } => *kind,
        }
    }

    /// Debug rendering of the state whose handler failed.
    pub fn state(&self) -> &str {
        match self {
            Self::Failed { state, .. } | Self::Panicked { state, .. } => state,
        }
    }

    pub fn is_panic(&self) -> bool {
        matches!(self, Self::Panicked { .. })
    }
}

/// Errors surfaced to callers of machine operations.
#[derive(Clone, Debug, Error)]
pub enum MachineError {
    #[error("State machine is already initialized")]
    AlreadyInitialized,

    #[error("State machine is not initialized. Call initialize() first")]
    NotInitialized,

    #[error("State machine has been disposed")]
    Disposed,

    #[error("Unknown state {0}")]
    UnknownState(String),

    #[error("Initialization failed: {0}")]
    InitializationFailed(#[source] HandlerError),

    #[error(transparent)]
    Handler(#[from] HandlerError),

    #[error("Queued work panicked: {0}")]
    Panicked(String),

    #[error("Synchronous send from the machine's own worker thread would deadlock")]
    Reentrant,

    #[error("Worker thread terminated before completing the request")]
    WorkerTerminated,

    #[error("Failed to spawn worker thread: {0}")]
    Spawn(String),
}

/// Render a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

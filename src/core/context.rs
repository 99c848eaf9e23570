//! Per-event context handed to guards, actions and notification subscribers.

use super::state::Identifier;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Unique identity of a state machine instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MachineId(Uuid);

impl MachineId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for MachineId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MachineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Heterogeneous, cheaply cloneable event arguments.
///
/// # Example
///
/// ```rust
/// use statecraft::core::EventArgs;
///
/// let args = EventArgs::new().with(42u32).with("speed");
///
/// assert_eq!(args.get::<u32>(0), Some(&42));
/// assert_eq!(args.get::<&str>(1), Some(&"speed"));
/// assert_eq!(args.get::<u32>(1), None);
/// ```
#[derive(Clone, Default)]
pub struct EventArgs {
    values: Vec<Arc<dyn Any + Send + Sync>>,
}

impl EventArgs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an argument, builder style.
    pub fn with<T: Any + Send + Sync>(mut self, value: T) -> Self {
        self.push(value);
        self
    }

    pub fn push<T: Any + Send + Sync>(&mut self, value: T) {
        self.values.push(Arc::new(value));
    }

    /// Borrow the argument at `index` if it has type `T`.
    pub fn get<T: Any>(&self, index: usize) -> Option<&T> {
        let value: &(dyn Any + Send + Sync) = &**self.values.get(index)?;
        value.downcast_ref::<T>()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Debug for EventArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventArgs")
            .field("len", &self.values.len())
            .finish()
    }
}

/// Read-only description of one dispatched event.
///
/// Created fresh for every dispatch and shared behind an `Arc` with every
/// notification raised for it.
#[derive(Clone, Debug)]
pub struct EventContext<S, E> {
    machine: MachineId,
    source: S,
    event: E,
    args: EventArgs,
    timestamp: DateTime<Utc>,
}

impl<S: Identifier, E: Identifier> EventContext<S, E> {
    pub fn new(machine: MachineId, source: S, event: E, args: EventArgs) -> Self {
        Self {
            machine,
            source,
            event,
            args,
            timestamp: Utc::now(),
        }
    }

    /// Machine the event was sent to.
    pub fn machine(&self) -> MachineId {
        self.machine
    }

    /// Leaf state the machine was in when the context was created.
    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn event(&self) -> &E {
        &self.event
    }

    pub fn args(&self) -> &EventArgs {
        &self.args
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

//! Passive state machine: events are dispatched on the caller's thread.

use crate::core::{EventArgs, Identifier, MachineId};
use crate::engine::{DispatchOutcome, MachineError, StateMachine, StateTree};
use crate::notify::{Notification, Subscribers, SubscriptionId};
use std::sync::{mpsc, Arc};

/// State machine driven directly by its owner.
///
/// `send` runs the whole dispatch, notifications included, before returning.
///
/// # Example
///
/// ```rust
/// use statecraft::builder::{StateMachineBuilder, TransitionBuilder};
/// use statecraft::passive::PassiveStateMachine;
///
/// let tree = StateMachineBuilder::new()
///     .transition(TransitionBuilder::new().from("off").on("toggle").to("on"))?
///     .transition(TransitionBuilder::new().from("on").on("toggle").to("off"))?
///     .build()?;
///
/// let mut machine = PassiveStateMachine::new(tree);
/// machine.initialize("off")?;
/// machine.send("toggle")?;
/// assert_eq!(machine.current_state(), Some(&"on"));
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct PassiveStateMachine<S: Identifier, E: Identifier> {
    engine: StateMachine<S, E>,
    subscribers: Subscribers<S, E>,
}

impl<S: Identifier, E: Identifier> PassiveStateMachine<S, E> {
    pub fn new(tree: StateTree<S, E>) -> Self {
        let subscribers: Subscribers<S, E> = Subscribers::new();
        Self {
            engine: StateMachine::new(tree, Arc::new(subscribers.clone())),
            subscribers,
        }
    }

    pub fn id(&self) -> MachineId {
        self.engine.id()
    }

    /// Enter `initial` and return the leaf reached. Allowed once; a failed
    /// attempt may be retried.
    pub fn initialize(&mut self, initial: S) -> Result<S, MachineError> {
        self.engine.initialize(initial)
    }

    pub fn send(&mut self, event: E) -> Result<DispatchOutcome<S>, MachineError> {
        self.send_with(event, EventArgs::new())
    }

    pub fn send_with(&mut self, event: E, args: EventArgs) -> Result<DispatchOutcome<S>, MachineError> {
        self.engine.dispatch(event, args)
    }

    pub fn current_state(&self) -> Option<&S> {
        self.engine.current_state()
    }

    pub fn is_initialized(&self) -> bool {
        self.engine.is_initialized()
    }

    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&Notification<S, E>) + Send + Sync + 'static,
    {
        self.subscribers.subscribe(handler)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.subscribers.unsubscribe(id)
    }

    pub fn subscribe_channel(&self) -> mpsc::Receiver<Notification<S, E>> {
        self.subscribers.subscribe_channel()
    }
}

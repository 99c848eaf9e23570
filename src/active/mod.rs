//! Active-object state machines.
//!
//! An [`ActiveStateMachine`] owns one worker thread. Events are queued and
//! dispatched there one at a time, so callers never run transition logic
//! themselves. Notifications are handed to a [`DeliveryContext`] when one is
//! supplied, otherwise raised on the worker thread.

mod config;
mod worker;

pub use config::ActiveConfig;
pub use worker::{Priority, WorkerQueue};

use crate::core::{EventArgs, EventContext, Identifier, MachineId};
use crate::engine::{panic_message, DispatchOutcome, MachineError, StateMachine, StateTree};
use crate::notify::{DeliveryContext, Marshaled, Notification, NotificationSink, Subscribers, SubscriptionId};
use parking_lot::RwLock;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{mpsc, Arc, Weak};
use tracing::{debug, warn};

struct Inner<S: Identifier, E: Identifier> {
    id: MachineId,
    queue: WorkerQueue<StateMachine<S, E>>,
    /// Leaf state as of the last job the worker finished.
    current: Arc<RwLock<Option<S>>>,
    subscribers: Subscribers<S, E>,
}

impl<S: Identifier, E: Identifier> Inner<S, E> {
    fn post(&self, priority: Priority, event: E, args: EventArgs) -> Result<(), MachineError> {
        let source = self.current.read().clone().ok_or(MachineError::NotInitialized)?;
        let context = Arc::new(EventContext::new(self.id, source, event.clone(), args.clone()));
        let current = Arc::clone(&self.current);

        let job = move |engine: &mut StateMachine<S, E>| {
            if let Err(error) = settle(engine, &current, |engine| engine.dispatch(event, args)) {
                engine.report(Some(context), error);
            }
        };
        match priority {
            Priority::Normal => self.queue.post(job),
            Priority::High => self.queue.post_priority(job),
        }
    }

    fn send(&self, priority: Priority, event: E, args: EventArgs) -> Result<DispatchOutcome<S>, MachineError> {
        let current = Arc::clone(&self.current);
        self.queue
            .send(priority, move |engine| settle(engine, &current, |engine| engine.dispatch(event, args)))?
    }
}

/// Run `step` on the worker and refresh the `current` snapshot however it
/// ends. A panic escaping a notification sink may arrive after the engine
/// already moved to a new leaf.
fn settle<S, E, R, F>(
    engine: &mut StateMachine<S, E>,
    current: &RwLock<Option<S>>,
    step: F,
) -> Result<R, MachineError>
where
    S: Identifier,
    E: Identifier,
    F: FnOnce(&mut StateMachine<S, E>) -> Result<R, MachineError>,
{
    let result = catch_unwind(AssertUnwindSafe(|| step(engine)))
        .unwrap_or_else(|payload| Err(MachineError::Panicked(panic_message(&*payload))));
    *current.write() = engine.current_state().cloned();
    result
}

/// State machine running on its own worker thread.
///
/// Dispose explicitly with [`dispose`](Self::dispose); dropping an undisposed
/// machine disposes it too but logs a warning.
///
/// # Example
///
/// ```rust
/// use statecraft::active::ActiveStateMachine;
/// use statecraft::builder::{StateMachineBuilder, TransitionBuilder};
///
/// let tree = StateMachineBuilder::new()
///     .transition(TransitionBuilder::new().from("closed").on("open").to("opened"))?
///     .build()?;
///
/// let machine = ActiveStateMachine::new(tree)?;
/// machine.initialize("closed")?;
/// let outcome = machine.send_synchronously("open")?;
///
/// assert_eq!(outcome.state(), Some(&"opened"));
/// machine.dispose();
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct ActiveStateMachine<S: Identifier, E: Identifier> {
    inner: Arc<Inner<S, E>>,
}

impl<S: Identifier, E: Identifier> ActiveStateMachine<S, E> {
    /// Spawn with default settings, raising notifications on the worker.
    pub fn new(tree: StateTree<S, E>) -> Result<Self, MachineError> {
        Self::spawn(tree, ActiveConfig::default(), None)
    }

    /// Spawn the worker thread. With a `delivery` context every notification
    /// is scheduled there instead of running on the worker.
    pub fn spawn(
        tree: StateTree<S, E>,
        config: ActiveConfig,
        delivery: Option<Arc<dyn DeliveryContext>>,
    ) -> Result<Self, MachineError> {
        let id = MachineId::new();
        let subscribers: Subscribers<S, E> = Subscribers::new();
        let sink: Arc<dyn NotificationSink<S, E>> = match delivery {
            Some(delivery) => Arc::new(Marshaled::new(delivery, subscribers.clone())),
            None => Arc::new(subscribers.clone()),
        };
        let engine = StateMachine::with_id(id, tree, sink);
        let queue = WorkerQueue::spawn(&config.thread_name, config.stack_size, engine)?;
        debug!(machine = %id, worker = %config.thread_name, "active state machine started");

        Ok(Self {
            inner: Arc::new(Inner {
                id,
                queue,
                current: Arc::new(RwLock::new(None)),
                subscribers,
            }),
        })
    }

    pub fn id(&self) -> MachineId {
        self.inner.id
    }

    /// Run the entry sequence on the worker and wait for it. Errors raised
    /// there are returned here.
    pub fn initialize(&self, initial: S) -> Result<S, MachineError> {
        let current = Arc::clone(&self.inner.current);
        self.inner
            .queue
            .send(Priority::High, move |engine| settle(engine, &current, |engine| engine.initialize(initial)))?
    }

    /// Queue `event` at normal priority and return without waiting.
    pub fn send(&self, event: E) -> Result<(), MachineError> {
        self.inner.post(Priority::Normal, event, EventArgs::new())
    }

    pub fn send_with(&self, event: E, args: EventArgs) -> Result<(), MachineError> {
        self.inner.post(Priority::Normal, event, args)
    }

    /// Queue `event` ahead of all pending normal-priority events.
    pub fn send_priority(&self, event: E) -> Result<(), MachineError> {
        self.inner.post(Priority::High, event, EventArgs::new())
    }

    pub fn send_priority_with(&self, event: E, args: EventArgs) -> Result<(), MachineError> {
        self.inner.post(Priority::High, event, args)
    }

    /// Queue `event` and block until the worker has dispatched it and raised
    /// its notifications.
    pub fn send_synchronously(&self, event: E) -> Result<DispatchOutcome<S>, MachineError> {
        self.inner.send(Priority::Normal, event, EventArgs::new())
    }

    pub fn send_synchronously_with(&self, event: E, args: EventArgs) -> Result<DispatchOutcome<S>, MachineError> {
        self.inner.send(Priority::Normal, event, args)
    }

    /// Leaf state as of the last completed job.
    ///
    /// The snapshot is refreshed only after a job's notifications have been
    /// raised, so a subscriber handling `TransitionCompleted` still reads the
    /// previous state here; use `TransitionCompleted::state` instead.
    pub fn current_state(&self) -> Option<S> {
        self.inner.current.read().clone()
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.current.read().is_some()
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.queue.is_disposed()
    }

    /// Stop the worker after it drains accepted events. Safe to call more
    /// than once; returns `false` when already disposed.
    pub fn dispose(&self) -> bool {
        let disposed = self.inner.queue.dispose();
        if disposed {
            debug!(machine = %self.inner.id, "active state machine disposed");
        }
        disposed
    }

    /// Cloneable handle for sending from other threads or from actions.
    /// It does not keep the machine alive.
    pub fn sender(&self) -> MachineSender<S, E> {
        MachineSender {
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&Notification<S, E>) + Send + Sync + 'static,
    {
        self.inner.subscribers.subscribe(handler)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.subscribers.unsubscribe(id)
    }

    pub fn subscribe_channel(&self) -> mpsc::Receiver<Notification<S, E>> {
        self.inner.subscribers.subscribe_channel()
    }
}

impl<S: Identifier, E: Identifier> Drop for ActiveStateMachine<S, E> {
    fn drop(&mut self) {
        if !self.is_disposed() {
            warn!(machine = %self.inner.id, "active state machine dropped without dispose");
            self.dispose();
        }
    }
}

/// Weak sending handle to an [`ActiveStateMachine`].
pub struct MachineSender<S: Identifier, E: Identifier> {
    inner: Weak<Inner<S, E>>,
}

impl<S: Identifier, E: Identifier> Clone for MachineSender<S, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Weak::clone(&self.inner),
        }
    }
}

impl<S: Identifier, E: Identifier> MachineSender<S, E> {
    pub fn send(&self, event: E) -> Result<(), MachineError> {
        self.send_with(event, EventArgs::new())
    }

    pub fn send_with(&self, event: E, args: EventArgs) -> Result<(), MachineError> {
        self.upgrade()?.post(Priority::Normal, event, args)
    }

    pub fn send_priority(&self, event: E) -> Result<(), MachineError> {
        self.send_priority_with(event, EventArgs::new())
    }

    pub fn send_priority_with(&self, event: E, args: EventArgs) -> Result<(), MachineError> {
        self.upgrade()?.post(Priority::High, event, args)
    }

    fn upgrade(&self) -> Result<Arc<Inner<S, E>>, MachineError> {
        self.inner.upgrade().ok_or(MachineError::Disposed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{StateMachineBuilder, TransitionBuilder};
    use crate::notify::delivery_loop;
    use std::time::Duration;

    fn door() -> StateTree<&'static str, &'static str> {
        StateMachineBuilder::new()
            .transition(TransitionBuilder::new().from("closed").on("open").to("opened"))
            .unwrap()
            .transition(TransitionBuilder::new().from("opened").on("close").to("closed"))
            .unwrap()
            .build()
            .unwrap()
    }

    #[test]
    fn send_before_initialize_fails() {
        let machine = ActiveStateMachine::new(door()).unwrap();

        assert!(matches!(machine.send("open"), Err(MachineError::NotInitialized)));
        assert!(!machine.is_initialized());
        machine.dispose();
    }

    #[test]
    fn sender_stops_working_once_machine_is_gone() {
        let machine = ActiveStateMachine::new(door()).unwrap();
        machine.initialize("closed").unwrap();
        let sender = machine.sender();

        sender.send("open").unwrap();
        assert_eq!(
            machine.send_synchronously("close").unwrap().state(),
            Some(&"closed")
        );

        machine.dispose();
        assert!(matches!(sender.send("open"), Err(MachineError::Disposed)));
        drop(machine);
        assert!(matches!(sender.send("open"), Err(MachineError::Disposed)));
    }

    #[test]
    fn notifications_are_marshaled_to_delivery_context() {
        let (context, pump) = delivery_loop();
        let machine = ActiveStateMachine::spawn(door(), ActiveConfig::default(), Some(Arc::new(context))).unwrap();
        let receiver = machine.subscribe_channel();
        machine.initialize("closed").unwrap();

        machine.send_synchronously("open").unwrap();
        assert!(receiver.try_recv().is_err());

        assert_eq!(pump.run_pending(), 2);
        let kinds: Vec<_> = receiver.try_iter().map(|n| n.kind()).collect();
        assert_eq!(kinds, vec!["begin_dispatch", "transition_completed"]);
        machine.dispose();
        assert!(!pump.run_one(Duration::from_millis(1)));
    }

    #[test]
    fn worker_uses_configured_thread_name() {
        let names = Arc::new(RwLock::new(Vec::new()));
        let seen = Arc::clone(&names);
        let machine = ActiveStateMachine::spawn(door(), ActiveConfig::new().thread_name("door-worker"), None).unwrap();
        machine.subscribe(move |_| {
            seen.write().push(std::thread::current().name().map(str::to_string));
        });
        machine.initialize("closed").unwrap();

        machine.send_synchronously("open").unwrap();

        assert!(names
            .read()
            .iter()
            .all(|name| name.as_deref() == Some("door-worker")));
        assert_eq!(names.read().len(), 2);
        machine.dispose();
    }
}

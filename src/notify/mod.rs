//! Lifecycle notifications and their subscribers.
//!
//! Every dispatch raises `BeginDispatch` followed by exactly one of
//! `TransitionDeclined`, `TransitionCompleted` or `ExceptionThrown`.
//! Subscribers run in registration order; a panicking subscriber is logged
//! and skipped, it never reaches the dispatch loop.

mod delivery;

pub use delivery::{delivery_loop, Callback, DeliveryContext, DeliveryPump, Inline, LoopContext};

use crate::core::EventContext;
use crate::engine::{panic_message, ActionResult, HandlerError, MachineError};
use parking_lot::{Mutex, RwLock};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc, Arc};
use tracing::error;

/// Payload of a `TransitionCompleted` notification.
#[derive(Clone, Debug)]
pub struct TransitionCompleted<S, E> {
    /// Leaf state the machine is in after the transition.
    pub state: S,
    pub context: Arc<EventContext<S, E>>,
    /// Last value produced by the transition's actions.
    pub action_result: Option<ActionResult>,
    /// First error captured while exiting, acting or entering.
    pub error: Option<HandlerError>,
}

/// Payload of an `ExceptionThrown` notification.
#[derive(Clone, Debug)]
pub struct ExceptionThrown<S, E> {
    /// Context active when the failure happened, if any.
    pub context: Option<Arc<EventContext<S, E>>>,
    pub error: MachineError,
}

/// Output surface of a state machine.
#[derive(Clone, Debug)]
pub enum Notification<S, E> {
    BeginDispatch(Arc<EventContext<S, E>>),
    TransitionDeclined(Arc<EventContext<S, E>>),
    TransitionCompleted(TransitionCompleted<S, E>),
    ExceptionThrown(ExceptionThrown<S, E>),
}

impl<S, E> Notification<S, E> {
    pub fn context(&self) -> Option<&Arc<EventContext<S, E>>> {
        match self {
            Self::BeginDispatch(context) | Self::TransitionDeclined(context) => Some(context),
            Self::TransitionCompleted(completed) => Some(&completed.context),
            Self::ExceptionThrown(thrown) => thrown.context.as_ref(),
        }
    }

    /// Short name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::BeginDispatch(_) => "begin_dispatch",
            Self::TransitionDeclined(_) => "transition_declined",
            Self::TransitionCompleted(_) => "transition_completed",
            Self::ExceptionThrown(_) => "exception_thrown",
        }
    }
}

/// Destination for notifications raised by the dispatch engine.
pub trait NotificationSink<S, E>: Send + Sync {
    fn publish(&self, notification: Notification<S, E>);
}

/// Handle returned by [`Subscribers::subscribe`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Handler<S, E> = Arc<dyn Fn(&Notification<S, E>) + Send + Sync>;

/// Shared, thread-safe list of notification subscribers.
pub struct Subscribers<S, E> {
    handlers: Arc<RwLock<Vec<(SubscriptionId, Handler<S, E>)>>>,
    next_id: Arc<AtomicU64>,
}

impl<S, E> Clone for Subscribers<S, E> {
    fn clone(&self) -> Self {
        Self {
            handlers: Arc::clone(&self.handlers),
            next_id: Arc::clone(&self.next_id),
        }
    }
}

impl<S, E> Default for Subscribers<S, E> {
    fn default() -> Self {
        Self {
            handlers: Arc::new(RwLock::new(Vec::new())),
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }
}

impl<S, E> Subscribers<S, E>
where
    S: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&Notification<S, E>) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers.write().push((id, Arc::new(handler)));
        id
    }

    /// Returns `false` when `id` was not subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut handlers = self.handlers.write();
        let before = handlers.len();
        handlers.retain(|(existing, _)| *existing != id);
        handlers.len() != before
    }

    /// Subscribe a channel that receives a clone of every notification.
    pub fn subscribe_channel(&self) -> mpsc::Receiver<Notification<S, E>> {
        let (sender, receiver) = mpsc::channel();
        let sender = Mutex::new(sender);
        self.subscribe(move |notification| {
            // a dropped receiver just stops listening
            let _ = sender.lock().send(notification.clone());
        });
        receiver
    }

    pub fn len(&self) -> usize {
        self.handlers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.read().is_empty()
    }
}

impl<S, E> NotificationSink<S, E> for Subscribers<S, E>
where
    S: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    fn publish(&self, notification: Notification<S, E>) {
        // snapshot so handlers may (un)subscribe without deadlocking
        let handlers: Vec<Handler<S, E>> = self
            .handlers
            .read()
            .iter()
            .map(|(_, handler)| Arc::clone(handler))
            .collect();

        for handler in handlers {
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| handler(&notification))) {
                error!(
                    notification = notification.kind(),
                    panic = %panic_message(&*payload),
                    "notification subscriber panicked"
                );
            }
        }
    }
}

/// Sink that hands every notification to a delivery context before fanning
/// it out, so subscribers never run on the producing thread.
pub(crate) struct Marshaled<S, E> {
    delivery: Arc<dyn DeliveryContext>,
    subscribers: Subscribers<S, E>,
}

impl<S, E> Marshaled<S, E> {
    pub(crate) fn new(delivery: Arc<dyn DeliveryContext>, subscribers: Subscribers<S, E>) -> Self {
        Self {
            delivery,
            subscribers,
        }
    }
}

impl<S, E> NotificationSink<S, E> for Marshaled<S, E>
where
    S: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    fn publish(&self, notification: Notification<S, E>) {
        let subscribers = self.subscribers.clone();
        self.delivery
            .schedule(Box::new(move || subscribers.publish(notification)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{EventArgs, MachineId};
    use std::sync::atomic::AtomicUsize;

    type TestNotification = Notification<&'static str, &'static str>;

    fn begin() -> TestNotification {
        Notification::BeginDispatch(Arc::new(EventContext::new(
            MachineId::new(),
            "idle",
            "start",
            EventArgs::new(),
        )))
    }

    #[test]
    fn subscribers_receive_in_registration_order() {
        let subscribers = Subscribers::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for tag in ["first", "second"] {
            let seen = Arc::clone(&seen);
            subscribers.subscribe(move |_: &TestNotification| seen.lock().push(tag));
        }

        subscribers.publish(begin());

        assert_eq!(*seen.lock(), vec!["first", "second"]);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let subscribers = Subscribers::new();
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let id = subscribers.subscribe(move |_: &TestNotification| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        subscribers.publish(begin());
        assert!(subscribers.unsubscribe(id));
        assert!(!subscribers.unsubscribe(id));
        subscribers.publish(begin());

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(subscribers.is_empty());
    }

    #[test]
    fn panicking_subscriber_does_not_stop_others() {
        let subscribers = Subscribers::new();
        let count = Arc::new(AtomicUsize::new(0));
        subscribers.subscribe(|_: &TestNotification| panic!("subscriber bug"));
        let counter = Arc::clone(&count);
        subscribers.subscribe(move |_: &TestNotification| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        subscribers.publish(begin());

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn channel_subscription_receives_clones() {
        let subscribers: Subscribers<&'static str, &'static str> = Subscribers::new();
        let receiver = subscribers.subscribe_channel();

        subscribers.publish(begin());

        let received = receiver.try_recv().unwrap();
        assert_eq!(received.kind(), "begin_dispatch");
        assert_eq!(received.context().map(|c| *c.source()), Some("idle"));
    }

    #[test]
    fn marshaled_sink_defers_to_delivery_context() {
        let (context, pump) = delivery_loop();
        let subscribers: Subscribers<&'static str, &'static str> = Subscribers::new();
        let receiver = subscribers.subscribe_channel();
        let sink = Marshaled::new(Arc::new(context), subscribers);

        sink.publish(begin());
        assert!(receiver.try_recv().is_err());

        assert_eq!(pump.run_pending(), 1);
        assert!(receiver.try_recv().is_ok());
    }
}

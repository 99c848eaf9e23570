//! Delivery contexts: where notifications from an active machine run.

use parking_lot::Mutex;
use std::sync::{mpsc, Arc};
use std::time::Duration;
use tracing::trace;

/// Deferred notification delivery.
pub type Callback = Box<dyn FnOnce() + Send + 'static>;

/// Capability to run a callback later, asynchronously, on some designated
/// executor.
pub trait DeliveryContext: Send + Sync + 'static {
    fn schedule(&self, callback: Callback);
}

/// Runs callbacks immediately on the scheduling thread.
#[derive(Clone, Copy, Debug, Default)]
pub struct Inline;

impl DeliveryContext for Inline {
    fn schedule(&self, callback: Callback) {
        callback();
    }
}

/// Create a delivery context whose callbacks run on whichever thread pumps
/// the returned [`DeliveryPump`], typically the host's own event loop.
///
/// # Example
///
/// ```rust
/// use statecraft::notify::{delivery_loop, DeliveryContext};
/// use std::sync::atomic::{AtomicBool, Ordering};
/// use std::sync::Arc;
///
/// let (context, pump) = delivery_loop();
/// let ran = Arc::new(AtomicBool::new(false));
/// let flag = Arc::clone(&ran);
///
/// context.schedule(Box::new(move || flag.store(true, Ordering::SeqCst)));
/// assert!(!ran.load(Ordering::SeqCst));
///
/// pump.run_pending();
/// assert!(ran.load(Ordering::SeqCst));
/// ```
pub fn delivery_loop() -> (LoopContext, DeliveryPump) {
    let (sender, receiver) = mpsc::channel();
    (
        LoopContext {
            sender: Arc::new(Mutex::new(sender)),
        },
        DeliveryPump { receiver },
    )
}

/// Scheduling half of [`delivery_loop`].
#[derive(Clone)]
pub struct LoopContext {
    sender: Arc<Mutex<mpsc::Sender<Callback>>>,
}

impl DeliveryContext for LoopContext {
    fn schedule(&self, callback: Callback) {
        if self.sender.lock().send(callback).is_err() {
            trace!("delivery pump dropped; callback discarded");
        }
    }
}

/// Executing half of [`delivery_loop`]. Owned by the host thread.
pub struct DeliveryPump {
    receiver: mpsc::Receiver<Callback>,
}

impl DeliveryPump {
    /// Run every callback already queued and return how many ran.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        while let Ok(callback) = self.receiver.try_recv() {
            callback();
            ran += 1;
        }
        ran
    }

    /// Wait up to `timeout` for one callback and run it.
    pub fn run_one(&self, timeout: Duration) -> bool {
        match self.receiver.recv_timeout(timeout) {
            Ok(callback) => {
                callback();
                true
            }
            Err(_) => false,
        }
    }

    /// Run callbacks until every [`LoopContext`] has been dropped.
    pub fn run(self) {
        for callback in self.receiver {
            callback();
        }
    }
}

#[cfg(feature = "tokio")]
impl DeliveryContext for tokio::runtime::Handle {
    fn schedule(&self, callback: Callback) {
        self.spawn(async move { callback() });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn inline_runs_immediately() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);

        Inline.schedule(Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn loop_runs_callbacks_in_schedule_order() {
        let (context, pump) = delivery_loop();
        let order = Arc::new(Mutex::new(Vec::new()));
        for value in 0..3 {
            let order = Arc::clone(&order);
            context.schedule(Box::new(move || order.lock().push(value)));
        }

        assert_eq!(pump.run_pending(), 3);
        assert_eq!(*order.lock(), vec![0, 1, 2]);
        assert_eq!(pump.run_pending(), 0);
    }

    #[test]
    fn run_one_times_out_when_idle() {
        let (_context, pump) = delivery_loop();

        assert!(!pump.run_one(Duration::from_millis(10)));
    }

    #[test]
    fn run_returns_once_contexts_are_dropped() {
        let (context, pump) = delivery_loop();
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let producer = std::thread::spawn(move || {
            context.schedule(Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }));
        });

        producer.join().unwrap();
        pump.run();

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn schedule_after_pump_dropped_is_harmless() {
        let (context, pump) = delivery_loop();
        drop(pump);

        context.schedule(Box::new(|| {}));
    }

    #[cfg(feature = "tokio")]
    #[tokio::test]
    async fn tokio_handle_runs_callbacks_on_runtime() {
        let (sender, receiver) = tokio::sync::oneshot::channel();
        let handle = tokio::runtime::Handle::current();

        handle.schedule(Box::new(move || {
            let _ = sender.send(7);
        }));

        assert_eq!(receiver.await.unwrap(), 7);
    }
}

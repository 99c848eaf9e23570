//! Single worker thread draining a priority queue of jobs.
//!
//! The worker owns its context exclusively; jobs receive `&mut C` one at a
//! time, so nothing inside the context needs locking. Only the pending queue
//! and the disposed flag are shared with callers.

use crate::collections::PriorityQueue;
use crate::engine::{panic_message, MachineError};
use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle, ThreadId};
use tracing::{debug, error};

/// Scheduling class of a queued job. Every `High` job runs before any
/// pending `Normal` job; jobs of one class run in the order they were posted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    #[default]
    Normal,
    High,
}

type Work<C> = Box<dyn FnOnce(&mut C) + Send + 'static>;

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Ticket {
    priority: Priority,
    order: Reverse<u64>,
}

struct Job<C> {
    ticket: Ticket,
    work: Work<C>,
}

struct Pending<C> {
    jobs: PriorityQueue<Job<C>>,
    posted: u64,
    closed: bool,
}

struct Shared<C> {
    pending: Mutex<Pending<C>>,
    available: Condvar,
    disposed: AtomicBool,
}

/// Handle to a worker thread that owns a context of type `C`.
pub struct WorkerQueue<C> {
    shared: Arc<Shared<C>>,
    thread: Mutex<Option<JoinHandle<()>>>,
    worker: ThreadId,
    name: String,
}

impl<C: Send + 'static> WorkerQueue<C> {
    /// Start a worker thread that takes ownership of `context`.
    pub fn spawn(name: &str, stack_size: Option<usize>, context: C) -> Result<Self, MachineError> {
        let shared = Arc::new(Shared {
            pending: Mutex::new(Pending {
                jobs: PriorityQueue::with_comparator(|a: &Job<C>, b: &Job<C>| a.ticket.cmp(&b.ticket)),
                posted: 0,
                closed: false,
            }),
            available: Condvar::new(),
            disposed: AtomicBool::new(false),
        });

        let mut builder = thread::Builder::new().name(name.to_string());
        if let Some(size) = stack_size {
            builder = builder.stack_size(size);
        }
        let worker_shared = Arc::clone(&shared);
        let handle = builder
            .spawn(move || run(worker_shared, context))
            .map_err(|e| MachineError::Spawn(e.to_string()))?;

        debug!(worker = name, "worker thread started");
        Ok(Self {
            worker: handle.thread().id(),
            thread: Mutex::new(Some(handle)),
            shared,
            name: name.to_string(),
        })
    }

    /// Queue `work` at normal priority without waiting for it.
    pub fn post<F>(&self, work: F) -> Result<(), MachineError>
    where
        F: FnOnce(&mut C) + Send + 'static,
    {
        self.enqueue(Priority::Normal, Box::new(work))
    }

    /// Queue `work` ahead of every pending normal-priority job.
    pub fn post_priority<F>(&self, work: F) -> Result<(), MachineError>
    where
        F: FnOnce(&mut C) + Send + 'static,
    {
        self.enqueue(Priority::High, Box::new(work))
    }

    /// Queue `work` at `priority` and block until the worker has run it.
    ///
    /// Fails with [`MachineError::Reentrant`] on the worker thread itself,
    /// where waiting would deadlock.
    pub fn send<F, R>(&self, priority: Priority, work: F) -> Result<R, MachineError>
    where
        F: FnOnce(&mut C) -> R + Send + 'static,
        R: Send + 'static,
    {
        if self.is_worker_thread() {
            return Err(MachineError::Reentrant);
        }
        let (reply, response) = mpsc::sync_channel(1);
        self.enqueue(
            priority,
            Box::new(move |context: &mut C| {
                let result = catch_unwind(AssertUnwindSafe(|| work(context)))
                    .map_err(|payload| MachineError::Panicked(panic_message(&*payload)));
                // the caller is blocked on the other end
                let _ = reply.send(result);
            }),
        )?;
        response.recv().map_err(|_| MachineError::WorkerTerminated)?
    }

    fn enqueue(&self, priority: Priority, work: Work<C>) -> Result<(), MachineError> {
        if self.is_disposed() {
            return Err(MachineError::Disposed);
        }
        let mut pending = self.shared.pending.lock();
        if pending.closed {
            return Err(MachineError::Disposed);
        }
        let ticket = Ticket {
            priority,
            order: Reverse(pending.posted),
        };
        pending.posted += 1;
        pending.jobs.enqueue(Job { ticket, work });
        drop(pending);
        self.shared.available.notify_one();
        Ok(())
    }
}

impl<C> WorkerQueue<C> {
    pub fn is_disposed(&self) -> bool {
        self.shared.disposed.load(Ordering::Acquire)
    }

    pub fn is_worker_thread(&self) -> bool {
        thread::current().id() == self.worker
    }

    /// Number of jobs accepted but not yet started.
    pub fn pending(&self) -> usize {
        self.shared.pending.lock().jobs.len()
    }

    /// Stop accepting work, let the worker drain what was already accepted
    /// and wait for it to exit. Returns `false` if already disposed.
    ///
    /// Called from the worker thread itself, the thread is detached instead
    /// of joined.
    pub fn dispose(&self) -> bool {
        if self.shared.disposed.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.shared.pending.lock().closed = true;
        self.shared.available.notify_all();

        let handle = self.thread.lock().take();
        match handle {
            Some(handle) if !self.is_worker_thread() => {
                if handle.join().is_err() {
                    error!(worker = %self.name, "worker thread panicked");
                }
            }
            _ => {}
        }
        debug!(worker = %self.name, "worker disposed");
        true
    }
}

impl<C> Drop for WorkerQueue<C> {
    fn drop(&mut self) {
        self.dispose();
    }
}

fn run<C>(shared: Arc<Shared<C>>, mut context: C) {
    loop {
        let job = {
            let mut pending = shared.pending.lock();
            loop {
                match pending.jobs.dequeue() {
                    Ok(job) => break job,
                    Err(_) if pending.closed => {
                        debug!("worker queue drained; stopping");
                        return;
                    }
                    Err(_) => shared.available.wait(&mut pending),
                }
            }
        };
        if let Err(payload) = catch_unwind(AssertUnwindSafe(|| (job.work)(&mut context))) {
            error!(panic = %panic_message(&*payload), "queued job panicked");
        }
    }
}

//! Collections used by the active-object runtime.
//!
//! The skip-list [`PriorityQueue`] orders pending work on an active machine's
//! worker thread, and is usable on its own as a general max-first queue.

mod priority_queue;

pub use priority_queue::{Cursor, Iter, PriorityQueue, QueueError, MAX_LEVEL};

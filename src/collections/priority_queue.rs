//! Max-first priority queue backed by a probabilistic skip list.
//!
//! Nodes live in an index arena; forward links are slot indices, with `None`
//! standing for the end of a level. The header is kept outside the arena.
//! Traversal from the header at any level visits elements in descending
//! comparator order, so the head of level 0 is always the greatest element.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::cmp::Ordering;
use std::fmt;
use std::iter::FusedIterator;
use std::sync::Arc;
use thiserror::Error;

/// Maximum number of levels a node can participate in.
pub const MAX_LEVEL: usize = 16;

/// Probability of promoting a new node one more level.
const PROMOTION: f64 = 0.5;

/// Errors reported by [`PriorityQueue`] and its [`Cursor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("priority queue is empty")]
    Empty,

    #[error("priority queue was modified after the enumeration started")]
    Invalidated,
}

type Comparator<T> = Arc<dyn Fn(&T, &T) -> Ordering + Send + Sync>;

struct Node<T> {
    element: T,
    forward: Vec<Option<usize>>,
}

/// Ordered multiset that always yields its greatest element first.
///
/// Ordering defaults to `Ord` and can be replaced with any comparator at
/// construction. Elements comparing equal dequeue in insertion order.
///
/// # Example
///
/// ```rust
/// use statecraft::collections::PriorityQueue;
///
/// let mut queue = PriorityQueue::new();
/// queue.enqueue(3);
/// queue.enqueue(7);
/// queue.enqueue(5);
///
/// assert_eq!(queue.peek(), Ok(&7));
/// assert_eq!(queue.dequeue(), Ok(7));
/// assert_eq!(queue.iter().copied().collect::<Vec<_>>(), vec![5, 3]);
/// ```
pub struct PriorityQueue<T> {
    slots: Vec<Option<Node<T>>>,
    vacant: Vec<usize>,
    header: [Option<usize>; MAX_LEVEL],
    level: usize,
    count: usize,
    version: u64,
    comparator: Comparator<T>,
    rng: StdRng,
}

impl<T: Ord + 'static> PriorityQueue<T> {
    /// Create an empty queue ordered by `T`'s natural ordering.
    pub fn new() -> Self {
        Self::with_comparator(|a: &T, b: &T| a.cmp(b))
    }

    /// Create an empty queue whose level generator is seeded, giving a
    /// reproducible node layout.
    pub fn with_seed(seed: u64) -> Self {
        Self::build(
            Arc::new(|a: &T, b: &T| a.cmp(b)),
            StdRng::seed_from_u64(seed),
        )
    }
}

impl<T: Ord + 'static> Default for PriorityQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> PriorityQueue<T> {
    /// Create an empty queue ordered by `comparator`. The element for which
    /// the comparator reports `Greater` against all others is dequeued first.
    pub fn with_comparator<F>(comparator: F) -> Self
    where
        F: Fn(&T, &T) -> Ordering + Send + Sync + 'static,
    {
        Self::build(Arc::new(comparator), StdRng::from_entropy())
    }

    fn build(comparator: Comparator<T>, rng: StdRng) -> Self {
        Self {
            slots: Vec::new(),
            vacant: Vec::new(),
            header: [None; MAX_LEVEL],
            level: 0,
            count: 0,
            version: 0,
            comparator,
            rng,
        }
    }

    /// Number of elements in the queue.
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Insert an element. Expected `O(log n)`.
    pub fn enqueue(&mut self, element: T) {
        let update = self.predecessors(&element, true);
        let level = self.random_level();
        if level > self.level {
            // update[] already points at the header for the new levels
            self.level = level;
        }

        let forward = (0..level).map(|l| self.next(update[l], l)).collect();
        let index = self.allocate(Node { element, forward });
        for (l, predecessor) in update.iter().enumerate().take(level) {
            self.link(*predecessor, l, Some(index));
        }

        self.count += 1;
        self.version = self.version.wrapping_add(1);
        self.assert_invariants();
    }

    /// Remove and return the greatest element.
    pub fn dequeue(&mut self) -> Result<T, QueueError> {
        let head = self.header[0].ok_or(QueueError::Empty)?;
        // the head of level 0 is the head of every level it belongs to
        Ok(self.unlink(head, &[None; MAX_LEVEL]))
    }

    /// Borrow the greatest element without removing it.
    pub fn peek(&self) -> Result<&T, QueueError> {
        self.header[0]
            .map(|head| &self.node(head).element)
            .ok_or(QueueError::Empty)
    }

    /// Remove one element comparing equal to `element`.
    ///
    /// Returns `false` and leaves the queue untouched when no such element
    /// exists.
    pub fn remove(&mut self, element: &T) -> bool {
        let update = self.predecessors(element, false);
        match self.next(update[0], 0) {
            Some(candidate)
                if (self.comparator)(&self.node(candidate).element, element)
                    == Ordering::Equal =>
            {
                self.unlink(candidate, &update);
                true
            }
            _ => false,
        }
    }

    /// Whether an element comparing equal to `element` is queued.
    pub fn contains(&self, element: &T) -> bool {
        let update = self.predecessors(element, false);
        self.next(update[0], 0).is_some_and(|candidate| {
            (self.comparator)(&self.node(candidate).element, element) == Ordering::Equal
        })
    }

    /// Drop every element.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.vacant.clear();
        self.header = [None; MAX_LEVEL];
        self.level = 0;
        self.count = 0;
        self.version = self.version.wrapping_add(1);
    }

    /// Iterate in descending order. The borrow keeps the queue frozen for
    /// the iterator's lifetime.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            queue: self,
            next: self.header[0],
            remaining: self.count,
        }
    }

    /// Open a detached cursor positioned before the greatest element.
    ///
    /// Unlike [`iter`](Self::iter), a cursor does not borrow the queue, so
    /// the queue may be mutated while it is open; any mutation invalidates
    /// the cursor until it is [`reset`](Cursor::reset).
    pub fn cursor(&self) -> Cursor {
        Cursor {
            version: self.version,
            next: self.header[0],
        }
    }

    /// Copy the elements out in descending order.
    pub fn to_vec(&self) -> Vec<T>
    where
        T: Clone,
    {
        self.iter().cloned().collect()
    }

    fn random_level(&mut self) -> usize {
        let mut level = 1;
        while level < MAX_LEVEL && level <= self.level && self.rng.gen_bool(PROMOTION) {
            level += 1;
        }
        level
    }

    /// For every active level, the last node that sorts before `element`.
    /// With `inclusive`, nodes equal to `element` count as sorting before it,
    /// which places new elements behind their equals.
    fn predecessors(&self, element: &T, inclusive: bool) -> [Option<usize>; MAX_LEVEL] {
        let mut update = [None; MAX_LEVEL];
        let mut cursor = None;
        for level in (0..self.level).rev() {
            while let Some(next) = self.next(cursor, level) {
                match (self.comparator)(&self.node(next).element, element) {
                    Ordering::Greater => cursor = Some(next),
                    Ordering::Equal if inclusive => cursor = Some(next),
                    _ => break,
                }
            }
            update[level] = cursor;
        }
        update
    }

    fn unlink(&mut self, index: usize, update: &[Option<usize>; MAX_LEVEL]) -> T {
        let node = match self.slots[index].take() {
            Some(node) => node,
            None => unreachable!("skip list link points at vacant slot {index}"),
        };
        self.vacant.push(index);

        for (level, successor) in node.forward.iter().enumerate() {
            if self.next(update[level], level) == Some(index) {
                self.link(update[level], level, *successor);
            }
        }
        while self.level > 0 && self.header[self.level - 1].is_none() {
            self.level -= 1;
        }

        self.count -= 1;
        self.version = self.version.wrapping_add(1);
        self.assert_invariants();
        node.element
    }

    fn allocate(&mut self, node: Node<T>) -> usize {
        match self.vacant.pop() {
            Some(index) => {
                self.slots[index] = Some(node);
                index
            }
            None => {
                self.slots.push(Some(node));
                self.slots.len() - 1
            }
        }
    }

    fn node(&self, index: usize) -> &Node<T> {
        match &self.slots[index] {
            Some(node) => node,
            None => unreachable!("skip list link points at vacant slot {index}"),
        }
    }

    fn next(&self, from: Option<usize>, level: usize) -> Option<usize> {
        match from {
            None => self.header[level],
            Some(index) => self.node(index).forward[level],
        }
    }

    fn link(&mut self, from: Option<usize>, level: usize, to: Option<usize>) {
        match from {
            None => self.header[level] = to,
            Some(index) => match &mut self.slots[index] {
                Some(node) => node.forward[level] = to,
                None => unreachable!("skip list link points at vacant slot {index}"),
            },
        }
    }

    /// O(n) structural check, compiled to nothing in release builds.
    fn assert_invariants(&self) {
        if !cfg!(debug_assertions) {
            return;
        }

        let mut reachable = 0;
        let mut cursor = self.header[0];
        while let Some(index) = cursor {
            reachable += 1;
            cursor = self.node(index).forward[0];
        }
        assert_eq!(reachable, self.count, "level 0 must reach every node");

        for level in 0..self.level {
            let mut cursor = self.header[level];
            while let Some(index) = cursor {
                let node = self.node(index);
                if let Some(next) = node.forward[level] {
                    assert_ne!(
                        (self.comparator)(&node.element, &self.node(next).element),
                        Ordering::Less,
                        "level {level} out of order",
                    );
                }
                cursor = node.forward[level];
            }
        }

        assert!(
            self.level == 0 || self.header[self.level - 1].is_some(),
            "current level must be occupied",
        );
        assert!(
            self.header[self.level..].iter().all(Option::is_none),
            "no node may sit above the current level",
        );
    }
}

impl<T: fmt::Debug> fmt::Debug for PriorityQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl<T: Ord + 'static> FromIterator<T> for PriorityQueue<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut queue = Self::new();
        queue.extend(iter);
        queue
    }
}

impl<T> Extend<T> for PriorityQueue<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for element in iter {
            self.enqueue(element);
        }
    }
}

impl<'a, T> IntoIterator for &'a PriorityQueue<T> {
    type Item = &'a T;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Borrowing iterator over a [`PriorityQueue`], greatest element first.
pub struct Iter<'a, T> {
    queue: &'a PriorityQueue<T>,
    next: Option<usize>,
    remaining: usize,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.queue.node(self.next?);
        self.next = node.forward[0];
        self.remaining -= 1;
        Some(&node.element)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<T> ExactSizeIterator for Iter<'_, T> {}

impl<T> FusedIterator for Iter<'_, T> {}

/// Detached, restartable enumeration over a [`PriorityQueue`].
///
/// The cursor remembers the queue version it was opened against; stepping
/// it after the queue changed fails with [`QueueError::Invalidated`]. A
/// cursor must only be used with the queue that created it.
#[derive(Debug, Clone)]
pub struct Cursor {
    version: u64,
    next: Option<usize>,
}

impl Cursor {
    /// Advance and borrow the next element, or `Ok(None)` past the end.
    pub fn next<'q, T>(&mut self, queue: &'q PriorityQueue<T>) -> Result<Option<&'q T>, QueueError> {
        if self.version != queue.version {
            return Err(QueueError::Invalidated);
        }
        let Some(index) = self.next else {
            return Ok(None);
        };
        let node = queue.node(index);
        self.next = node.forward[0];
        Ok(Some(&node.element))
    }

    /// Rewind to the greatest element, revalidating against the queue's
    /// current contents.
    pub fn reset<T>(&mut self, queue: &PriorityQueue<T>) {
        self.version = queue.version;
        self.next = queue.header[0];
    }
}

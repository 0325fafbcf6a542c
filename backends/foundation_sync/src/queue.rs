//! Bounded priority queue with per-node locking.
//!
//! Entries form a singly linked list sorted by descending priority, headed by
//! a sentinel that carries no data. Nodes live in a fixed arena of
//! `capacity + 1` slots and link to each other by slot index. Every slot has
//! its own lock.
//!
//! Traversals are hand-over-hand: the next node is locked before the current
//! one is released, always walking from the sentinel towards the tail. Since
//! every traversal takes locks in that same order, readers and writers can
//! not deadlock each other.
//!
//! Mutators (`add`, `get_first`) additionally serialize on one mutator lock
//! that owns the size, the free slot list and the not-full/not-empty
//! condition variables. Readers (`search`, `snapshot`) never take it.

use core::fmt;
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::Duration;

use crate::cancel::{self, CancellationToken, DEFAULT_POLL_INTERVAL};
use crate::errors::{SyncError, SyncResult};

const SENTINEL: usize = 0;

/// A key and its priority, as stored in the queue.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueueEntry {
    pub key: String,
    pub priority: i64,
}

struct Slot {
    key: String,
    priority: i64,
    next: Option<usize>,
}

impl Slot {
    fn vacant() -> Self {
        Self {
            key: String::new(),
            priority: i64::MAX,
            next: None,
        }
    }
}

struct Mutators {
    size: usize,
    free: Vec<usize>,
}

/// A blocking, bounded, descending priority queue with unique keys.
///
/// ```
/// use foundation_sync::queue::ConcurrentPriorityQueue;
/// use foundation_sync::CancellationToken;
///
/// let never = CancellationToken::never();
/// let queue = ConcurrentPriorityQueue::new(5);
///
/// assert_eq!(queue.add("x", 10, &never), Ok(Some(0)));
/// assert_eq!(queue.add("y", 20, &never), Ok(Some(0)));
/// assert_eq!(queue.search("x"), Some(1));
/// assert_eq!(queue.add("x", 5, &never), Ok(None));
/// assert_eq!(queue.get_first(&never).as_deref(), Ok("y"));
/// ```
pub struct ConcurrentPriorityQueue {
    capacity: usize,
    slots: Box<[Mutex<Slot>]>,
    mutators: Mutex<Mutators>,
    not_full: Condvar,
    not_empty: Condvar,
    poll: Duration,
}

impl ConcurrentPriorityQueue {
    /// Creates an empty queue holding at most `capacity` entries.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is 0.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "queue capacity must be > 0");

        let slots: Vec<Mutex<Slot>> = (0..=capacity).map(|_| Mutex::new(Slot::vacant())).collect();
        Self {
            capacity,
            slots: slots.into_boxed_slice(),
            mutators: Mutex::new(Mutators {
                size: 0,
                free: (1..=capacity).rev().collect(),
            }),
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
            poll: DEFAULT_POLL_INTERVAL,
        }
    }

    /// # Errors
    ///
    /// Returns [`SyncError::InvalidCapacity`] if `capacity` is 0.
    pub fn try_new(capacity: usize) -> SyncResult<Self> {
        if capacity == 0 {
            return Err(SyncError::InvalidCapacity(capacity));
        }
        Ok(Self::new(capacity))
    }

    /// Sets how long a cancellable waiter sleeps between token checks.
    #[must_use]
    pub fn with_poll_interval(mut self, poll: Duration) -> Self {
        self.poll = poll;
        self
    }

    #[inline]
    fn slot(&self, index: usize) -> MutexGuard<'_, Slot> {
        cancel::lock(&self.slots[index])
    }

    /// Inserts `key` with `priority`, blocking while the queue is full.
    ///
    /// Returns the 0-based position the entry was inserted at, or `None` if
    /// `key` is already queued. An entry goes in front of existing entries
    /// with the same priority.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Cancelled`] if `cancel` fires while waiting for
    /// space. Nothing is inserted in that case.
    pub fn add(
        &self,
        key: impl Into<String>,
        priority: i64,
        cancel: &CancellationToken,
    ) -> SyncResult<Option<usize>> {
        let key = key.into();
        let mut mutators = cancel::lock(&self.mutators);

        let fresh = loop {
            // redone after every wait, another caller may have queued the key meanwhile
            if self.search(&key).is_some() {
                if !mutators.free.is_empty() {
                    // hand a not-full wakeup we may have consumed to the next adder
                    drop(mutators);
                    self.not_full.notify_one();
                }
                return Ok(None);
            }
            if let Some(fresh) = mutators.free.pop() {
                break fresh;
            }
            cancel.checkpoint()?;
            mutators = cancel::park(&self.not_full, mutators, cancel, self.poll);
        };

        let mut position = 0;
        let mut current = self.slot(SENTINEL);
        while let Some(next) = current.next {
            let next_guard = self.slot(next);
            if next_guard.priority <= priority {
                break;
            }
            current = next_guard;
            position += 1;
        }

        {
            let mut node = self.slot(fresh);
            node.key.clone_from(&key);
            node.priority = priority;
            node.next = current.next;
        }
        current.next = Some(fresh);
        drop(current);

        mutators.size += 1;
        let size = mutators.size;
        drop(mutators);

        self.not_empty.notify_one();
        tracing::trace!(key = key.as_str(), priority, position, size, "queue insert");
        Ok(Some(position))
    }

    /// Returns the position of `key`, or `None` if it is not queued.
    #[must_use]
    pub fn search(&self, key: &str) -> Option<usize> {
        let mut current = self.slot(SENTINEL);
        let mut position = 0;
        loop {
            let next = current.next?;
            let next_guard = self.slot(next);
            if next_guard.key == key {
                return Some(position);
            }
            current = next_guard;
            position += 1;
        }
    }

    /// Removes and returns the highest priority key, blocking while the
    /// queue is empty.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Cancelled`] if `cancel` fires while waiting for an
    /// entry.
    pub fn get_first(&self, cancel: &CancellationToken) -> SyncResult<String> {
        self.take_first(cancel).map(|entry| entry.key)
    }

    /// Like [`ConcurrentPriorityQueue::get_first`] but returns the priority
    /// along with the key.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Cancelled`] if `cancel` fires while waiting for an
    /// entry.
    pub fn take_first(&self, cancel: &CancellationToken) -> SyncResult<QueueEntry> {
        let mut mutators = cancel::lock(&self.mutators);
        loop {
            if let Some(entry) = self.unlink_head(&mut mutators) {
                drop(mutators);
                self.not_full.notify_one();
                return Ok(entry);
            }
            cancel.checkpoint()?;
            mutators = cancel::park(&self.not_empty, mutators, cancel, self.poll);
        }
    }

    /// Removes the highest priority key if the queue is not empty.
    #[must_use]
    pub fn try_get_first(&self) -> Option<String> {
        let mut mutators = cancel::lock(&self.mutators);
        let entry = self.unlink_head(&mut mutators)?;
        drop(mutators);

        self.not_full.notify_one();
        Some(entry.key)
    }

    /// Unlinks the first node while holding the sentinel, the first and the
    /// second node.
    fn unlink_head(&self, mutators: &mut Mutators) -> Option<QueueEntry> {
        let mut head = self.slot(SENTINEL);
        let first = head.next?;

        let mut first_guard = self.slot(first);
        let second_guard = first_guard.next.map(|second| self.slot(second));

        head.next = first_guard.next.take();
        let entry = QueueEntry {
            key: std::mem::take(&mut first_guard.key),
            priority: first_guard.priority,
        };

        drop(second_guard);
        drop(head);
        drop(first_guard);

        mutators.free.push(first);
        mutators.size -= 1;
        tracing::trace!(key = entry.key.as_str(), size = mutators.size, "queue remove");
        Some(entry)
    }

    /// Copies the queued entries in order.
    ///
    /// The sentinel stays locked for the whole walk so no entry can be
    /// removed underneath it. Each node is locked only while it is read.
    #[must_use]
    pub fn snapshot(&self) -> Vec<QueueEntry> {
        let head = self.slot(SENTINEL);
        let mut entries = Vec::new();
        let mut cursor = head.next;
        while let Some(index) = cursor {
            let node = self.slot(index);
            entries.push(QueueEntry {
                key: node.key.clone(),
                priority: node.priority,
            });
            cursor = node.next;
        }
        drop(head);
        entries
    }

    /// Renders the queue as `key priority -> ... -> null`.
    #[must_use]
    pub fn render(&self) -> String {
        let mut rendered = String::new();
        for entry in self.snapshot() {
            rendered.push_str(&entry.key);
            rendered.push(' ');
            rendered.push_str(&entry.priority.to_string());
            rendered.push_str(" -> ");
        }
        rendered.push_str("null");
        rendered
    }

    /// Emits the rendered queue through `tracing`.
    pub fn print_list(&self) {
        tracing::info!(queue = %self.render(), "priority queue contents");
    }

    #[must_use]
    pub fn len(&self) -> usize {
        cancel::lock(&self.mutators).size
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl fmt::Display for ConcurrentPriorityQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

impl fmt::Debug for ConcurrentPriorityQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConcurrentPriorityQueue")
            .field("capacity", &self.capacity)
            .field("entries", &self.snapshot())
            .finish_non_exhaustive()
    }
}

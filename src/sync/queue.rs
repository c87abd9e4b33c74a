//! Fixed-capacity blocking FIFO shared between one producer thread and one consumer.
//!
//! Besides blocking `push`/`pop`, the queue supports two ways of waking blocked
//! threads:
//! - `flush()` empties the queue and wakes everybody. Pushers then find room,
//!   poppers go back to waiting unless something is pushed afterwards.
//! - `close()` makes every current and future `push` fail and lets `pop`
//!   return `None` once the queue is drained. `reopen()` undoes it.

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;

struct Inner<T> {
    items: VecDeque<T>,
    closed: bool,
}

pub struct BoundedQueue<T> {
    inner: Mutex<Inner<T>>,
    capacity: usize,
    /// Signalled when an item is pushed or the queue is closed
    item_available: Condvar,
    /// Signalled when an item is popped, the queue is flushed or closed
    space_available: Condvar,
}

impl<T> BoundedQueue<T> {
    /// Create a queue holding at most `capacity` items (at least one)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(Inner {
                items: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            capacity,
            item_available: Condvar::new(),
            space_available: Condvar::new(),
        }
    }

    /// Insert an item, blocking while the queue is full.
    ///
    /// Returns false (and drops the item) if the queue is closed.
    pub fn push(&self, item: T) -> bool {
        let mut inner = self.inner.lock();
        while inner.items.len() >= self.capacity && !inner.closed {
            self.space_available.wait(&mut inner);
        }
        if inner.closed {
            return false;
        }
        inner.items.push_back(item);
        self.item_available.notify_one();
        true
    }

    /// Remove the oldest item, blocking while the queue is empty.
    ///
    /// Returns `None` only when the queue is closed and fully drained.
    pub fn pop(&self) -> Option<T> {
        let mut inner = self.inner.lock();
        loop {
            if let Some(item) = inner.items.pop_front() {
                self.space_available.notify_one();
                return Some(item);
            }
            if inner.closed {
                return None;
            }
            self.item_available.wait(&mut inner);
        }
    }

    /// Remove the oldest item without blocking
    pub fn try_pop(&self) -> Option<T> {
        let mut inner = self.inner.lock();
        let item = inner.items.pop_front();
        if item.is_some() {
            self.space_available.notify_one();
        }
        item
    }

    /// Remove all items and wake every blocked pusher and popper
    pub fn flush(&self) {
        let mut inner = self.inner.lock();
        inner.items.clear();
        self.space_available.notify_all();
        self.item_available.notify_all();
    }

    /// Reject all further pushes and wake every blocked thread
    pub fn close(&self) {
        let mut inner = self.inner.lock();
        inner.closed = true;
        self.space_available.notify_all();
        self.item_available.notify_all();
    }

    /// Accept pushes again after `close`
    pub fn reopen(&self) {
        self.inner.lock().closed = false;
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

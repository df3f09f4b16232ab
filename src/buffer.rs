//! Bounded FIFO buffer shared by producers and the worker.

use std::collections::VecDeque;
use std::pin::pin;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;

use crate::QueueError;

#[derive(Debug)]
struct State<T> {
    items: VecDeque<T>,
    closed: bool,
    /// Consumers currently parked in [`BoundedBuffer::pop`].
    waiting_takers: usize,
}

impl<T> State<T> {
    /// A zero-capacity buffer admits one item per parked taker.
    fn has_room(&self, capacity: usize) -> bool {
        self.items.len() < capacity.max(self.waiting_takers)
    }
}

/// Thread-safe bounded FIFO with an explicit closed flag.
///
/// Producers suspend in [`push`](Self::push) while the buffer is full and
/// consumers suspend in [`pop`](Self::pop) while it is empty. Closing wakes
/// both sides: waiting producers fail with [`QueueError::Closed`], and
/// consumers keep receiving buffered items until the buffer is drained,
/// after which `pop` returns `None`.
///
/// The lock is never held across an `.await`, so a plain `std` mutex is
/// used and the non-blocking operations stay synchronous.
#[derive(Debug)]
pub(crate) struct BoundedBuffer<T> {
    state: Mutex<State<T>>,
    capacity: usize,
    not_full: Notify,
    not_empty: Notify,
}

impl<T> BoundedBuffer<T> {
    /// Create an open, empty buffer holding at most `capacity` items.
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(State {
                items: VecDeque::with_capacity(capacity),
                closed: false,
                waiting_takers: 0,
            }),
            capacity,
            not_full: Notify::new(),
            not_empty: Notify::new(),
        }
    }

    // No caller code runs under the lock, so a poisoned state is still
    // consistent.
    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Insert without waiting.
    ///
    /// Closure is reported before fullness.
    pub(crate) fn try_push(&self, item: T) -> Result<(), QueueError> {
        {
            let mut state = self.lock();
            if state.closed {
                return Err(QueueError::Closed);
            }
            if !state.has_room(self.capacity) {
                return Err(QueueError::Full);
            }
            state.items.push_back(item);
        }
        self.not_empty.notify_one();
        Ok(())
    }

    /// Insert, suspending while the buffer is full.
    ///
    /// Fails with [`QueueError::Closed`] if the buffer is closed before the
    /// item could be inserted, including while suspended.
    pub(crate) async fn push(&self, item: T) -> Result<(), QueueError> {
        loop {
            // Register interest before inspecting state so a wakeup between
            // the check and the await is not lost.
            let mut notified = pin!(self.not_full.notified());
            notified.as_mut().enable();

            {
                let mut state = self.lock();
                if state.closed {
                    return Err(QueueError::Closed);
                }
                if state.has_room(self.capacity) {
                    state.items.push_back(item);
                    drop(state);
                    self.not_empty.notify_one();
                    return Ok(());
                }
            }

            notified.await;
        }
    }

    /// Remove the oldest item, suspending while the buffer is empty and open.
    ///
    /// Returns `None` once the buffer is closed and drained.
    pub(crate) async fn pop(&self) -> Option<T> {
        loop {
            let mut notified = pin!(self.not_empty.notified());
            notified.as_mut().enable();

            {
                let mut state = self.lock();
                if let Some(item) = state.items.pop_front() {
                    drop(state);
                    self.not_full.notify_one();
                    return Some(item);
                }
                if state.closed {
                    return None;
                }
                state.waiting_takers += 1;
            }

            let _parked = ParkedTaker(self);
            if self.capacity == 0 {
                self.not_full.notify_one();
            }
            notified.await;
        }
    }

    /// Close the buffer. Returns `false` if it was already closed.
    pub(crate) fn close(&self) -> bool {
        {
            let mut state = self.lock();
            if state.closed {
                return false;
            }
            state.closed = true;
        }
        self.not_full.notify_waiters();
        self.not_empty.notify_waiters();
        true
    }
}

/// Keeps `waiting_takers` accurate even if a parked `pop` is dropped.
struct ParkedTaker<'a, T>(&'a BoundedBuffer<T>);

impl<T> Drop for ParkedTaker<'_, T> {
    fn drop(&mut self) {
        self.0.lock().waiting_takers -= 1;
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

//! Bounded per-subscriber queue with drop-oldest overflow.

use parking_lot::Mutex;
use std::collections::VecDeque;

struct QueueState<T> {
    items: VecDeque<T>,
    /// An item has been popped and its handler has not finished.
    busy: bool,
}

/// Bounded FIFO shared between publishers and one consumer.
///
/// `pop` marks the queue busy until `finish` is called, so an observer can
/// tell "empty and idle" apart from "empty while the last item is still
/// being handled".
pub struct SubscriberQueue<T> {
    capacity: usize,
    state: Mutex<QueueState<T>>,
}

impl<T> SubscriberQueue<T> {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            state: Mutex::new(QueueState {
                items: VecDeque::new(),
                busy: false,
            }),
        }
    }

    /// Enqueue, returning the displaced oldest item when full.
    pub fn push(&self, item: T) -> Option<T> {
        let mut state = self.state.lock();
        let displaced = if state.items.len() >= self.capacity {
            state.items.pop_front()
        } else {
            None
        };
        state.items.push_back(item);
        displaced
    }

    pub fn pop(&self) -> Option<T> {
        let mut state = self.state.lock();
        let item = state.items.pop_front();
        state.busy = item.is_some();
        item
    }

    /// Mark the last popped item as handled.
    pub fn finish(&self) {
        self.state.lock().busy = false;
    }

    #[must_use]
    pub fn is_idle(&self) -> bool {
        let state = self.state.lock();
        state.items.is_empty() && !state.busy
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Discard everything queued, returning how many items were dropped.
    pub fn clear(&self) -> usize {
        let mut state = self.state.lock();
        let n = state.items.len();
        state.items.clear();
        n
    }
}

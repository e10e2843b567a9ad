//! The shared buffer: a closable, mutex + condvar guarded FIFO that couples
//! the connection manager (producer) to the data manager and storage
//! manager (the two consumers).
//!
//! Readings are inserted at the head and removed at the tail. The data
//! manager never removes; it *marks* the tail `processed` and leaves it for
//! the storage manager to remove. This "peek-then-remove" protocol (see
//! SPEC_FULL.md §4.1) guarantees a reading is analysed before it is
//! persisted without needing a second queue.
//!
//! A `VecDeque` stands in for the original's doubly-linked node list: the
//! design notes call out that a `prev`-only link is sufficient since
//! insertion only ever happens at the head and removal only at the tail,
//! which is exactly `push_front` / `pop_back`.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

use crate::error::BufferError;
use crate::reading::SensorReading;

struct BufferState {
    queue: VecDeque<SensorReading>,
    closed: bool,
}

/// Outcome of the storage manager's blocking wait.
#[derive(Debug, PartialEq, Eq)]
pub enum StorageWait {
    /// There is a processed reading at the tail, ready to be removed.
    ReadyToStore,
    /// The buffer is empty and closed; no more work will ever arrive.
    Drained,
}

/// The shared FIFO buffer. Cheap to share via `Arc`; all operations lock
/// internally, callers never hold the mutex themselves.
pub struct SharedBuffer {
    state: Mutex<BufferState>,
    condvar: Condvar,
}

impl SharedBuffer {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(BufferState {
                queue: VecDeque::new(),
                closed: false,
            }),
            condvar: Condvar::new(),
        }
    }

    /// Prepend a reading at the head. Fails if the buffer has been closed.
    /// At-most-one producer is assumed; no internal serialization beyond
    /// the mutex is needed to keep that producer's inserts ordered.
    pub fn insert_front(&self, reading: SensorReading) -> Result<(), BufferError> {
        let mut state = self.state.lock().unwrap();
        if state.closed {
            return Err(BufferError::Closed);
        }
        let mut reading = reading;
        reading.processed = false;
        state.queue.push_front(reading);
        Ok(())
    }

    /// If non-empty, mark the tail `processed` and return a copy of it.
    /// Idempotent: calling this again on an already-processed tail just
    /// returns it again unchanged. Signals waiters either way, since the
    /// storage manager only cares about the post-call state.
    pub fn peek_tail_and_mark_processed(&self) -> Option<SensorReading> {
        let mut state = self.state.lock().unwrap();
        let reading = state.queue.back_mut().map(|tail| {
            tail.processed = true;
            *tail
        });
        if reading.is_some() {
            self.condvar.notify_all();
        }
        reading
    }

    /// Unlink and return the tail. Precondition: the buffer is non-empty.
    ///
    /// # Panics
    /// Panics if the buffer is empty: removing from an empty buffer is a
    /// programming error, not a runtime condition to recover from.
    pub fn remove_tail(&self) -> SensorReading {
        let mut state = self.state.lock().unwrap();
        state
            .queue
            .pop_back()
            .expect("remove_tail called on an empty buffer")
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().unwrap().queue.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }

    /// Non-empty and the tail has not yet been processed.
    pub fn has_unprocessed_tail(&self) -> bool {
        let state = self.state.lock().unwrap();
        state.queue.back().is_some_and(|tail| !tail.processed)
    }

    /// Non-empty and the tail has already been processed.
    pub fn has_processed_tail(&self) -> bool {
        let state = self.state.lock().unwrap();
        state.queue.back().is_some_and(|tail| tail.processed)
    }

    /// Close the buffer: no further `insert_front` will succeed. Wakes any
    /// thread blocked in `wait_for_storage_work`. Idempotent — closing an
    /// already-closed buffer is a no-op.
    pub fn close(&self) {
        let mut state = self.state.lock().unwrap();
        state.closed = true;
        drop(state);
        self.condvar.notify_all();
    }

    /// Block until there is a processed reading to store, or the buffer is
    /// drained and will never produce one (empty and closed). This is the
    /// storage manager's sole suspension point.
    pub fn wait_for_storage_work(&self) -> StorageWait {
        let mut state = self.state.lock().unwrap();
        loop {
            if let Some(tail) = state.queue.back() {
                if tail.processed {
                    return StorageWait::ReadyToStore;
                }
            } else if state.closed {
                return StorageWait::Drained;
            }
            state = self.condvar.wait(state).unwrap();
        }
    }
}

impl Default for SharedBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(id: u16) -> SensorReading {
        SensorReading::new(id, 1.0, 0)
    }

    #[test]
    fn fifo_order_is_preserved_across_peek_and_remove() {
        let buffer = SharedBuffer::new();
        buffer.insert_front(reading(1)).unwrap();
        buffer.insert_front(reading(2)).unwrap();
        buffer.insert_front(reading(3)).unwrap();

        // tail is the oldest insertion (id 1)
        assert_eq!(buffer.peek_tail_and_mark_processed().unwrap().id, 1);
        assert_eq!(buffer.remove_tail().id, 1);
        assert_eq!(buffer.peek_tail_and_mark_processed().unwrap().id, 2);
        assert_eq!(buffer.remove_tail().id, 2);
        assert_eq!(buffer.peek_tail_and_mark_processed().unwrap().id, 3);
        assert_eq!(buffer.remove_tail().id, 3);
        assert!(buffer.is_empty());
    }

    #[test]
    fn peek_is_idempotent_on_an_already_processed_tail() {
        let buffer = SharedBuffer::new();
        buffer.insert_front(reading(1)).unwrap();
        let first = buffer.peek_tail_and_mark_processed().unwrap();
        let second = buffer.peek_tail_and_mark_processed().unwrap();
        assert_eq!(first, second);
        assert!(buffer.has_processed_tail());
    }

    #[test]
    fn insert_fails_after_close() {
        let buffer = SharedBuffer::new();
        buffer.close();
        buffer.close(); // two consecutive closes are equivalent to one
        assert_eq!(buffer.insert_front(reading(1)), Err(BufferError::Closed));
        assert!(buffer.is_empty());
    }

    #[test]
    fn empty_buffer_has_no_unprocessed_or_processed_tail() {
        let buffer = SharedBuffer::new();
        assert!(!buffer.has_unprocessed_tail());
        assert!(!buffer.has_processed_tail());
    }

    #[test]
    fn wait_for_storage_work_reports_drained_once_empty_and_closed() {
        let buffer = SharedBuffer::new();
        buffer.close();
        assert_eq!(buffer.wait_for_storage_work(), StorageWait::Drained);
    }

    #[test]
    fn wait_for_storage_work_wakes_on_peek_from_another_thread() {
        use std::sync::Arc;
        use std::thread;
        use std::time::Duration;

        let buffer = Arc::new(SharedBuffer::new());
        buffer.insert_front(reading(42)).unwrap();

        let producer = Arc::clone(&buffer);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            producer.peek_tail_and_mark_processed();
        });

        assert_eq!(buffer.wait_for_storage_work(), StorageWait::ReadyToStore);
        handle.join().unwrap();
    }

    #[test]
    #[should_panic(expected = "remove_tail called on an empty buffer")]
    fn remove_tail_on_empty_buffer_panics() {
        SharedBuffer::new().remove_tail();
    }
}

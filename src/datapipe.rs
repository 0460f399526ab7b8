//! Bounded FIFO queue connecting one producer port to one consumer port.
//!
//! Implemented with a mutex plus two condition variables rather than a
//! channel, because the core needs a non-consuming `peek` alongside `pop`
//! (see SPEC_FULL.md §4.1, §9) — `std::sync::mpsc`/`crossbeam::channel`
//! don't expose that.
//!
//! No cross-producer ordering is guaranteed: if two producer threads race
//! to push onto the same pipe, their relative order is whatever the mutex
//! happened to grant, matching the distilled spec's explicit non-goal.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

/// Failure modes for a timed push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushError {
    /// Capacity was not freed up within the requested timeout.
    Timeout,
    /// The pipe was closed (shutdown in progress) before the push landed.
    Closed,
}

struct Inner<T> {
    queue: VecDeque<T>,
    capacity: usize,
    closed: bool,
}

/// A push-notifier: invoked exactly once per successful push, after the
/// item is visible to consumers (i.e. outside the lock).
pub type PushHandler = Box<dyn Fn() + Send + Sync>;

/// Bounded, mutex-guarded FIFO queue with timed push and a push-notifier.
pub struct DataPipe<T> {
    inner: Mutex<Inner<T>>,
    not_full: Condvar,
    not_empty: Condvar,
    handler: Mutex<Option<PushHandler>>,
}

impl<T> DataPipe<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                queue: VecDeque::with_capacity(capacity.min(1024)),
                capacity,
                closed: false,
            }),
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
            handler: Mutex::new(None),
        }
    }

    /// Register the push-notifier. Must be called before any producer can
    /// publish (wiring always happens before `start`, see `connector`).
    pub fn set_push_handler(&self, handler: PushHandler) {
        *self.handler.lock().unwrap() = Some(handler);
    }

    /// Push an item, blocking up to `timeout` if the pipe is full.
    ///
    /// On success, the push-notifier runs after the mutex is released, so a
    /// consumer woken by it is guaranteed to observe `len() > 0`.
    pub fn push(&self, item: T, timeout: Duration) -> Result<(), PushError> {
        let deadline = Instant::now() + timeout;
        {
            let mut guard = self.inner.lock().unwrap();
            loop {
                if guard.closed {
                    return Err(PushError::Closed);
                }
                if guard.queue.len() < guard.capacity {
                    guard.queue.push_back(item);
                    break;
                }
                let now = Instant::now();
                if now >= deadline {
                    return Err(PushError::Timeout);
                }
                let (g, timeout_result) =
                    self.not_full.wait_timeout(guard, deadline - now).unwrap();
                guard = g;
                if timeout_result.timed_out() && guard.queue.len() >= guard.capacity {
                    // Re-check on the next loop iteration; the deadline check
                    // above is authoritative, this just avoids spinning.
                }
            }
        }
        self.not_empty.notify_one();
        if let Some(handler) = self.handler.lock().unwrap().as_ref() {
            handler();
        }
        Ok(())
    }

    /// Mark the pipe closed: further pushes fail immediately, waiters are
    /// woken so producers blocked in `push` don't spin past shutdown.
    pub fn close(&self) {
        self.inner.lock().unwrap().closed = true;
        self.not_full.notify_all();
        self.not_empty.notify_all();
    }

    /// Remove and return the head, if any. Non-blocking.
    pub fn pop(&self) -> Option<T> {
        let mut guard = self.inner.lock().unwrap();
        let item = guard.queue.pop_front();
        if item.is_some() {
            drop(guard);
            self.not_full.notify_one();
        }
        item
    }

    /// Current number of queued items.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Configured bound.
    pub fn capacity(&self) -> usize {
        self.inner.lock().unwrap().capacity
    }
}

impl<T: Clone> DataPipe<T> {
    /// Return a clone of the head without removing it. Non-blocking.
    pub fn peek(&self) -> Option<T> {
        self.inner.lock().unwrap().queue.front().cloned()
    }
}

/// Convenience alias: pipes are always shared behind an `Arc` since one
/// downstream element owns it while upstream elements hold weak refs.
pub type SharedPipe<T> = Arc<DataPipe<T>>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn push_pop_preserves_fifo() {
        let pipe: DataPipe<i32> = DataPipe::new(4);
        for i in 0..4 {
            pipe.push(i, Duration::from_millis(10)).unwrap();
        }
        for i in 0..4 {
            assert_eq!(pipe.pop(), Some(i));
        }
        assert_eq!(pipe.pop(), None);
    }

    #[test]
    fn push_beyond_capacity_times_out() {
        let pipe: DataPipe<i32> = DataPipe::new(1);
        pipe.push(1, Duration::from_millis(10)).unwrap();
        let result = pipe.push(2, Duration::from_millis(0));
        assert_eq!(result, Err(PushError::Timeout));
    }

    #[test]
    fn size_bounded_by_capacity() {
        let pipe: DataPipe<i32> = DataPipe::new(2);
        pipe.push(1, Duration::from_millis(10)).unwrap();
        pipe.push(2, Duration::from_millis(10)).unwrap();
        assert_eq!(pipe.len(), 2);
        assert!(pipe.len() <= pipe.capacity());
        assert!(pipe.push(3, Duration::from_millis(0)).is_err());
    }

    #[test]
    fn notify_handler_runs_once_per_push() {
        let pipe: DataPipe<i32> = DataPipe::new(4);
        let count = Arc::new(AtomicUsize::new(0));
        let count2 = count.clone();
        pipe.set_push_handler(Box::new(move || {
            count2.fetch_add(1, Ordering::SeqCst);
        }));
        pipe.push(1, Duration::from_millis(10)).unwrap();
        pipe.push(2, Duration::from_millis(10)).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn blocked_push_unblocks_on_pop() {
        let pipe = Arc::new(DataPipe::<i32>::new(1));
        pipe.push(1, Duration::from_millis(10)).unwrap();

        let pipe2 = pipe.clone();
        let handle = thread::spawn(move || {
            pipe2.push(2, Duration::from_secs(1)).unwrap();
        });

        thread::sleep(Duration::from_millis(20));
        assert_eq!(pipe.pop(), Some(1));
        handle.join().unwrap();
        assert_eq!(pipe.pop(), Some(2));
    }

    #[test]
    fn closed_pipe_rejects_push() {
        let pipe: DataPipe<i32> = DataPipe::new(4);
        pipe.close();
        assert_eq!(pipe.push(1, Duration::from_millis(10)), Err(PushError::Closed));
    }

    #[test]
    fn peek_does_not_remove() {
        let pipe: DataPipe<i32> = DataPipe::new(4);
        pipe.push(7, Duration::from_millis(10)).unwrap();
        assert_eq!(pipe.peek(), Some(7));
        assert_eq!(pipe.len(), 1);
        assert_eq!(pipe.pop(), Some(7));
    }
}

//! # Work Queue
//!
//! Thread-safe FIFO of tagged messages used for every hand-off between the
//! serving threads, the player thread and the cache builder threads.
//!
//! ## Semantics
//!
//! - [`WorkQueue::push`] appends and wakes waiters (and the optional external
//!   waker, e.g. an event loop's wakeup pipe).
//! - [`WorkQueue::pop`] takes the head (`id == 0`) or the first message whose
//!   correlation id matches. Non-matching messages are skipped in place, so
//!   messages sharing an id always come out in the order they went in.
//! - [`WorkQueue::expire`] drops messages that nobody collected.
//! - [`WorkQueue::shutdown`] wakes every blocked waiter; afterwards `pop`
//!   never blocks.
//!
//! ## Example
//!
//! ```
//! use jukeboxd::work_queue::{Message, Timeout, WorkQueue};
//!
//! let queue = WorkQueue::new("responses");
//! queue.push(Message::new(7, "for connection 7"));
//! queue.push(Message::new(3, "for connection 3"));
//!
//! let reply = queue.pop(Timeout::NoWait, 3).map(Message::into_payload);
//! assert_eq!(reply, Some("for connection 3"));
//! assert_eq!(queue.len(), 1);
//! ```

use log::{debug, trace};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// How long [`WorkQueue::pop`] may block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeout {
    /// Return immediately when nothing matches
    NoWait,
    /// Block for at most this many milliseconds
    WaitMs(u64),
    /// Block until a matching message arrives or the queue shuts down
    WaitForever,
}

/// A queued payload with its correlation id and enqueue time
#[derive(Debug)]
pub struct Message<T> {
    /// Correlation id; 0 means "any consumer"
    pub id: u64,
    pub payload: T,
    enqueued_at: Instant,
}

impl<T> Message<T> {
    pub fn new(id: u64, payload: T) -> Self {
        Self {
            id,
            payload,
            enqueued_at: Instant::now(),
        }
    }

    /// Message without a correlation id, consumed by whoever pops the head
    pub fn broadcast(payload: T) -> Self {
        Self::new(0, payload)
    }

    pub fn age(&self) -> Duration {
        self.enqueued_at.elapsed()
    }

    pub fn into_payload(self) -> T {
        self.payload
    }
}

/// External wakeup hook pulsed on every push
pub type Waker = Box<dyn Fn() + Send + Sync>;

struct Inner<T> {
    messages: VecDeque<Message<T>>,
    shut_down: bool,
}

impl<T> Inner<T> {
    fn take(&mut self, id: u64) -> Option<Message<T>> {
        let position = if id == 0 {
            if self.messages.is_empty() {
                return None;
            }
            0
        } else {
            self.messages.iter().position(|message| message.id == id)?
        };
        self.messages.remove(position)
    }
}

pub struct WorkQueue<T> {
    name: &'static str,
    inner: Mutex<Inner<T>>,
    available: Condvar,
    waker: Option<Waker>,
}

impl<T> WorkQueue<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            inner: Mutex::new(Inner {
                messages: VecDeque::new(),
                shut_down: false,
            }),
            available: Condvar::new(),
            waker: None,
        }
    }

    /// Queue whose pushes also call `waker`
    pub fn with_waker(name: &'static str, waker: Waker) -> Self {
        Self {
            waker: Some(waker),
            ..Self::new(name)
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn push(&self, message: Message<T>) {
        let id = message.id;
        let length = {
            let mut inner = self.inner.lock();
            inner.messages.push_back(message);
            inner.messages.len()
        };
        trace!("{}: pushed message for id {id}, length {length}", self.name);

        // Waiters filter by correlation id, so a single wakeup could land on
        // a thread that is waiting for some other id.
        self.available.notify_all();
        if let Some(waker) = &self.waker {
            waker();
        }
    }

    /// Remove and return the first message matching `id` (0 = head).
    ///
    /// Returns `None` when nothing matched before the timeout, or when the
    /// queue was shut down and holds no matching message.
    pub fn pop(&self, timeout: Timeout, id: u64) -> Option<Message<T>> {
        let mut inner = self.inner.lock();
        let deadline = match timeout {
            Timeout::NoWait => return inner.take(id),
            Timeout::WaitMs(ms) => Some(Instant::now() + Duration::from_millis(ms)),
            Timeout::WaitForever => None,
        };

        loop {
            if let Some(message) = inner.take(id) {
                return Some(message);
            }
            if inner.shut_down {
                return None;
            }
            match deadline {
                Some(deadline) => {
                    if self.available.wait_until(&mut inner, deadline).timed_out() {
                        return inner.take(id);
                    }
                }
                None => self.available.wait(&mut inner),
            }
        }
    }

    /// Drop every message older than `max_age`, or all of them for a zero age.
    /// Returns how many were removed.
    pub fn expire(&self, max_age: Duration) -> usize {
        let expired: Vec<Message<T>> = {
            let mut inner = self.inner.lock();
            if max_age.is_zero() {
                inner.messages.drain(..).collect()
            } else {
                let (old, young): (VecDeque<_>, VecDeque<_>) = inner
                    .messages
                    .drain(..)
                    .partition(|message| message.age() > max_age);
                inner.messages = young;
                old.into_iter().collect()
            }
        };

        let count = expired.len();
        if count > 0 {
            debug!("{}: expired {count} messages", self.name);
        }
        // Payloads (and any snapshot they still own) are dropped outside the lock.
        drop(expired);
        count
    }

    /// Wake every waiter and stop blocking from now on
    pub fn shutdown(&self) {
        self.inner.lock().shut_down = true;
        self.available.notify_all();
        debug!("{}: shut down", self.name);
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.lock().shut_down
    }

    pub fn len(&self) -> usize {
        self.inner.lock().messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

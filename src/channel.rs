//! Closable, unbounded, typed FIFO channel.
//!
//! [`Channel`] is the one message-passing primitive in the harness. It is
//! multi-producer, multi-consumer, and works from both sides of the thread
//! boundary:
//!
//! - **Cooperative tasks** receive with [`Channel::recv`], which registers
//!   the task's waker and suspends until a value or close arrives.
//! - **Bare OS threads** receive with [`Channel::recv_blocking`], which
//!   parks on a condition variable instead.
//!
//! Sends never block (the queue is unbounded) and are therefore safe from
//! any context. Each successful send wakes exactly one waiter: the oldest
//! registered task waker if there is one, otherwise one parked thread.
//!
//! # Close semantics
//!
//! `close` is idempotent. After close, sends fail with [`ChannelClosed`],
//! but values already queued are still delivered in order; receivers see
//! `ChannelClosed` only once the queue has drained.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll, Waker};
use std::time::{Duration, Instant};

use crate::error::ChannelClosed;

/// Process-wide counter backing [`Channel::id`].
static NEXT_CHANNEL_ID: AtomicU64 = AtomicU64::new(1);

/// Unbounded MPMC FIFO of typed values, closable, usable from cooperative
/// tasks and OS threads alike.
///
/// Cloning a `Channel` clones the handle, not the queue: all clones share
/// the same underlying state and compare equal under
/// [`same_channel`](Channel::same_channel).
pub struct Channel<T> {
    shared: Arc<Shared<T>>,
}

struct Shared<T> {
    state: Mutex<State<T>>,
    available: Condvar,
    id: u64,
}

struct State<T> {
    queue: VecDeque<T>,
    closed: bool,
    /// Task wakers parked in `recv`, oldest first.
    waiters: VecDeque<Waker>,
}

impl<T> Channel<T> {
    /// Create a new open, empty channel.
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    queue: VecDeque::new(),
                    closed: false,
                    waiters: VecDeque::new(),
                }),
                available: Condvar::new(),
                id: NEXT_CHANNEL_ID.fetch_add(1, Ordering::Relaxed),
            }),
        }
    }

    /// Process-unique id of the underlying queue, stable across clones.
    ///
    /// Used for log-friendly endpoint renderings.
    pub fn id(&self) -> u64 {
        self.shared.id
    }

    /// Whether `self` and `other` are handles to the same underlying queue.
    pub fn same_channel(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.shared.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enqueue a value and wake one waiter.
    ///
    /// Never blocks. Fails once the channel is closed; the value is
    /// reported lost rather than silently dropped.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelClosed`] if `close` has been called.
    pub fn send(&self, value: T) -> Result<(), ChannelClosed> {
        let mut state = self.lock();
        if state.closed {
            return Err(ChannelClosed);
        }
        state.queue.push_back(value);
        match state.waiters.pop_front() {
            Some(waker) => {
                drop(state);
                waker.wake();
            }
            None => {
                drop(state);
                self.shared.available.notify_one();
            }
        }
        Ok(())
    }

    /// Receive the next value, suspending the current task while the queue
    /// is empty.
    ///
    /// Resolves to [`ChannelClosed`] once the channel is closed **and**
    /// drained; values enqueued before the close are still delivered.
    pub fn recv(&self) -> Recv<'_, T> {
        Recv {
            channel: self,
            waker: None,
        }
    }

    /// Dequeue the head without suspending.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelClosed`] when the channel is closed and empty.
    pub fn try_recv(&self) -> Result<Option<T>, ChannelClosed> {
        let mut state = self.lock();
        match state.queue.pop_front() {
            Some(value) => Ok(Some(value)),
            None if state.closed => Err(ChannelClosed),
            None => Ok(None),
        }
    }

    /// Receive with a deadline, for cooperative tasks.
    ///
    /// Returns `Ok(None)` if the timeout elapses first. A zero timeout
    /// polls the queue without sleeping. Must run under a scheduler.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelClosed`] when the channel is closed and empty.
    pub async fn recv_timeout(&self, timeout: Duration) -> Result<Option<T>, ChannelClosed> {
        if timeout.is_zero() {
            return self.try_recv();
        }
        match crate::sched::timeout(timeout, self.recv()).await {
            Ok(Ok(value)) => Ok(Some(value)),
            Ok(Err(closed)) => Err(closed),
            Err(_elapsed) => Ok(None),
        }
    }

    /// Receive from a bare OS thread, parking on a condition variable.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelClosed`] when the channel is closed and empty.
    pub fn recv_blocking(&self) -> Result<T, ChannelClosed> {
        let mut state = self.lock();
        loop {
            if let Some(value) = state.queue.pop_front() {
                return Ok(value);
            }
            if state.closed {
                return Err(ChannelClosed);
            }
            state = self
                .shared
                .available
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Receive from a bare OS thread with a deadline.
    ///
    /// Returns `Ok(None)` if the timeout elapses first. A zero timeout
    /// polls the queue without sleeping.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelClosed`] when the channel is closed and empty.
    pub fn recv_timeout_blocking(&self, timeout: Duration) -> Result<Option<T>, ChannelClosed> {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock();
        loop {
            if let Some(value) = state.queue.pop_front() {
                return Ok(Some(value));
            }
            if state.closed {
                return Err(ChannelClosed);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            let (guard, _) = self
                .shared
                .available
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            state = guard;
        }
    }

    /// Close the channel. Idempotent.
    ///
    /// Wakes every waiter so blocked receivers can observe the close.
    /// Already-enqueued values remain receivable.
    pub fn close(&self) {
        let mut state = self.lock();
        if state.closed {
            return;
        }
        state.closed = true;
        let waiters = std::mem::take(&mut state.waiters);
        drop(state);
        for waker in waiters {
            waker.wake();
        }
        self.shared.available.notify_all();
    }

    /// Whether `close` has been called.
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Number of values currently queued.
    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    /// Whether the queue is currently empty.
    pub fn is_empty(&self) -> bool {
        self.lock().queue.is_empty()
    }
}

impl<T> Clone for Channel<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> Default for Channel<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for Channel<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("Channel")
            .field("id", &self.shared.id)
            .field("len", &state.queue.len())
            .field("closed", &state.closed)
            .finish()
    }
}

/// Future returned by [`Channel::recv`].
pub struct Recv<'a, T> {
    channel: &'a Channel<T>,
    /// The waker this future registered on its last pending poll, kept so
    /// it can be deregistered on re-poll and on drop.
    waker: Option<Waker>,
}

impl<T> Future for Recv<'_, T> {
    type Output = Result<T, ChannelClosed>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = Pin::into_inner(self);
        let mut state = this.channel.lock();
        if let Some(old) = this.waker.take() {
            state.waiters.retain(|w| !w.will_wake(&old));
        }
        if let Some(value) = state.queue.pop_front() {
            return Poll::Ready(Ok(value));
        }
        if state.closed {
            return Poll::Ready(Err(ChannelClosed));
        }
        let waker = cx.waker().clone();
        state.waiters.push_back(waker.clone());
        this.waker = Some(waker);
        Poll::Pending
    }
}

impl<T> Drop for Recv<'_, T> {
    fn drop(&mut self) {
        let Some(waker) = self.waker.take() else {
            return;
        };
        let mut state = self.channel.lock();
        state.waiters.retain(|w| !w.will_wake(&waker));
        // A send may have picked this future as its one waiter after the
        // last poll; hand the wakeup on so the value is not stranded.
        if !state.queue.is_empty() {
            match state.waiters.pop_front() {
                Some(next) => {
                    drop(state);
                    next.wake();
                }
                None => {
                    drop(state);
                    self.channel.shared.available.notify_one();
                }
            }
        }
    }
}

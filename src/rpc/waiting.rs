//! Per-client response correlation.
//!
//! Every stub owns a [`WaitingManager`]: it allocates request ids, parks
//! the calling task per id, routes arriving responses to the matching
//! waiter, and synthesizes a timeout response when the caller's deadline
//! elapses first.
//!
//! The id counter is per-manager and never reused, so tests that spin up
//! many actors get independent id sequences and concurrent handlers can
//! never share a slot.
//!
//! # Invariants
//!
//! - An id is live (has a waiter entry) iff exactly one task may park on
//!   it; a second parked task is a programmer error and panics.
//! - A response is delivered at most once; a duplicate panics.
//! - The waiter entry is always removed when the wait ends — delivery,
//!   timeout, or cancellation — enforced by a drop guard on the wait
//!   future.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll, Waker};
use std::time::Duration;

use crate::rpc::wire::Response;

/// Correlates outgoing request ids with incoming responses for one stub.
///
/// Clones share the same table.
#[derive(Clone)]
pub struct WaitingManager {
    state: Arc<Mutex<WaitState>>,
}

struct WaitState {
    next_id: u64,
    waiters: HashMap<u64, Waiter>,
}

#[derive(Default)]
struct Waiter {
    response: Option<Response>,
    waker: Option<Waker>,
    /// Set once a task has parked on this entry.
    busy: bool,
}

impl WaitingManager {
    /// Create a manager with an empty table; ids start at 1.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(WaitState {
                next_id: 1,
                waiters: HashMap::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, WaitState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Hand out the next request id. Strictly increasing, never reused.
    pub fn alloc_id(&self) -> u64 {
        let mut state = self.lock();
        let id = state.next_id;
        state.next_id += 1;
        id
    }

    /// Install the waiter entry for `id`.
    ///
    /// Must happen before the request is shipped, so a response can never
    /// arrive ahead of its entry.
    ///
    /// # Panics
    ///
    /// Panics if an entry for `id` already exists.
    pub fn register(&self, id: u64) {
        let mut state = self.lock();
        if state.waiters.insert(id, Waiter::default()).is_some() {
            panic!("waiter already registered for request id {id}");
        }
    }

    /// Whether a waiter entry exists for `id`.
    pub fn exists(&self, id: u64) -> bool {
        self.lock().waiters.contains_key(&id)
    }

    /// Drop the entry for `id` without waiting, e.g. when the request
    /// could not be shipped.
    pub(crate) fn discard(&self, id: u64) {
        self.lock().waiters.remove(&id);
    }

    /// Route a response to its waiter.
    ///
    /// A response without a live entry belongs to a caller that already
    /// timed out; it is discarded.
    ///
    /// # Panics
    ///
    /// Panics if the entry has already received a response.
    pub fn deliver(&self, response: Response) {
        let mut state = self.lock();
        let waker = match state.waiters.get_mut(&response.id) {
            None => {
                tracing::debug!(id = response.id, "response without a waiter discarded");
                None
            }
            Some(waiter) => {
                if waiter.response.is_some() {
                    panic!("response delivered twice for request id {}", response.id);
                }
                waiter.response = Some(response);
                waiter.waker.take()
            }
        };
        drop(state);
        if let Some(waker) = waker {
            waker.wake();
        }
    }

    /// Park the current task until the response for `id` arrives.
    ///
    /// With `timeout: None` the wait is unbounded. Otherwise a
    /// [`Response::timeout`] is synthesized locally once the deadline
    /// elapses and the entry is removed, so a late delivery is discarded.
    pub async fn wait_response(&self, id: u64, timeout: Option<Duration>) -> Response {
        let wait = ResponseWait {
            manager: self.clone(),
            id,
            parked: false,
            done: false,
        };
        match timeout {
            None => wait.await,
            Some(limit) => match crate::sched::timeout(limit, wait).await {
                Ok(response) => response,
                // The drop of the inner wait already removed the entry.
                Err(_elapsed) => Response::timeout(id),
            },
        }
    }
}

impl Default for WaitingManager {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for WaitingManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("WaitingManager")
            .field("next_id", &state.next_id)
            .field("waiting", &state.waiters.len())
            .finish()
    }
}

/// Future parking one task on one request id.
struct ResponseWait {
    manager: WaitingManager,
    id: u64,
    /// Whether this future has parked already (distinguishes a re-poll
    /// from a second task).
    parked: bool,
    /// Whether the response was taken, making the drop guard a no-op.
    done: bool,
}

impl Future for ResponseWait {
    type Output = Response;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Response> {
        let this = Pin::into_inner(self);
        let mut state = this.manager.lock();
        let Some(waiter) = state.waiters.get_mut(&this.id) else {
            panic!(
                "waiter entry for request id {} vanished while a task was parked",
                this.id
            );
        };
        if let Some(response) = waiter.response.take() {
            state.waiters.remove(&this.id);
            this.done = true;
            return Poll::Ready(response);
        }
        if waiter.busy && !this.parked {
            panic!("two tasks parked on request id {}", this.id);
        }
        waiter.busy = true;
        this.parked = true;
        waiter.waker = Some(cx.waker().clone());
        Poll::Pending
    }
}

impl Drop for ResponseWait {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        self.manager.lock().waiters.remove(&self.id);
    }
}

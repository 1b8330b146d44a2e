//! Cooperative condition variable.
//!
//! [`Condition`] lets tasks suspend until another task — or another
//! thread — notifies them. It understands the scheduler on the waiter's
//! side (waiting registers the task's waker), while the notify side is a
//! plain method call that is safe from any thread.
//!
//! `notify_one` hands out a single permit consumed by one waiter;
//! `notify_all` releases everyone waiting at that moment. A waiter that
//! arrives after a `notify_all` does not observe it.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll, Waker};
use std::time::Duration;

use super::timer::timeout;

/// Outcome of a timed wait on a [`Condition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The condition was notified before the deadline.
    Notified,
    /// The deadline elapsed first.
    TimedOut,
}

/// Cross-thread condition variable for cooperative tasks.
///
/// Clones share the same notification state.
#[derive(Clone, Default)]
pub struct Condition {
    inner: Arc<Mutex<CondInner>>,
}

#[derive(Default)]
struct CondInner {
    /// Bumped by `notify_all`; waiters compare against their start epoch.
    epoch: u64,
    /// Outstanding `notify_one` permits not yet consumed.
    permits: u64,
    waiters: VecDeque<Waker>,
}

impl Condition {
    /// Create a new condition with no pending notifications.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, CondInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Release one waiter.
    ///
    /// The permit is not lost if nobody is waiting yet: the next waiter
    /// consumes it immediately.
    pub fn notify_one(&self) {
        let mut inner = self.lock();
        inner.permits += 1;
        let waker = inner.waiters.pop_front();
        drop(inner);
        if let Some(waker) = waker {
            waker.wake();
        }
    }

    /// Release every task currently waiting.
    pub fn notify_all(&self) {
        let mut inner = self.lock();
        inner.epoch += 1;
        let waiters = std::mem::take(&mut inner.waiters);
        drop(inner);
        for waker in waiters {
            waker.wake();
        }
    }

    /// Suspend the current task until the condition is notified.
    pub fn wait(&self) -> Notified {
        let epoch = self.lock().epoch;
        Notified {
            condition: self.clone(),
            epoch,
            waker: None,
        }
    }

    /// Suspend until notified or until `duration` elapses.
    pub async fn wait_timeout(&self, duration: Duration) -> WaitOutcome {
        match timeout(duration, self.wait()).await {
            Ok(()) => WaitOutcome::Notified,
            Err(_elapsed) => WaitOutcome::TimedOut,
        }
    }
}

impl std::fmt::Debug for Condition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("Condition")
            .field("epoch", &inner.epoch)
            .field("permits", &inner.permits)
            .field("waiters", &inner.waiters.len())
            .finish()
    }
}

/// Future returned by [`Condition::wait`].
pub struct Notified {
    condition: Condition,
    /// Epoch observed when the wait began; a later `notify_all` bumps it.
    epoch: u64,
    /// Waker registered on the last pending poll, for deregistration.
    waker: Option<Waker>,
}

impl Future for Notified {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let this = Pin::into_inner(self);
        let mut inner = this.condition.lock();
        if let Some(old) = this.waker.take() {
            inner.waiters.retain(|w| !w.will_wake(&old));
        }
        if inner.epoch != this.epoch {
            return Poll::Ready(());
        }
        if inner.permits > 0 {
            inner.permits -= 1;
            return Poll::Ready(());
        }
        let waker = cx.waker().clone();
        inner.waiters.push_back(waker.clone());
        this.waker = Some(waker);
        Poll::Pending
    }
}

impl Drop for Notified {
    fn drop(&mut self) {
        let Some(waker) = self.waker.take() else {
            return;
        };
        let mut inner = self.condition.lock();
        inner.waiters.retain(|w| !w.will_wake(&waker));
        // If a permit was aimed at this waiter, pass the wakeup on.
        if inner.permits > 0 {
            if let Some(next) = inner.waiters.pop_front() {
                drop(inner);
                next.wake();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sched::{block_on, sleep, spawn};
    use std::cell::Cell;
    use std::rc::Rc;
    use std::thread;

    #[test]
    fn notify_one_releases_a_single_waiter() {
        let released = Rc::new(Cell::new(0u32));
        let condition = Condition::new();
        block_on({
            let condition = condition.clone();
            let released = Rc::clone(&released);
            async move {
                for _ in 0..3 {
                    let condition = condition.clone();
                    let released = Rc::clone(&released);
                    spawn(async move {
                        condition.wait().await;
                        released.set(released.get() + 1);
                    });
                }
                sleep(Duration::from_millis(5)).await;
                condition.notify_one();
                sleep(Duration::from_millis(5)).await;
                assert_eq!(released.get(), 1);
                condition.notify_all();
            }
        });
        assert_eq!(released.get(), 3);
    }

    #[test]
    fn notify_all_releases_everyone() {
        let released = Rc::new(Cell::new(0u32));
        let condition = Condition::new();
        block_on({
            let condition = condition.clone();
            let released = Rc::clone(&released);
            async move {
                for _ in 0..4 {
                    let condition = condition.clone();
                    let released = Rc::clone(&released);
                    spawn(async move {
                        condition.wait().await;
                        released.set(released.get() + 1);
                    });
                }
                sleep(Duration::from_millis(5)).await;
                condition.notify_all();
            }
        });
        assert_eq!(released.get(), 4);
    }

    #[test]
    fn wait_timeout_expires() {
        let condition = Condition::new();
        let outcome = block_on(async move {
            condition.wait_timeout(Duration::from_millis(15)).await
        });
        assert_eq!(outcome, WaitOutcome::TimedOut);
    }

    #[test]
    fn notify_crosses_threads() {
        let condition = Condition::new();
        let notifier = condition.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            notifier.notify_all();
        });

        let outcome =
            block_on(async move { condition.wait_timeout(Duration::from_secs(2)).await });
        assert_eq!(outcome, WaitOutcome::Notified);
        handle.join().expect("notifier thread");
    }

    #[test]
    fn permit_is_kept_for_late_waiter() {
        let condition = Condition::new();
        condition.notify_one();
        let outcome = block_on(async move {
            condition.wait_timeout(Duration::from_millis(50)).await
        });
        assert_eq!(outcome, WaitOutcome::Notified);
    }
}

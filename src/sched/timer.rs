//! Timers for cooperative tasks: [`sleep`] and [`timeout`].
//!
//! Both integrate with the run loop's timer heap: a pending sleep arms a
//! timer entry carrying the task's waker, and the loop parks no longer
//! than the earliest pending deadline.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use thiserror::Error;

use super::Handle;

/// Suspend the current task for at least `duration`.
///
/// Must be awaited under a scheduler; see [`block_on`](super::block_on).
pub fn sleep(duration: Duration) -> Sleep {
    Sleep {
        deadline: Instant::now() + duration,
    }
}

/// Future returned by [`sleep`]. Completes once its deadline has passed.
pub struct Sleep {
    deadline: Instant,
}

impl Future for Sleep {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if Instant::now() >= self.deadline {
            return Poll::Ready(());
        }
        match Handle::current() {
            Some(handle) => {
                handle.register_timer(self.deadline, cx.waker().clone());
                Poll::Pending
            }
            None => panic!("sleep requires a scheduler on this thread; enter one with block_on"),
        }
    }
}

/// The deadline of a [`timeout`] elapsed before its future completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("deadline elapsed")]
pub struct Elapsed;

/// Bound `future` by a deadline.
///
/// The inner future is polled before the deadline is checked, so a
/// zero-duration timeout still gives it one chance to complete without
/// sleeping.
pub fn timeout<F: Future>(duration: Duration, future: F) -> Timeout<F> {
    Timeout {
        future: Box::pin(future),
        sleep: sleep(duration),
    }
}

/// Future returned by [`timeout`].
pub struct Timeout<F> {
    future: Pin<Box<F>>,
    sleep: Sleep,
}

impl<F: Future> Future for Timeout<F> {
    type Output = Result<F::Output, Elapsed>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = Pin::into_inner(self);
        if let Poll::Ready(value) = this.future.as_mut().poll(cx) {
            return Poll::Ready(Ok(value));
        }
        match Pin::new(&mut this.sleep).poll(cx) {
            Poll::Ready(()) => Poll::Ready(Err(Elapsed)),
            Poll::Pending => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sched::block_on;

    #[test]
    fn sleep_zero_completes_immediately() {
        let started = Instant::now();
        block_on(async {
            sleep(Duration::ZERO).await;
        });
        assert!(started.elapsed() < Duration::from_millis(50));
    }

    #[test]
    fn timeout_zero_still_polls_once() {
        let result = block_on(async { timeout(Duration::ZERO, async { "ran" }).await });
        assert_eq!(result, Ok("ran"));
    }

    #[test]
    fn sequential_sleeps_accumulate() {
        let started = Instant::now();
        block_on(async {
            sleep(Duration::from_millis(20)).await;
            sleep(Duration::from_millis(20)).await;
        });
        assert!(started.elapsed() >= Duration::from_millis(35));
    }

    #[test]
    fn concurrent_sleeps_overlap() {
        let started = Instant::now();
        block_on(async {
            for _ in 0..4 {
                crate::sched::spawn(async {
                    sleep(Duration::from_millis(40)).await;
                });
            }
        });
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(35));
        assert!(elapsed < Duration::from_millis(160));
    }
}

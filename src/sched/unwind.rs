//! Panic containment for dispatched handlers.
//!
//! A handler that panics must fail its own request, not take the actor
//! down. [`CatchUnwind`] wraps a future so each poll runs inside
//! `std::panic::catch_unwind`, turning a panic into an `Err` carrying the
//! payload's description.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Future adapter that converts a panic during poll into an error value.
pub(crate) struct CatchUnwind<F> {
    future: Pin<Box<F>>,
}

impl<F> CatchUnwind<F> {
    pub(crate) fn new(future: F) -> Self {
        Self {
            future: Box::pin(future),
        }
    }
}

impl<F: Future> Future for CatchUnwind<F> {
    type Output = Result<F::Output, String>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = Pin::into_inner(self);
        match std::panic::catch_unwind(AssertUnwindSafe(|| this.future.as_mut().poll(cx))) {
            Ok(Poll::Ready(value)) => Poll::Ready(Ok(value)),
            Ok(Poll::Pending) => Poll::Pending,
            Err(payload) => Poll::Ready(Err(panic_description(payload))),
        }
    }
}

/// Best-effort extraction of a human-readable message from a panic
/// payload.
pub(crate) fn panic_description(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "handler panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sched::block_on;

    #[test]
    fn passes_through_success() {
        let result = block_on(CatchUnwind::new(async { 5 }));
        assert_eq!(result, Ok(5));
    }

    #[test]
    fn captures_panic_message() {
        let result = block_on(CatchUnwind::new(async {
            panic!("division by zero in handler");
        }));
        assert_eq!(result, Err("division by zero in handler".to_string()));
    }

    #[test]
    fn captures_formatted_panic() {
        let code = 7;
        let result: Result<(), String> = block_on(CatchUnwind::new(async move {
            panic!("bad state {code}");
        }));
        assert_eq!(result, Err("bad state 7".to_string()));
    }
}

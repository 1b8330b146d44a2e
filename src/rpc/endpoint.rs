//! Addressable handles for actors and client stubs.
//!
//! A [`ServerEndpoint`] bundles the three inbound channels of one actor —
//! requests, sleep commands, filter commands — and exposes the control
//! surface that feeds them. A [`ClientEndpoint`] carries one response
//! channel for one stub.
//!
//! Both are cheap clones of the same underlying bundle: identity is the
//! identity of the channels, not of the handle. The debug renderings
//! `STR(<hex>:0)` (server) and `CTR(0:<hex>)` (client) make endpoints
//! recognizable in logs, with the hex identifying the underlying channel.

use std::fmt;
use std::time::Duration;

use crate::channel::Channel;
use crate::error::ChannelClosed;
use crate::rpc::wire::{FilterCmd, MethodTag, Request, Response, SleepCmd};

/// The addressable identity of one actor: its request channel plus the
/// two control channels, with the send half of the wire contract.
///
/// Anyone holding a clone may address the actor; the server loop owns the
/// receive side.
#[derive(Clone)]
pub struct ServerEndpoint {
    requests: Channel<Request>,
    sleeps: Channel<SleepCmd>,
    filters: Channel<FilterCmd>,
}

impl ServerEndpoint {
    /// Allocate a fresh endpoint with three open channels.
    pub fn new() -> Self {
        Self {
            requests: Channel::new(),
            sleeps: Channel::new(),
            filters: Channel::new(),
        }
    }

    /// Ship a request to the actor.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelClosed`] once the actor has shut down.
    pub fn send_request(&self, request: Request) -> Result<(), ChannelClosed> {
        self.requests.send(request)
    }

    /// Put the actor to sleep for `duration`.
    ///
    /// With `drop_requests` set, requests arriving during the window are
    /// discarded without a response; otherwise they are deferred until the
    /// window ends.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelClosed`] once the actor has shut down.
    pub fn sleep(&self, duration: Duration, drop_requests: bool) -> Result<(), ChannelClosed> {
        self.sleeps.send(SleepCmd {
            duration,
            drop: drop_requests,
        })
    }

    /// Reject all requests for `method` with a synthetic failure until the
    /// filter is cleared or replaced.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelClosed`] once the actor has shut down.
    pub fn filter(&self, method: MethodTag) -> Result<(), ChannelClosed> {
        self.filters.send(FilterCmd::matching(method))
    }

    /// Remove the active method filter.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelClosed`] once the actor has shut down.
    pub fn clear_filter(&self) -> Result<(), ChannelClosed> {
        self.filters.send(FilterCmd::clear())
    }

    /// Terminate the actor: enqueue the shutdown sentinel, then close all
    /// three channels. Idempotent.
    ///
    /// In-flight handlers still run to completion; no new dispatches
    /// start once the sentinel (or the close) is observed.
    pub fn shutdown(&self) {
        let _ = self.requests.send(Request::shutdown());
        self.close();
    }

    /// Close all three channels without posting the sentinel.
    pub fn close(&self) {
        self.requests.close();
        self.sleeps.close();
        self.filters.close();
    }

    pub(crate) fn requests(&self) -> &Channel<Request> {
        &self.requests
    }

    pub(crate) fn sleeps(&self) -> &Channel<SleepCmd> {
        &self.sleeps
    }

    pub(crate) fn filters(&self) -> &Channel<FilterCmd> {
        &self.filters
    }
}

impl Default for ServerEndpoint {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for ServerEndpoint {
    fn eq(&self, other: &Self) -> bool {
        self.requests.same_channel(&other.requests)
    }
}

impl Eq for ServerEndpoint {}

impl fmt::Debug for ServerEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "STR({:x}:0)", self.requests.id())
    }
}

/// The response-side identity of one client stub.
#[derive(Clone)]
pub struct ClientEndpoint {
    responses: Channel<Response>,
}

impl ClientEndpoint {
    /// Allocate a fresh endpoint with an open response channel.
    pub fn new() -> Self {
        Self {
            responses: Channel::new(),
        }
    }

    /// Deliver a response to the stub's receiver.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelClosed`] once the stub has been dropped; the
    /// server treats this as "client vanished" and discards the outcome.
    pub fn send_response(&self, response: Response) -> Result<(), ChannelClosed> {
        self.responses.send(response)
    }

    /// Close the response channel.
    pub fn close(&self) {
        self.responses.close();
    }

    pub(crate) fn responses(&self) -> &Channel<Response> {
        &self.responses
    }
}

impl Default for ClientEndpoint {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for ClientEndpoint {
    fn eq(&self, other: &Self) -> bool {
        self.responses.same_channel(&other.responses)
    }
}

impl Eq for ClientEndpoint {}

impl fmt::Debug for ClientEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CTR(0:{:x})", self.responses.id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_debug_rendering() {
        let endpoint = ServerEndpoint::new();
        let rendered = format!("{endpoint:?}");
        assert!(rendered.starts_with("STR("));
        assert!(rendered.ends_with(":0)"));
    }

    #[test]
    fn client_debug_rendering() {
        let endpoint = ClientEndpoint::new();
        let rendered = format!("{endpoint:?}");
        assert!(rendered.starts_with("CTR(0:"));
    }

    #[test]
    fn equality_is_referential() {
        let a = ServerEndpoint::new();
        let b = a.clone();
        assert_eq!(a, b);
        assert_ne!(a, ServerEndpoint::new());

        let c = ClientEndpoint::new();
        assert_eq!(c, c.clone());
        assert_ne!(c, ClientEndpoint::new());
    }

    #[test]
    fn shutdown_closes_all_channels() {
        let endpoint = ServerEndpoint::new();
        endpoint.shutdown();
        assert!(endpoint.requests().is_closed());
        assert!(endpoint.sleeps().is_closed());
        assert!(endpoint.filters().is_closed());
        // The sentinel was enqueued before the close and is still
        // drainable.
        let sentinel = endpoint
            .requests()
            .try_recv()
            .expect("sentinel still queued")
            .expect("sentinel present");
        assert!(sentinel.method.is_shutdown());
    }

    #[test]
    fn control_sends_fail_after_shutdown() {
        let endpoint = ServerEndpoint::new();
        endpoint.shutdown();
        assert!(endpoint.sleep(Duration::from_millis(1), false).is_err());
        assert!(endpoint.filter(MethodTag::from_static("X::y()")).is_err());
        assert!(endpoint.clear_filter().is_err());
    }
}

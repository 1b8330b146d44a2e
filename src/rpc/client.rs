//! The caller-side stub.
//!
//! A [`RemoteClient`] turns a method invocation into the wire contract:
//! it allocates a request id, installs the waiter entry, ships the
//! request, runs a receiver task that feeds arriving responses into the
//! [`WaitingManager`](crate::WaitingManager), and parks until the
//! matching response — or the per-stub deadline — arrives.
//!
//! [`call`](RemoteClient::call) is async so a handler can invoke other
//! actors and park without blocking its thread; nested calls compose
//! because each uses a distinct id and its own parked task. A bare OS
//! thread hosts the triad by wrapping the call in
//! [`block_on`](crate::block_on), which installs a scheduler for the
//! duration of the call.
//!
//! Typed stubs generated by [`service!`](crate::service) wrap this type;
//! using it directly is only necessary for untyped plumbing.

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use bytes::Bytes;

use crate::codec::{JsonCodec, MessageCodec};
use crate::error::CallError;
use crate::rpc::endpoint::{ClientEndpoint, ServerEndpoint};
use crate::rpc::waiting::WaitingManager;
use crate::rpc::wire::{MethodTag, Request, Response, ResponseStatus};
use crate::sched;

/// How often the receiver task checks its terminate flag while idle.
const RESPONSE_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Untyped client stub bound to one actor.
///
/// Owns its response endpoint and waiting manager. Dropping the stub
/// closes the response channel; a still-parked caller then unblocks with
/// a timeout once its deadline passes.
pub struct RemoteClient<C: MessageCodec = JsonCodec> {
    server: ServerEndpoint,
    endpoint: ClientEndpoint,
    waiting: WaitingManager,
    timeout: Option<Duration>,
    codec: C,
}

impl RemoteClient<JsonCodec> {
    /// Connect a stub to an actor's endpoint, using the default codec and
    /// no call deadline.
    pub fn connect(server: &ServerEndpoint) -> Self {
        Self::with_codec(server, JsonCodec)
    }
}

impl<C: MessageCodec> RemoteClient<C> {
    /// Connect a stub with a custom payload codec.
    pub fn with_codec(server: &ServerEndpoint, codec: C) -> Self {
        Self {
            server: server.clone(),
            endpoint: ClientEndpoint::new(),
            waiting: WaitingManager::new(),
            timeout: None,
            codec,
        }
    }

    /// Bound every call made through this stub by `timeout`.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Remove the call deadline; calls wait indefinitely.
    #[must_use]
    pub fn untimed(mut self) -> Self {
        self.timeout = None;
        self
    }

    /// The codec used for argument and return payloads.
    pub fn codec(&self) -> &C {
        &self.codec
    }

    /// The stub's response-side endpoint.
    pub fn endpoint(&self) -> &ClientEndpoint {
        &self.endpoint
    }

    /// The stub's waiting manager.
    pub fn waiting(&self) -> &WaitingManager {
        &self.waiting
    }

    /// Invoke `method` with pre-encoded arguments and wait for the
    /// response payload.
    ///
    /// Must run under a scheduler: either inside an actor's handler, or
    /// under [`block_on`](crate::block_on) on a bare thread.
    ///
    /// # Errors
    ///
    /// [`CallError::Remote`] if the handler failed, the method was
    /// filtered, or the actor is gone; [`CallError::Timeout`] if the
    /// per-stub deadline elapsed first.
    pub async fn call(&self, method: MethodTag, args: Bytes) -> Result<Bytes, CallError> {
        let id = self.waiting.alloc_id();
        // The waiter entry goes in before the request is shipped, so the
        // response can never race its own waiter.
        self.waiting.register(id);
        let request = Request {
            reply_to: Some(self.endpoint.clone()),
            id,
            method,
            args,
        };
        if self.server.send_request(request).is_err() {
            self.waiting.discard(id);
            return Err(CallError::Remote(
                "request channel closed: actor is shut down".to_string(),
            ));
        }

        let terminate = Rc::new(Cell::new(false));
        {
            let responses = self.endpoint.responses().clone();
            let waiting = self.waiting.clone();
            let terminate = Rc::clone(&terminate);
            sched::spawn(async move {
                while !terminate.get() {
                    match responses.recv_timeout(RESPONSE_POLL_INTERVAL).await {
                        Ok(Some(response)) => waiting.deliver(response),
                        Ok(None) => {}
                        Err(_closed) => break,
                    }
                }
            });
        }

        let response = self.waiting.wait_response(id, self.timeout).await;
        terminate.set(true);
        interpret(response)
    }
}

impl<C: MessageCodec> Drop for RemoteClient<C> {
    fn drop(&mut self) {
        self.endpoint.close();
    }
}

impl<C: MessageCodec> std::fmt::Debug for RemoteClient<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteClient")
            .field("server", &self.server)
            .field("endpoint", &self.endpoint)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Map a wire response onto the caller-visible result.
fn interpret(response: Response) -> Result<Bytes, CallError> {
    match response.status {
        ResponseStatus::Success => Ok(response.data),
        ResponseStatus::Failed => Err(CallError::Remote(response.description().into_owned())),
        ResponseStatus::Timeout => Err(CallError::Timeout),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sched::block_on;

    #[test]
    fn call_fails_fast_when_actor_is_gone() {
        let server = ServerEndpoint::new();
        server.shutdown();
        let client = RemoteClient::connect(&server);

        let result = block_on(client.call(MethodTag::from_static("Svc::get()"), Bytes::new()));
        match result {
            Err(CallError::Remote(description)) => {
                assert!(description.contains("shut down"));
            }
            other => panic!("expected a remote failure, got {other:?}"),
        }
        // The failed send must not leak a waiter entry.
        assert!(!client.waiting().exists(1));
    }

    #[test]
    fn interpret_maps_statuses() {
        assert_eq!(
            interpret(Response::success(1, b"data".to_vec())),
            Ok(Bytes::from_static(b"data"))
        );
        assert_eq!(
            interpret(Response::failed(2, "broke")),
            Err(CallError::Remote("broke".to_string()))
        );
        assert_eq!(interpret(Response::timeout(3)), Err(CallError::Timeout));
    }

    #[test]
    fn timeout_bounds_a_call_with_no_server_loop() {
        // An endpoint nobody serves: the request is enqueued and never
        // answered, so the deadline must fire.
        let server = ServerEndpoint::new();
        let client = RemoteClient::connect(&server).with_timeout(Duration::from_millis(40));

        let started = std::time::Instant::now();
        let result = block_on(client.call(MethodTag::from_static("Svc::get()"), Bytes::new()));
        assert_eq!(result, Err(CallError::Timeout));
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(35));
        assert!(elapsed < Duration::from_millis(500));
    }
}

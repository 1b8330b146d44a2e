//! The per-actor server loop.
//!
//! [`spawn_actor`] gives each service instance its own OS thread. Inside,
//! a scheduler drives three long-lived tasks — one per inbound channel —
//! plus one short-lived dispatch task per request, so a slow handler never
//! blocks intake and concurrent requests interleave freely.
//!
//! The loop owns a small control state machine fed by the sleep and
//! filter channels:
//!
//! - while *sleeping* with `drop = false`, arriving requests are deferred
//!   until the window ends;
//! - while *sleeping* with `drop = true`, arriving requests are discarded
//!   without a response (the caller pays its timeout — outage simulation);
//! - a *filtered* method is answered immediately with a synthetic
//!   failure.
//!
//! Shutdown is observed either as the reserved sentinel or as the request
//! channel closing, whichever comes first; both stop dispatch. In-flight
//! handlers run to completion before the actor thread exits.

use std::cell::RefCell;
use std::rc::Rc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

use crate::codec::CodecError;
use crate::error::ChannelClosed;
use crate::rpc::endpoint::ServerEndpoint;
use crate::rpc::wire::{MethodTag, Request, Response};
use crate::sched;
use crate::sched::unwind::CatchUnwind;

/// How often a deferred dispatch re-checks whether the sleep window has
/// ended.
const DEFER_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Dispatch failures a service adapter can report.
///
/// Codec failures are answered to the caller; an unrecognized tag is a
/// programmer error (the client and server were generated from different
/// interfaces) and aborts the actor.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Argument decoding or return-value encoding failed.
    #[error("codec failure: {0}")]
    Codec(#[from] CodecError),

    /// The tag does not name any method of this service.
    #[error("unrecognized method tag '{0}'")]
    UnrecognizedMethod(MethodTag),
}

/// Bridge between the untyped wire contract and a typed service
/// implementation.
///
/// Implementations are generated by the [`service!`](crate::service)
/// macro: they decode the argument tuple, invoke the method, and encode
/// the return value (empty bytes for unit returns).
#[async_trait(?Send)]
pub trait ServiceDispatch: 'static {
    /// Invoke the method named by `method` with the encoded arguments,
    /// returning the encoded return value (empty for unit returns).
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Codec`] when a payload cannot be decoded
    /// or a return value cannot be encoded, and
    /// [`DispatchError::UnrecognizedMethod`] for an unknown tag.
    async fn dispatch(&self, method: &MethodTag, args: &[u8]) -> Result<Bytes, DispatchError>;
}

/// Control state owned by the server loop, mutated only by its own tasks.
#[derive(Default)]
struct ControlState {
    filter: Option<MethodTag>,
    sleep_until: Option<Instant>,
    drop_while_sleeping: bool,
}

impl ControlState {
    fn sleeping(&self) -> bool {
        self.sleep_until.is_some_and(|until| Instant::now() < until)
    }
}

/// Handle to a running actor: its endpoint plus the thread join handle.
///
/// Dropping the handle shuts the actor down and joins its thread.
pub struct ActorHandle {
    name: String,
    endpoint: ServerEndpoint,
    thread: Option<JoinHandle<()>>,
}

impl ActorHandle {
    /// The actor's addressable endpoint; clone it to hand out.
    pub fn endpoint(&self) -> &ServerEndpoint {
        &self.endpoint
    }

    /// The name given at spawn time.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Put the actor to sleep. See [`ServerEndpoint::sleep`].
    ///
    /// # Errors
    ///
    /// Returns [`ChannelClosed`] once the actor has shut down.
    pub fn sleep(&self, duration: Duration, drop_requests: bool) -> Result<(), ChannelClosed> {
        self.endpoint.sleep(duration, drop_requests)
    }

    /// Filter a method. See [`ServerEndpoint::filter`].
    ///
    /// # Errors
    ///
    /// Returns [`ChannelClosed`] once the actor has shut down.
    pub fn filter(&self, method: MethodTag) -> Result<(), ChannelClosed> {
        self.endpoint.filter(method)
    }

    /// Clear the method filter. See [`ServerEndpoint::clear_filter`].
    ///
    /// # Errors
    ///
    /// Returns [`ChannelClosed`] once the actor has shut down.
    pub fn clear_filter(&self) -> Result<(), ChannelClosed> {
        self.endpoint.clear_filter()
    }

    /// Terminate the actor. See [`ServerEndpoint::shutdown`].
    pub fn shutdown(&self) {
        self.endpoint.shutdown();
    }

    /// Wait for the actor thread to exit.
    ///
    /// Call [`shutdown`](Self::shutdown) first; a running actor does not
    /// exit on its own.
    ///
    /// # Errors
    ///
    /// Returns the panic payload if the actor thread aborted on an
    /// invariant violation.
    pub fn join(mut self) -> thread::Result<()> {
        match self.thread.take() {
            Some(thread) => thread.join(),
            None => Ok(()),
        }
    }
}

impl Drop for ActorHandle {
    fn drop(&mut self) {
        if let Some(thread) = self.thread.take() {
            self.endpoint.shutdown();
            let _ = thread.join();
        }
    }
}

impl std::fmt::Debug for ActorHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActorHandle")
            .field("name", &self.name)
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

/// Spawn a new actor.
///
/// Allocates an endpoint, starts a dedicated OS thread, constructs the
/// service inside that thread via `init`, and runs the server loop until
/// shutdown. The service itself never crosses a thread boundary, so it
/// may freely use `Rc`, `Cell`, and other single-threaded state.
///
/// # Errors
///
/// Returns the OS error if the thread cannot be spawned.
pub fn spawn_actor<D, F>(name: &str, init: F) -> std::io::Result<ActorHandle>
where
    D: ServiceDispatch,
    F: FnOnce() -> D + Send + 'static,
{
    let endpoint = ServerEndpoint::new();
    let loop_endpoint = endpoint.clone();
    let thread = thread::Builder::new()
        .name(format!("rockpool-{name}"))
        .spawn(move || {
            let service = Rc::new(init());
            tracing::debug!("actor thread started");
            sched::block_on(serve(loop_endpoint, service));
            tracing::debug!("actor thread exiting");
        })?;
    Ok(ActorHandle {
        name: name.to_string(),
        endpoint,
        thread: Some(thread),
    })
}

/// The actor's root task: control intake plus the request loop.
async fn serve<D: ServiceDispatch>(endpoint: ServerEndpoint, service: Rc<D>) {
    let control = Rc::new(RefCell::new(ControlState::default()));

    {
        let control = Rc::clone(&control);
        let sleeps = endpoint.sleeps().clone();
        sched::spawn(async move {
            while let Ok(cmd) = sleeps.recv().await {
                let millis = cmd.duration.as_millis() as u64;
                tracing::debug!(duration_ms = millis, drop = cmd.drop, "sleep window set");
                let mut state = control.borrow_mut();
                state.sleep_until = Some(Instant::now() + cmd.duration);
                state.drop_while_sleeping = cmd.drop;
            }
        });
    }

    {
        let control = Rc::clone(&control);
        let filters = endpoint.filters().clone();
        sched::spawn(async move {
            while let Ok(cmd) = filters.recv().await {
                match &cmd.method {
                    Some(tag) => tracing::debug!(method = %tag, "filter installed"),
                    None => tracing::debug!("filter cleared"),
                }
                control.borrow_mut().filter = cmd.method;
            }
        });
    }

    loop {
        let request = match endpoint.requests().recv().await {
            Ok(request) => request,
            // A bare close terminates the loop just like the sentinel, so
            // the request task can never block on an already-closed
            // channel.
            Err(ChannelClosed) => break,
        };
        if request.method.is_shutdown() {
            tracing::debug!("shutdown sentinel received");
            break;
        }

        let sleeping = control.borrow().sleeping();
        if !sleeping {
            let service = Rc::clone(&service);
            let control = Rc::clone(&control);
            sched::spawn(async move {
                handle_request(service, control, request).await;
            });
        } else if !control.borrow().drop_while_sleeping {
            let service = Rc::clone(&service);
            let control = Rc::clone(&control);
            sched::spawn(async move {
                while control.borrow().sleeping() {
                    sched::sleep(DEFER_POLL_INTERVAL).await;
                }
                handle_request(service, control, request).await;
            });
        } else {
            tracing::debug!(id = request.id, method = %request.method, "request dropped during sleep window");
        }
    }

    // Unblock the control tasks in case shutdown arrived as a bare
    // sentinel.
    endpoint.close();
}

/// Run one request to completion and send the response.
async fn handle_request<D: ServiceDispatch>(
    service: Rc<D>,
    control: Rc<RefCell<ControlState>>,
    request: Request,
) {
    let Request {
        reply_to,
        id,
        method,
        args,
    } = request;

    let filtered = control
        .borrow()
        .filter
        .as_ref()
        .is_some_and(|tag| *tag == method);

    let response = if filtered {
        Response::failed(id, format!("Filtered method '{}'", method.pretty()))
    } else {
        match CatchUnwind::new(service.dispatch(&method, &args)).await {
            Ok(Ok(data)) => Response::success(id, data),
            Ok(Err(DispatchError::UnrecognizedMethod(tag))) => {
                tracing::error!(method = %tag, "unrecognized method tag reached the server loop");
                panic!("unrecognized method tag '{tag}'");
            }
            Ok(Err(err)) => Response::failed(id, err.to_string()),
            Err(panic_message) => Response::failed(id, panic_message),
        }
    };

    match reply_to {
        Some(endpoint) => {
            if endpoint.send_response(response).is_err() {
                tracing::debug!(id, "reply channel closed; response discarded");
            }
        }
        None => {
            tracing::warn!(id, method = %method, "request without a reply endpoint; outcome discarded");
        }
    }
}

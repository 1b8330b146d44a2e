//! # Rockpool
//!
//! A local RPC harness for testing distributed services without a
//! network: describe a service by a typed interface, instantiate many
//! independent implementations as in-process actors, and invoke them as
//! if they were remote peers. A control plane lets tests force any actor
//! to sleep, drop traffic, or reject specific methods — simulating
//! latency, outage, and partial failure on a laptop.
//!
//! ## Architecture
//!
//! Two-layer scheduling:
//!
//! - **Across actors**: preemptive OS threads; each actor owns exactly
//!   one.
//! - **Within an actor**: cooperative tasks on a single-threaded
//!   scheduler; intake loops and handlers interleave only at `.await`
//!   points, so user implementations need no locks.
//!
//! | Component | Purpose |
//! |-----------|---------|
//! | [`Channel`] | Closable unbounded FIFO, usable from tasks and threads |
//! | [`sched`] | Per-thread cooperative scheduler with timers |
//! | [`ServerEndpoint`] / [`ClientEndpoint`] | Addressable channel bundles |
//! | [`spawn_actor`] | Per-actor thread, event loop, dispatch policy |
//! | [`WaitingManager`] | Request-id / response correlation with timeout |
//! | [`RemoteClient`] | Untyped caller-side stub |
//! | [`service!`] | Typed stubs and dispatch from a trait definition |
//!
//! ## Quick start
//!
//! ```rust
//! rockpool::service! {
//!     /// A counter every test seems to need eventually.
//!     pub trait Counter {
//!         async fn add(&self, amount: u64) -> u64;
//!     }
//!     pub client CounterClient;
//!     pub server CounterServer;
//!     pub methods CounterMethods;
//! }
//!
//! struct CounterImpl(std::cell::Cell<u64>);
//!
//! #[rockpool::async_trait(?Send)]
//! impl Counter for CounterImpl {
//!     async fn add(&self, amount: u64) -> u64 {
//!         self.0.set(self.0.get() + amount);
//!         self.0.get()
//!     }
//! }
//!
//! let actor = rockpool::spawn_actor("counter", || {
//!     CounterServer::new(CounterImpl(std::cell::Cell::new(0)))
//! })
//! .expect("spawn");
//! let client = CounterClient::connect(actor.endpoint());
//!
//! let total = rockpool::block_on(client.add(2)).expect("call");
//! assert_eq!(total, 2);
//!
//! actor.shutdown();
//! ```
//!
//! ## Fault injection
//!
//! The control surface lives on [`ActorHandle`] and [`ServerEndpoint`]
//! and is callable from any thread:
//!
//! - `sleep(duration, drop)` — the actor defers (`drop = false`) or
//!   discards (`drop = true`) requests arriving during the window.
//! - `filter(method)` / `clear_filter()` — answer one method with a
//!   synthetic failure.
//! - `shutdown()` — stop dispatch and let the actor thread exit.

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]

pub mod channel;
pub mod codec;
pub mod error;
pub mod rpc;
pub mod sched;

mod macros;

pub use bytes::Bytes;
pub use channel::Channel;
pub use codec::{CodecDirection, CodecError, JsonCodec, MessageCodec};
pub use error::{CallError, ChannelClosed};
pub use rpc::{
    ActorHandle, ClientEndpoint, DispatchError, FilterCmd, MethodTag, RemoteClient, Request,
    Response, ResponseStatus, ServerEndpoint, ServiceDispatch, SleepCmd, WaitingManager,
    spawn_actor,
};
pub use sched::{Condition, Elapsed, WaitOutcome, block_on, sleep, spawn, timeout, yield_now};

// Implementations of service traits need the same attribute the macro
// applies to the trait definition.
pub use async_trait::async_trait;

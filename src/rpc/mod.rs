//! Endpoint-addressed request/response messaging between in-process
//! actors.
//!
//! This module implements the harness's RPC layer on top of the
//! [`channel`](crate::channel) and [`sched`](crate::sched) substrate:
//!
//! - **wire**: the request/response records, method tags, and control
//!   commands
//! - **endpoint**: addressable channel bundles for servers and clients
//! - **server**: the per-actor event loop and dispatch policy
//! - **waiting**: the per-client response correlator
//! - **client**: the untyped caller-side stub
//!
//! Data flows client stub → server endpoint → server loop → handler task
//! → client endpoint → waiting manager → caller. Control commands (sleep,
//! filter) take their own channels and are ordered only among themselves.

mod client;
mod endpoint;
mod server;
mod waiting;
mod wire;

pub use client::RemoteClient;
pub use endpoint::{ClientEndpoint, ServerEndpoint};
pub use server::{ActorHandle, DispatchError, ServiceDispatch, spawn_actor};
pub use waiting::WaitingManager;
pub use wire::{FilterCmd, MethodTag, Request, Response, ResponseStatus, SleepCmd};

//! The request/response wire contract between client and server.
//!
//! The records never leave the process — they travel as plain values
//! over channels — but they round-trip faithfully: argument and return
//! payloads are opaque bytes produced by a
//! [`MessageCodec`](crate::MessageCodec), and failure descriptions
//! travel as UTF-8 bytes.

use std::borrow::Cow;
use std::time::Duration;

use bytes::Bytes;

use crate::rpc::endpoint::ClientEndpoint;

/// Opaque, deterministic identifier for one overload of one service
/// method.
///
/// Generated tags embed the trait name, the method name, and the
/// argument-type signature, so two overloads can never collide. Cloning is
/// cheap for the static tags the [`service!`](crate::service) macro
/// produces.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct MethodTag(Cow<'static, str>);

impl MethodTag {
    /// Reserved tag that tells a server loop to terminate.
    ///
    /// User tags always carry a `(signature)` suffix and cannot collide
    /// with it.
    pub const SHUTDOWN: MethodTag = MethodTag(Cow::Borrowed("shutdown@command"));

    /// Wrap a static tag string. Used by generated code.
    pub const fn from_static(tag: &'static str) -> Self {
        MethodTag(Cow::Borrowed(tag))
    }

    /// Wrap a runtime tag string.
    pub fn new(tag: impl Into<String>) -> Self {
        MethodTag(Cow::Owned(tag.into()))
    }

    /// The full tag, signature included.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Human-readable name without the signature suffix, e.g.
    /// `Counter::add` for the tag `Counter::add(u64,)`.
    pub fn pretty(&self) -> &str {
        match self.0.find('(') {
            Some(index) => &self.0[..index],
            None => &self.0,
        }
    }

    /// Whether this is the reserved shutdown tag.
    pub fn is_shutdown(&self) -> bool {
        *self == Self::SHUTDOWN
    }
}

impl std::fmt::Display for MethodTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::fmt::Debug for MethodTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MethodTag({})", self.0)
    }
}

/// Outcome of a request, as carried by a [`Response`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseStatus {
    /// The handler ran; `data` holds the encoded return value.
    Success,
    /// The handler failed or the method was filtered; `data` holds a
    /// human-readable description.
    Failed,
    /// Synthesized locally by the client when its deadline elapses; never
    /// transmitted.
    Timeout,
}

/// One in-flight invocation.
///
/// Created by a client per call, immutable in flight, consumed by exactly
/// one dispatch task on the server. The pair `(reply_to, id)` is globally
/// unique at any moment; `reply_to` is `None` only for the shutdown
/// sentinel, which never receives a response.
#[derive(Debug, Clone)]
pub struct Request {
    /// Where the response goes; the client listens on this endpoint.
    pub reply_to: Option<ClientEndpoint>,
    /// Correlation id, unique within the issuing client.
    pub id: u64,
    /// Which method to invoke.
    pub method: MethodTag,
    /// Encoded argument tuple.
    pub args: Bytes,
}

impl Request {
    /// The shutdown sentinel enqueued by the control surface.
    pub(crate) fn shutdown() -> Self {
        Request {
            reply_to: None,
            id: 0,
            method: MethodTag::SHUTDOWN,
            args: Bytes::new(),
        }
    }
}

/// The answer to one [`Request`], matched by id.
#[derive(Debug, Clone)]
pub struct Response {
    /// How the request ended.
    pub status: ResponseStatus,
    /// Correlation id copied from the request.
    pub id: u64,
    /// Encoded return value on success (empty for unit returns), or a
    /// UTF-8 failure description.
    pub data: Bytes,
}

impl Response {
    /// A successful response carrying the encoded return value.
    pub fn success(id: u64, data: impl Into<Bytes>) -> Self {
        Response {
            status: ResponseStatus::Success,
            id,
            data: data.into(),
        }
    }

    /// A failure response carrying a human-readable description.
    pub fn failed(id: u64, description: impl Into<String>) -> Self {
        Response {
            status: ResponseStatus::Failed,
            id,
            data: Bytes::from(description.into().into_bytes()),
        }
    }

    /// The locally synthesized timeout response.
    pub fn timeout(id: u64) -> Self {
        Response {
            status: ResponseStatus::Timeout,
            id,
            data: Bytes::new(),
        }
    }

    /// The failure description carried in `data`.
    pub fn description(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.data)
    }
}

/// Control command putting a server to sleep for a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SleepCmd {
    /// Length of the sleep window, starting when the command is
    /// processed.
    pub duration: Duration,
    /// `true` discards requests arriving during the window; `false`
    /// defers them until it ends.
    pub drop: bool,
}

/// Control command short-circuiting one method to a synthetic failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterCmd {
    /// The tag to reject; `None` clears the filter.
    pub method: Option<MethodTag>,
}

impl FilterCmd {
    /// Reject requests whose tag equals `method`.
    pub fn matching(method: MethodTag) -> Self {
        FilterCmd {
            method: Some(method),
        }
    }

    /// Clear the active filter.
    pub fn clear() -> Self {
        FilterCmd { method: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_pretty_strips_signature() {
        let tag = MethodTag::from_static("Counter::add(u64,)");
        assert_eq!(tag.pretty(), "Counter::add");
        assert_eq!(tag.as_str(), "Counter::add(u64,)");
    }

    #[test]
    fn shutdown_tag_is_reserved() {
        assert!(MethodTag::SHUTDOWN.is_shutdown());
        assert!(!MethodTag::from_static("Svc::shutdown()").is_shutdown());
        // A signature-bearing user tag can never equal the sentinel.
        assert_ne!(
            MethodTag::from_static("shutdown@command(())"),
            MethodTag::SHUTDOWN
        );
    }

    #[test]
    fn failed_response_preserves_description() {
        let response = Response::failed(9, "Filtered method 'Svc::get'");
        assert_eq!(response.status, ResponseStatus::Failed);
        assert_eq!(response.description(), "Filtered method 'Svc::get'");
    }

    #[test]
    fn timeout_response_is_empty() {
        let response = Response::timeout(3);
        assert_eq!(response.status, ResponseStatus::Timeout);
        assert!(response.data.is_empty());
    }

    #[test]
    fn runtime_and_static_tags_compare() {
        let fixed = MethodTag::from_static("Svc::get()");
        let runtime = MethodTag::new(String::from("Svc::get()"));
        assert_eq!(fixed, runtime);
    }
}

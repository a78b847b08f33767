//! Error types for rpc-pair.

use serde_json::Value;
use thiserror::Error;

/// Result type alias for rpc-pair operations.
pub type Result<T> = std::result::Result<T, RpcError>;

/// Errors that can occur while building or driving a [`crate::Pair`].
#[derive(Debug, Error)]
pub enum RpcError {
    /// `Pair::builder()` was never given a name.
    #[error("MissingName")]
    MissingName,

    /// `Pair::builder()` was never given an error sink.
    #[error("MissingErrorHandler")]
    MissingErrorHandler,

    /// A call or emit was attempted before `set_send` installed an outbound function.
    #[error("MissingSendFunction")]
    MissingSendFunction,

    /// The remote peer invoked a method name that was never `expose`d.
    #[error("NoSuchMethod: {method}")]
    NoSuchMethod { method: String, params: Vec<Value> },

    /// `callActor`/`getActorProperty` targeted a method the actor does not implement.
    #[error("ActorNoSuchMethod: {method}")]
    ActorNoSuchMethod {
        method: String,
        available: Vec<String>,
    },

    /// A remote `callActor`/`getActorProperty` referenced an id that never registered
    /// within `REGISTRATION_TIMEOUT`.
    #[error("ActorRegistrationTimeout: {id}")]
    ActorRegistrationTimeout { id: String },

    /// A call through a [`crate::RemoteActor`] did not receive a result in time.
    #[error("ActorCallTimeout: {id}.{method}")]
    ActorCallTimeout { id: String, method: String },

    /// The target actor was expired (disposed) before or during the call.
    #[error("ActorExpired: {id}")]
    ActorExpired { id: String },

    /// A write acknowledgement (the ack half of `call`/`emit`) did not arrive in time.
    #[error("TimeoutWaitingForWriteAck<id={id},type={kind},duration:{duration_ms}>")]
    TimeoutWaitingForWriteAck {
        id: String,
        kind: &'static str,
        duration_ms: u64,
    },

    /// A generic timeout not covered by a more specific variant above.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// A line read off a stream transport failed to parse as JSON.
    #[error("RpcStreamTransportJsonParseError: {0}")]
    StreamTransportJsonParseError(String),

    /// A `result` message carried neither `result` nor a well-formed `error`.
    #[error("invalid result")]
    InvalidResult,

    /// A `result` message arrived whose id matches no outstanding waiter —
    /// the waiter already timed out, or the peer echoed a stale/foreign id.
    #[error("no outstanding call/emit for id {id}")]
    UnmatchedResult { id: String },

    /// A hand-constructed `Message` carried an unrecognized discriminator.
    #[error("unknown message type: {0}")]
    UnknownMessageType(String),

    /// `exposeActor` was called twice for the same id without an intervening `expireActor`.
    #[error("duplicate actor id: {id}")]
    DuplicateActorId { id: String },

    /// `ActorRegistry::expose` was called twice on the same `Pair`.
    #[error("can't expose two registries on node")]
    RegistryAlreadyExposed,

    /// The remote side rejected a call with a non-error-shaped payload.
    #[error("RejectedWithNonError")]
    RejectedWithNonError,

    /// A fully reconstituted error received from the remote peer.
    #[error("{name}: {message}")]
    Remote {
        name: String,
        message: String,
        stack: Option<String>,
        extra: serde_json::Map<String, Value>,
    },

    /// The installed send function itself returned an error.
    #[error("send failed: {0}")]
    Send(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// I/O error from a concrete transport.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encode/decode error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Transport-level error not covered by a more specific variant.
    #[error("transport error: {0}")]
    Transport(String),
}

impl RpcError {
    /// True for [`RpcError::Remote`], mirroring the wire-level `remote: true` marker
    /// a JSON-boundary error carries once it has crossed the pair.
    pub fn is_remote(&self) -> bool {
        matches!(self, RpcError::Remote { .. })
    }
}

//! Wire message shapes and error normalization across the JSON boundary.

use crate::error::RpcError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A message exchanged between two pairs, tagged by an explicit `type` field
/// rather than inferred from which other fields happen to be present.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Message {
    Call(CallMessage),
    Notify(NotifyMessage),
    Result(ResultMessage),
}

impl Message {
    pub fn id(&self) -> &str {
        match self {
            Message::Call(m) => &m.id,
            Message::Notify(m) => &m.id,
            Message::Result(m) => &m.id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallMessage {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: Vec<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyMessage {
    pub id: String,
    pub event: String,
    #[serde(default)]
    pub data: Vec<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultMessage {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Carried as a raw `Value` rather than a typed `NormalizedError` so a
    /// payload that doesn't match the error shape (wrong field types, a
    /// bare string, etc.) still decodes — [`NormalizedError::from_wire`]
    /// is what distinguishes an absent/malformed error from a well-formed
    /// one, rather than rejecting the whole `result` frame at the codec
    /// layer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
}

/// An error normalized for transmission across the JSON boundary: `name`,
/// `message`, `stack`, plus every other enumerable field the source error
/// carried, preserved in `extra` rather than dropped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedError {
    pub name: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl NormalizedError {
    /// Builds a non-error fallback, used when a `result` message's `error`
    /// field is missing entirely or is not error-shaped.
    pub fn rejected_with_non_error() -> Self {
        NormalizedError {
            name: "Error".to_string(),
            message: "RejectedWithNonError".to_string(),
            stack: None,
            extra: serde_json::Map::new(),
        }
    }

    /// Interprets a `result` message's raw `error` payload: a well-formed
    /// `{name, message, ...}` value deserializes directly, anything else
    /// (a bare string, a number, an object missing `name`/`message`) falls
    /// back to [`NormalizedError::rejected_with_non_error`], copying the
    /// original value's own fields onto it if it was at least an object.
    pub fn from_wire(value: Value) -> Self {
        match serde_json::from_value::<NormalizedError>(value.clone()) {
            Ok(err) => err,
            Err(_) => {
                let mut err = NormalizedError::rejected_with_non_error();
                if let Value::Object(fields) = value {
                    err.extra = fields;
                }
                err
            }
        }
    }

    pub fn from_rpc_error(err: &RpcError) -> Self {
        match err {
            RpcError::Remote {
                name,
                message,
                stack,
                extra,
            } => NormalizedError {
                name: name.clone(),
                message: message.clone(),
                stack: stack.clone(),
                extra: extra.clone(),
            },
            other => NormalizedError {
                name: variant_name(other).to_string(),
                message: other.to_string(),
                stack: None,
                extra: serde_json::Map::new(),
            },
        }
    }

    /// Reinflates a wire error back into an `RpcError::Remote`, the Rust
    /// analogue of "a native error carrying a `remote = true` marker" — Rust
    /// errors are typed, so the marker is a distinct enum variant rather than
    /// a duck-typed property.
    pub fn into_rpc_error(self) -> RpcError {
        RpcError::Remote {
            name: self.name,
            message: self.message,
            stack: self.stack,
            extra: self.extra,
        }
    }
}

fn variant_name(err: &RpcError) -> &'static str {
    match err {
        RpcError::MissingName => "MissingName",
        RpcError::MissingErrorHandler => "MissingErrorHandler",
        RpcError::MissingSendFunction => "MissingSendFunction",
        RpcError::NoSuchMethod { .. } => "NoSuchMethod",
        RpcError::ActorNoSuchMethod { .. } => "ActorNoSuchMethod",
        RpcError::ActorRegistrationTimeout { .. } => "ActorRegistrationTimeout",
        RpcError::ActorCallTimeout { .. } => "ActorCallTimeout",
        RpcError::ActorExpired { .. } => "ActorExpired",
        RpcError::TimeoutWaitingForWriteAck { .. } => "TimeoutWaitingForWriteAck",
        RpcError::Timeout(_) => "Timeout",
        RpcError::StreamTransportJsonParseError(_) => "RpcStreamTransportJsonParseError",
        RpcError::InvalidResult => "InvalidResult",
        RpcError::UnmatchedResult { .. } => "UnmatchedResult",
        RpcError::UnknownMessageType(_) => "UnknownMessageType",
        RpcError::DuplicateActorId { .. } => "DuplicateActorId",
        RpcError::RegistryAlreadyExposed => "RegistryAlreadyExposed",
        RpcError::RejectedWithNonError => "Error",
        RpcError::Remote { .. } => unreachable!("handled above"),
        RpcError::Send(_) => "SendError",
        RpcError::Io(_) => "IoError",
        RpcError::Json(_) => "JsonError",
        RpcError::Transport(_) => "TransportError",
    }
}

/// Builds the `result` message carrying a successful value.
pub fn ok_result(id: impl Into<String>, value: Value) -> Message {
    Message::Result(ResultMessage {
        id: id.into(),
        result: Some(value),
        error: None,
    })
}

/// Builds the `result` message carrying a normalized error.
pub fn err_result(id: impl Into<String>, error: &RpcError) -> Message {
    let normalized = NormalizedError::from_rpc_error(error);
    let value = serde_json::to_value(normalized).unwrap_or_else(|_| {
        serde_json::to_value(NormalizedError::rejected_with_non_error())
            .expect("rejected_with_non_error always serializes")
    });
    Message::Result(ResultMessage {
        id: id.into(),
        result: None,
        error: Some(value),
    })
}

//! Wire contracts exchanged between clients and the server.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Header carrying the realtime connection id on RPC calls.
pub const CONNECTION_ID_HEADER: &str = "x-rpc-connection-id";

/// Route signature clients use to open a push channel on templated routes.
pub const CHANNEL_SIGNATURE: &str = "__SSE__";

/// Opaque token correlating RPC calls with a previously opened push channel.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(String);

impl ConnectionId {
    /// Generate a fresh random (v4, 128-bit) identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Borrow the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ConnectionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for ConnectionId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single RPC invocation: where to route it and what to pass.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RequestContract {
    namespace: Vec<String>,
    method: String,
    #[serde(default)]
    params: Vec<Value>,
}

impl RequestContract {
    /// Create a request for `method` under `namespace`.
    pub fn new(
        namespace: impl IntoIterator<Item = impl Into<String>>,
        method: impl Into<String>,
        params: Vec<Value>,
    ) -> Self {
        Self {
            namespace: namespace.into_iter().map(Into::into).collect(),
            method: method.into(),
            params,
        }
    }

    /// Build a request from a full call path; the last segment is the method.
    ///
    /// Returns `None` for an empty path.
    pub fn from_path<S: AsRef<str>>(path: &[S], params: Vec<Value>) -> Option<Self> {
        let (method, namespace) = path.split_last()?;
        Some(Self {
            namespace: namespace.iter().map(|s| s.as_ref().to_owned()).collect(),
            method: method.as_ref().to_owned(),
            params,
        })
    }

    /// Namespace segments leading to the method's controller.
    pub fn namespace(&self) -> &[String] {
        &self.namespace
    }

    /// Method name resolved on the final namespace node.
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Positional parameters.
    pub fn params(&self) -> &[Value] {
        &self.params
    }

    /// Dot-joined `namespace + method`, as used in templated routes.
    pub fn signature(&self) -> String {
        event_key(&self.namespace, &self.method)
    }

    /// Split into `(namespace, method, params)`.
    pub fn into_parts(self) -> (Vec<String>, String, Vec<Value>) {
        (self.namespace, self.method, self.params)
    }
}

/// Structured error payload inside a failed `ResponseContract`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Machine-readable reason (e.g. `ROUTING`).
    pub reason: String,
    /// Human-readable message.
    pub message: String,
    /// Server-side diagnostic trace, when exposed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callstack: Option<String>,
}

/// Outcome of exactly one RPC call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponseContract {
    /// The method returned a value.
    Result {
        /// Returned value.
        result: Value,
    },
    /// The call failed.
    Error {
        /// Failure details.
        error: ErrorBody,
    },
}

impl ResponseContract {
    /// Build a success response.
    pub fn success(result: Value) -> Self {
        Self::Result { result }
    }

    /// Build an error response.
    pub fn failure(error: ErrorBody) -> Self {
        Self::Error { error }
    }

    /// Whether this response carries a result.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Result { .. })
    }

    /// Borrow the error body, if any.
    pub fn error(&self) -> Option<&ErrorBody> {
        match self {
            Self::Error { error } => Some(error),
            Self::Result { .. } => None,
        }
    }

    /// Convert into a standard `Result`.
    pub fn into_result(self) -> Result<Value, ErrorBody> {
        match self {
            Self::Result { result } => Ok(result),
            Self::Error { error } => Err(error),
        }
    }
}

/// Payload of an `emit` frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EmitEvent {
    /// Namespace of the controller that emitted the event.
    pub namespace: Vec<String>,
    /// Event name.
    pub name: String,
    /// Event payload.
    pub data: Value,
}

impl EmitEvent {
    /// Fully-qualified listener key (`namespace.name`).
    pub fn key(&self) -> String {
        event_key(&self.namespace, &self.name)
    }
}

/// A frame sent over a push channel.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum EventContract {
    /// First frame on every channel.
    Connected {
        /// Id to attach to subsequent RPC calls.
        connection_id: ConnectionId,
    },
    /// An event pushed by handler code.
    Emit {
        /// Event body.
        event: EmitEvent,
    },
}

impl EventContract {
    /// Build an `emit` frame.
    pub fn emit(namespace: Vec<String>, name: impl Into<String>, data: Value) -> Self {
        Self::Emit {
            event: EmitEvent {
                namespace,
                name: name.into(),
                data,
            },
        }
    }
}

/// Join namespace segments and a trailing name with `.`.
pub fn event_key<S: AsRef<str>>(namespace: &[S], name: &str) -> String {
    let mut key = String::new();
    for segment in namespace {
        key.push_str(segment.as_ref());
        key.push('.');
    }
    key.push_str(name);
    key
}

//! Client error types.

use arbor_core::{ErrorBody, RouteParseError};

/// An error reported by the server for one call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{reason}: {message}")]
pub struct RemoteError {
    /// Machine-readable reason (e.g. `ROUTING`).
    pub reason: String,
    /// Human-readable message.
    pub message: String,
    /// Server-side trace, when the server exposes it.
    pub callstack: Option<String>,
}

impl From<ErrorBody> for RemoteError {
    fn from(body: ErrorBody) -> Self {
        Self {
            reason: body.reason,
            message: body.message,
            callstack: body.callstack,
        }
    }
}

/// Errors surfaced to client code.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// A call was made without naming a method.
    #[error("call path is empty")]
    EmptyPath,

    /// The server answered with an error response.
    #[error(transparent)]
    Rpc(#[from] RemoteError),

    /// The request or channel could not be carried.
    #[error("transport error: {0}")]
    Transport(String),

    /// The result did not deserialize into the requested type.
    #[error("failed to decode result: {0}")]
    Decode(#[from] serde_json::Error),

    /// The server sent something that is not a valid contract.
    #[error("broken contract: {0}")]
    BrokenContract(String),

    /// The route template is invalid.
    #[error(transparent)]
    RouteParse(#[from] RouteParseError),

    /// No realtime channel has been opened.
    #[error("realtime channel is not connected")]
    NotConnected,

    /// A realtime channel is already open on this client.
    #[error("realtime channel is already connected")]
    AlreadyConnected,

    /// The realtime channel has closed.
    #[error("realtime channel is closed")]
    ChannelClosed,

    /// The channel opened but the `connected` frame never arrived.
    #[error("realtime handshake failed: {0}")]
    Handshake(String),
}

impl ClientError {
    /// Reason reported by the server, for `Rpc` errors.
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Rpc(remote) => Some(&remote.reason),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_error_from_body() {
        let remote: RemoteError = ErrorBody {
            reason: "ROUTING".into(),
            message: "no such path".into(),
            callstack: Some("trace".into()),
        }
        .into();
        assert_eq!(remote.reason, "ROUTING");
        assert_eq!(remote.to_string(), "ROUTING: no such path");
        assert_eq!(remote.callstack.as_deref(), Some("trace"));
    }

    #[test]
    fn reason_only_for_rpc() {
        let err = ClientError::Rpc(RemoteError {
            reason: "NAME_TAKEN".into(),
            message: "taken".into(),
            callstack: None,
        });
        assert_eq!(err.reason(), Some("NAME_TAKEN"));
        assert_eq!(ClientError::EmptyPath.reason(), None);
    }

    #[test]
    fn display_messages() {
        assert_eq!(ClientError::NotConnected.to_string(), "realtime channel is not connected");
        assert_eq!(
            ClientError::Handshake("eof".into()).to_string(),
            "realtime handshake failed: eof"
        );
    }
}

//! RPC error reasons and error types.

use crate::contracts::ErrorBody;

// ── Reason constants ────────────────────────────────────────────────

/// Namespace or method could not be resolved.
pub const ROUTING: &str = "ROUTING";
/// Positional parameter missing or of the wrong type.
pub const INVALID_PARAMS: &str = "INVALID_PARAMS";
/// Unclassified failure raised inside a handler.
pub const UNKNOWN: &str = "UNKNOWN";
/// Payload did not match the wire contract.
pub const BROKEN_CONTRACT: &str = "BROKEN_CONTRACT";
/// Handler asked for a realtime channel the caller never opened.
pub const NO_REALTIME_CONNECTION: &str = "NO_REALTIME_CONNECTION";
/// Event could not be delivered to its channel.
pub const EMIT_FAILED: &str = "EMIT_FAILED";
/// Handler exceeded its time budget.
pub const TIMEOUT: &str = "TIMEOUT";

/// Error produced while resolving or executing an RPC call.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    /// The request named a path that does not exist in the controller tree.
    #[error("Invalid route supplied from client to {path}. Likely a mismatch between api definitions")]
    Routing {
        /// Dot-joined path as requested.
        path: String,
    },

    /// Application-defined failure.
    #[error("{message}")]
    Handler {
        /// Machine-readable reason chosen by the handler.
        reason: String,
        /// Human-readable message.
        message: String,
        /// Optional diagnostic trace.
        callstack: Option<String>,
    },

    /// A positional parameter is missing or mistyped.
    #[error("{message}")]
    InvalidParams {
        /// What is wrong.
        message: String,
    },

    /// Anything else.
    #[error("{message}")]
    Unknown {
        /// Description.
        message: String,
        /// Optional diagnostic trace.
        callstack: Option<String>,
    },

    /// Malformed request rejected before dispatch.
    #[error("{message}")]
    BrokenContract {
        /// Which part of the contract was violated.
        message: String,
    },

    /// `realtime()` was requested without a bound channel.
    #[error("No realtime connection for this client")]
    NoRealtimeConnection,

    /// The event could not be queued on the channel.
    #[error("{message}")]
    EmitFailure {
        /// Description.
        message: String,
    },

    /// The handler did not finish in time.
    #[error("Handler for '{path}' timed out after {secs}s")]
    Timeout {
        /// Dot-joined path of the handler.
        path: String,
        /// Configured budget in seconds.
        secs: u64,
    },
}

impl RpcError {
    /// Application-defined error with a custom reason.
    pub fn handler(reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Handler {
            reason: reason.into(),
            message: message.into(),
            callstack: None,
        }
    }

    /// Shorthand for [`RpcError::InvalidParams`].
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::InvalidParams {
            message: message.into(),
        }
    }

    /// Shorthand for [`RpcError::Unknown`] without a callstack.
    pub fn unknown(message: impl Into<String>) -> Self {
        Self::Unknown {
            message: message.into(),
            callstack: None,
        }
    }

    /// Shorthand for [`RpcError::BrokenContract`].
    pub fn broken_contract(message: impl Into<String>) -> Self {
        Self::BrokenContract {
            message: message.into(),
        }
    }

    /// Attach a callstack. Only `Handler` and `Unknown` carry one.
    #[must_use]
    pub fn with_callstack(mut self, trace: impl Into<String>) -> Self {
        match &mut self {
            Self::Handler { callstack, .. } | Self::Unknown { callstack, .. } => {
                *callstack = Some(trace.into());
            }
            _ => {}
        }
        self
    }

    /// Machine-readable reason for this variant.
    pub fn reason(&self) -> &str {
        match self {
            Self::Routing { .. } => ROUTING,
            Self::Handler { reason, .. } => reason,
            Self::InvalidParams { .. } => INVALID_PARAMS,
            Self::Unknown { .. } => UNKNOWN,
            Self::BrokenContract { .. } => BROKEN_CONTRACT,
            Self::NoRealtimeConnection => NO_REALTIME_CONNECTION,
            Self::EmitFailure { .. } => EMIT_FAILED,
            Self::Timeout { .. } => TIMEOUT,
        }
    }

    /// Diagnostic trace, if one was captured.
    pub fn callstack(&self) -> Option<&str> {
        match self {
            Self::Handler { callstack, .. } | Self::Unknown { callstack, .. } => {
                callstack.as_deref()
            }
            _ => None,
        }
    }

    /// Convert to the wire-format error body.
    pub fn to_error_body(&self) -> ErrorBody {
        ErrorBody {
            reason: self.reason().to_owned(),
            message: self.to_string(),
            callstack: self.callstack().map(str::to_owned),
        }
    }
}

impl From<anyhow::Error> for RpcError {
    fn from(err: anyhow::Error) -> Self {
        Self::Unknown {
            message: err.to_string(),
            callstack: Some(format!("{err:?}")),
        }
    }
}

impl From<serde_json::Error> for RpcError {
    fn from(err: serde_json::Error) -> Self {
        Self::unknown(err.to_string())
    }
}

/// A route template that cannot be used to address a server.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid route '{route}': {detail}")]
pub struct RouteParseError {
    /// The rejected template.
    pub route: String,
    /// Why it was rejected.
    pub detail: String,
}

impl RouteParseError {
    pub(crate) fn new(route: &str, detail: impl Into<String>) -> Self {
        Self {
            route: route.to_owned(),
            detail: detail.into(),
        }
    }
}

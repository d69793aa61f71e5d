//! Per-call context handed to every method handler.

use std::sync::Arc;

use arbor_core::{ConnectionId, RpcError};

use crate::emitter::RealtimeEmitter;

/// Facts about the call currently being handled.
#[derive(Clone, Debug)]
pub struct ClientRequest {
    namespace: Vec<String>,
    method: String,
    emitter: Option<RealtimeEmitter>,
}

impl ClientRequest {
    /// Describe a call to `method` under `namespace`, optionally bound to a channel.
    pub fn new(namespace: Vec<String>, method: String, emitter: Option<RealtimeEmitter>) -> Self {
        Self {
            namespace,
            method,
            emitter,
        }
    }

    /// Namespace of the controller handling the call.
    pub fn namespace(&self) -> &[String] {
        &self.namespace
    }

    /// Method being invoked.
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Emitter for the caller's push channel.
    ///
    /// Fails with [`RpcError::NoRealtimeConnection`] when the call did not
    /// carry a connection id for a live channel.
    pub fn realtime(&self) -> Result<&RealtimeEmitter, RpcError> {
        self.emitter.as_ref().ok_or(RpcError::NoRealtimeConnection)
    }

    /// Whether a push channel is bound to this call.
    pub fn has_realtime(&self) -> bool {
        self.emitter.is_some()
    }

    /// Connection id of the bound channel, if any.
    pub fn connection_id(&self) -> Option<&ConnectionId> {
        self.emitter.as_ref().map(RealtimeEmitter::connection_id)
    }
}

/// Shared application state plus the per-call [`ClientRequest`].
///
/// Sub-controllers receive the same `app` reference; nothing is inherited
/// implicitly.
#[derive(Debug)]
pub struct CallContext<C> {
    app: Arc<C>,
    request: ClientRequest,
}

impl<C> Clone for CallContext<C> {
    fn clone(&self) -> Self {
        Self {
            app: Arc::clone(&self.app),
            request: self.request.clone(),
        }
    }
}

impl<C> CallContext<C> {
    /// Bundle application state with a call.
    pub fn new(app: Arc<C>, request: ClientRequest) -> Self {
        Self { app, request }
    }

    /// Application state.
    pub fn app(&self) -> &C {
        &self.app
    }

    /// Owned handle on the application state, for spawned tasks.
    pub fn app_arc(&self) -> Arc<C> {
        Arc::clone(&self.app)
    }

    /// The call being handled.
    pub fn request(&self) -> &ClientRequest {
        &self.request
    }

    /// Shorthand for `self.request().realtime()`.
    pub fn realtime(&self) -> Result<&RealtimeEmitter, RpcError> {
        self.request.realtime()
    }
}

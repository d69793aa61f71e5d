//! Request dispatch: resolve, invoke, classify.
//!
//! This is the single boundary where handler outcomes (values, errors,
//! panics, timeouts) become a [`ResponseContract`].

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use arbor_core::{Params, RequestContract, ResponseContract, RpcError};
use futures::FutureExt;
use metrics::{counter, histogram};
use tracing::{debug, error, warn};

use crate::context::{CallContext, ClientRequest};
use crate::controller::ControllerTree;
use crate::emitter::RealtimeEmitter;
use crate::registry::ConnectionEntry;

/// Calls slower than this are logged at warn.
const SLOW_CALL_THRESHOLD: Duration = Duration::from_secs(5);

/// Routes requests through a controller tree.
pub struct Dispatcher<C> {
    tree: Arc<ControllerTree<C>>,
    app: Arc<C>,
    handler_timeout: Duration,
    expose_callstack: bool,
}

impl<C> Clone for Dispatcher<C> {
    fn clone(&self) -> Self {
        Self {
            tree: Arc::clone(&self.tree),
            app: Arc::clone(&self.app),
            handler_timeout: self.handler_timeout,
            expose_callstack: self.expose_callstack,
        }
    }
}

impl<C: Send + Sync + 'static> Dispatcher<C> {
    /// Create a dispatcher with the default 60s handler timeout.
    pub fn new(tree: Arc<ControllerTree<C>>, app: Arc<C>) -> Self {
        Self {
            tree,
            app,
            handler_timeout: Duration::from_secs(60),
            expose_callstack: true,
        }
    }

    /// Override the per-call timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.handler_timeout = timeout;
        self
    }

    /// Whether error responses keep their `callstack`.
    #[must_use]
    pub fn with_callstack(mut self, expose: bool) -> Self {
        self.expose_callstack = expose;
        self
    }

    /// The controller tree being served.
    pub fn tree(&self) -> &ControllerTree<C> {
        &self.tree
    }

    /// Dispatch one request. Always produces exactly one response.
    ///
    /// `connection` is the caller's live push channel, if the call carried a
    /// known connection id.
    pub async fn dispatch(
        &self,
        request: RequestContract,
        connection: Option<&Arc<ConnectionEntry>>,
    ) -> ResponseContract {
        let path = request.signature();
        counter!("rpc_requests_total", "path" => path.clone()).increment(1);
        debug!(path, realtime = connection.is_some(), "dispatching");

        let start = Instant::now();
        let outcome = self.invoke(request, connection, &path).await;
        let duration = start.elapsed();

        histogram!("rpc_request_duration_seconds", "path" => path.clone())
            .record(duration.as_secs_f64());
        if duration >= SLOW_CALL_THRESHOLD {
            warn!(
                path,
                duration_secs = duration.as_secs_f64(),
                "slow RPC request"
            );
        }

        match outcome {
            Ok(value) => ResponseContract::success(value),
            Err(err) => {
                counter!("rpc_errors_total", "path" => path.clone(), "reason" => err.reason().to_owned())
                    .increment(1);
                let mut body = err.to_error_body();
                if !self.expose_callstack {
                    body.callstack = None;
                }
                ResponseContract::failure(body)
            }
        }
    }

    async fn invoke(
        &self,
        request: RequestContract,
        connection: Option<&Arc<ConnectionEntry>>,
        path: &str,
    ) -> Result<serde_json::Value, RpcError> {
        let (namespace, method, params) = request.into_parts();

        let handler = match self.tree.resolve(&namespace, &method) {
            Ok(handler) => Arc::clone(handler),
            Err(err) => {
                warn!(path, "no route for request");
                return Err(err);
            }
        };

        let emitter = connection.map(|entry| RealtimeEmitter::new(namespace.clone(), entry));
        let ctx = CallContext::new(
            Arc::clone(&self.app),
            ClientRequest::new(namespace, method, emitter),
        );

        let call = AssertUnwindSafe(handler.handle(Params::new(params), ctx)).catch_unwind();
        match tokio::time::timeout(self.handler_timeout, call).await {
            Ok(Ok(result)) => result,
            Ok(Err(panic)) => {
                let message = panic_message(panic.as_ref());
                error!(path, panic = %message, "handler panicked");
                Err(RpcError::unknown(format!("Handler panicked: {message}")))
            }
            Err(_elapsed) => {
                error!(path, timeout = ?self.handler_timeout, "handler timed out");
                Err(RpcError::Timeout {
                    path: path.to_owned(),
                    secs: self.handler_timeout.as_secs(),
                })
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

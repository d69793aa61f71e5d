//! `RpcServer`: axum HTTP + SSE server around a controller tree.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use arbor_core::{ConnectionId, EventContract, RequestContract, ResponseContract};
use axum::Router;
use axum::routing::get;
use futures::Stream;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::channel::{self, OpenChannel};
use crate::config::{ConfigError, ServerConfig};
use crate::controller::ControllerTree;
use crate::dispatch::Dispatcher;
use crate::http::{self, AppState};
use crate::registry::ConnectionRegistry;
use crate::shutdown::StopSignal;

/// An Arbor RPC server.
pub struct RpcServer<C> {
    config: ServerConfig,
    state: Arc<AppState<C>>,
    stop: StopSignal,
}

impl<C: Send + Sync + 'static> RpcServer<C> {
    /// Create a server for `tree`, sharing `app` with every handler.
    ///
    /// Fails if `config` does not pass [`ServerConfig::validate`]; a bad
    /// `base_path` would otherwise only surface when routes are built.
    pub fn new(
        config: ServerConfig,
        tree: ControllerTree<C>,
        app: Arc<C>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let stop = StopSignal::new();
        let dispatcher = Dispatcher::new(Arc::new(tree), app)
            .with_timeout(Duration::from_secs(config.handler_timeout_secs))
            .with_callstack(config.expose_callstack);
        let state = Arc::new(AppState {
            dispatcher,
            registry: ConnectionRegistry::new(config.channel_capacity),
            shutdown: stop.subscribe(),
            start_time: Instant::now(),
            keep_alive: Duration::from_secs(config.keep_alive_secs),
        });
        Ok(Self {
            config,
            state,
            stop,
        })
    }

    /// Build the axum router with all routes.
    pub fn router(&self) -> Router {
        let base = self.config.base_path.as_str();
        let templated = format!("{base}/{{signature}}");

        Router::new()
            .route("/health", get(http::health::<C>))
            .route(
                base,
                get(http::channel_open::<C>)
                    .put(http::rpc_call::<C>)
                    .post(http::rpc_call::<C>),
            )
            .route(
                &templated,
                get(http::channel_open_signature::<C>)
                    .put(http::rpc_call_signature::<C>)
                    .post(http::rpc_call_signature::<C>),
            )
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
            .with_state(Arc::clone(&self.state))
    }

    /// Bind the configured address and serve in the background.
    pub async fn start(&self) -> Result<ServerHandle, std::io::Error> {
        let listener = TcpListener::bind(self.config.bind_addr()).await?;
        self.serve(listener)
    }

    /// Serve on an already-bound listener in the background.
    pub fn serve(&self, listener: TcpListener) -> Result<ServerHandle, std::io::Error> {
        let addr = listener.local_addr()?;
        let router = self.router();
        let token = self.stop.subscribe();

        info!(%addr, base_path = %self.config.base_path, "RPC server started");

        let task = tokio::spawn(async move {
            let result = axum::serve(listener, router)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await;
            if let Err(err) = result {
                warn!(error = %err, "RPC server stopped with error");
            }
        });

        Ok(ServerHandle {
            addr,
            task,
            stop: self.stop.clone(),
            registry: self.state.registry.clone(),
        })
    }

    /// Dispatch a request in-process, as if it arrived over HTTP.
    pub async fn call(
        &self,
        request: RequestContract,
        connection_id: Option<&ConnectionId>,
    ) -> ResponseContract {
        let connection = connection_id.and_then(|id| self.state.registry.lookup(id));
        self.state
            .dispatcher
            .dispatch(request, connection.as_ref())
            .await
    }

    /// Open a push channel in-process.
    pub fn open_channel(&self) -> OpenChannel<impl Stream<Item = EventContract> + Send + 'static> {
        channel::open(&self.state.registry, self.state.shutdown.clone())
    }

    /// Open push channels.
    pub fn registry(&self) -> &ConnectionRegistry {
        &self.state.registry
    }

    /// Signal shared by the listener and every open channel.
    pub fn stop_signal(&self) -> &StopSignal {
        &self.stop
    }

    /// Server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Every callable dot-joined path.
    pub fn paths(&self) -> Vec<String> {
        self.state.dispatcher.tree().paths()
    }
}

/// Handle on a running server.
pub struct ServerHandle {
    addr: SocketAddr,
    task: JoinHandle<()>,
    stop: StopSignal,
    registry: ConnectionRegistry,
}

impl ServerHandle {
    /// Address the server is bound to.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Port the server is bound to.
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// `http://<addr>`
    pub fn origin(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Stop accepting requests, end every channel, and wait for the listener.
    pub async fn shutdown(self, timeout: Option<Duration>) {
        self.registry.close_all();
        let drained = self.stop.stop_and_join(self.task, timeout).await;
        info!(addr = %self.addr, drained, "RPC server stopped");
    }
}

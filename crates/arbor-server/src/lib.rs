//! # arbor-server
//!
//! Server half of Arbor RPC.
//!
//! - Controller tree built once with [`ControllerBuilder`], dispatched by [`Dispatcher`]
//! - Push channel registry with scoped cleanup ([`ConnectionRegistry`], [`ChannelGuard`])
//! - Per-call [`RealtimeEmitter`] reached through [`ClientRequest::realtime`]
//! - axum binding: RPC over `PUT`/`POST`, channels over SSE, `/health`
//! - Configuration, tracing setup, and graceful shutdown

#![deny(unsafe_code)]

pub mod channel;
pub mod config;
pub mod context;
pub mod controller;
pub mod dispatch;
pub mod emitter;
pub mod health;
pub mod http;
pub mod registry;
pub mod server;
pub mod shutdown;
pub mod telemetry;

pub use config::{ConfigError, ServerConfig, load_config};
pub use context::{CallContext, ClientRequest};
pub use controller::{ControllerBuilder, ControllerTree, MethodHandler};
pub use dispatch::Dispatcher;
pub use emitter::RealtimeEmitter;
pub use registry::{ChannelGuard, ConnectionEntry, ConnectionRegistry, Registration};
pub use server::{RpcServer, ServerHandle};
pub use shutdown::StopSignal;

//! # arbor-chat
//!
//! A chat room on Arbor RPC: members join over a push channel, messages fan
//! out as `chat.user_message`, and a member whose channel closes is removed
//! with a single `chat.client_removed` to the rest.

#![deny(unsafe_code)]

pub mod controllers;
pub mod room;

use std::sync::Arc;

use arbor_server::{ConfigError, RpcServer, ServerConfig};

pub use controllers::controllers;
pub use room::{ChatMessage, ChatRoom, User};

/// Server hosting a fresh, empty room.
pub fn build_server(config: ServerConfig) -> Result<RpcServer<ChatRoom>, ConfigError> {
    RpcServer::new(config, controllers(), Arc::new(ChatRoom::new()))
}

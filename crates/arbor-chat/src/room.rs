//! Chat room state shared by every call.

use arbor_core::{ConnectionId, RpcError};
use arbor_server::RealtimeEmitter;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Another member already uses the requested name.
pub const NAME_TAKEN: &str = "NAME_TAKEN";
/// The calling channel has already joined.
pub const ALREADY_JOINED: &str = "ALREADY_JOINED";
/// The calling channel has not joined.
pub const NOT_JOINED: &str = "NOT_JOINED";

/// Event sent to every member when someone joins.
pub const CLIENT_ADDED: &str = "client_added";
/// Event sent to remaining members when someone's channel closes.
pub const CLIENT_REMOVED: &str = "client_removed";
/// Event carrying a chat message.
pub const USER_MESSAGE: &str = "user_message";

/// A room member as other members see it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Display name, unique within the room.
    pub username: String,
    /// When the member joined.
    pub joined_at: DateTime<Utc>,
}

/// Payload of [`USER_MESSAGE`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Sender.
    pub user: User,
    /// Message text as sent.
    pub message: String,
}

struct Member {
    user: User,
    emitter: RealtimeEmitter,
}

/// Members keyed by their push channel.
#[derive(Default)]
pub struct ChatRoom {
    members: Mutex<Vec<Member>>,
}

impl ChatRoom {
    /// Empty room.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the member behind `emitter` as `username`.
    pub fn join(&self, username: &str, emitter: RealtimeEmitter) -> Result<User, RpcError> {
        let username = username.trim();
        if username.is_empty() {
            return Err(RpcError::invalid_params("username must not be empty"));
        }

        let mut members = self.members.lock();
        if members.iter().any(|m| m.emitter.connection_id() == emitter.connection_id()) {
            return Err(RpcError::handler(ALREADY_JOINED, "This connection has already joined"));
        }
        if members.iter().any(|m| m.user.username == username) {
            return Err(RpcError::handler(
                NAME_TAKEN,
                format!("The name {username} is already taken"),
            ));
        }

        let user = User {
            username: username.to_owned(),
            joined_at: Utc::now(),
        };
        info!(username, connection_id = %emitter.connection_id(), "member joined");
        members.push(Member {
            user: user.clone(),
            emitter,
        });
        Ok(user)
    }

    /// Remove the member on `connection_id` and tell the others.
    ///
    /// Returns `None` if that channel was not a member.
    pub fn leave(&self, connection_id: &ConnectionId) -> Option<User> {
        let user = {
            let mut members = self.members.lock();
            let index = members
                .iter()
                .position(|m| m.emitter.connection_id() == connection_id)?;
            members.remove(index).user
        };
        info!(username = %user.username, %connection_id, "member left");
        let _ = self.broadcast(CLIENT_REMOVED, &user);
        Some(user)
    }

    /// Member joined on `connection_id`, if any.
    pub fn member(&self, connection_id: &ConnectionId) -> Option<User> {
        self.members
            .lock()
            .iter()
            .find(|m| m.emitter.connection_id() == connection_id)
            .map(|m| m.user.clone())
    }

    /// Members in join order.
    pub fn users(&self) -> Vec<User> {
        self.members.lock().iter().map(|m| m.user.clone()).collect()
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.members.lock().len()
    }

    /// Whether nobody has joined.
    pub fn is_empty(&self) -> bool {
        self.members.lock().is_empty()
    }

    /// Emit `event` to every member. Returns how many channels accepted it.
    pub fn broadcast<T: Serialize>(&self, event: &str, data: &T) -> Result<usize, RpcError> {
        let data = serde_json::to_value(data)?;
        let emitters: Vec<RealtimeEmitter> =
            self.members.lock().iter().map(|m| m.emitter.clone()).collect();

        let mut delivered = 0;
        for emitter in &emitters {
            match emitter.emit(event, data.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    warn!(event, connection_id = %emitter.connection_id(), error = %e, "dropping chat event");
                }
            }
        }
        debug!(event, delivered, members = emitters.len(), "broadcast");
        Ok(delivered)
    }
}

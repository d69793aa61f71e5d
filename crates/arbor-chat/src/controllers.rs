//! `chat` module: `join`, `send_message`, `list_clients`.

use arbor_core::{Params, RpcError};
use arbor_server::{CallContext, ControllerBuilder, ControllerTree};
use tracing::debug;

use crate::room::{CLIENT_ADDED, ChatMessage, ChatRoom, NOT_JOINED, USER_MESSAGE, User};

/// Controller tree served by the chat sample.
pub fn controllers() -> ControllerTree<ChatRoom> {
    ControllerBuilder::new()
        .module(
            "chat",
            ControllerBuilder::new()
                .method("join", join)
                .method("send_message", send_message)
                .method("list_clients", list_clients),
        )
        .build()
}

/// `chat.join(username)`: requires a push channel. The member is removed
/// when that channel closes.
async fn join(params: Params, ctx: CallContext<ChatRoom>) -> Result<User, RpcError> {
    let username: String = params.required(0)?;
    let emitter = ctx.realtime()?.clone();
    let room = ctx.app_arc();

    let user = room.join(&username, emitter.clone())?;

    let closed = emitter.status();
    let connection_id = emitter.connection_id().clone();
    let watcher_room = room.clone();
    let _watcher = tokio::spawn(async move {
        closed.await;
        debug!(%connection_id, "member channel closed");
        let _ = watcher_room.leave(&connection_id);
    });

    room.broadcast(CLIENT_ADDED, &user)?;
    Ok(user)
}

/// `chat.send_message(text)`: delivers `user_message` to every member.
async fn send_message(params: Params, ctx: CallContext<ChatRoom>) -> Result<usize, RpcError> {
    let message: String = params.required(0)?;
    let connection_id = ctx.realtime()?.connection_id().clone();
    let room = ctx.app();

    let user = room
        .member(&connection_id)
        .ok_or_else(|| RpcError::handler(NOT_JOINED, "Join the chat before sending messages"))?;
    room.broadcast(USER_MESSAGE, &ChatMessage { user, message })
}

async fn list_clients(_params: Params, ctx: CallContext<ChatRoom>) -> Result<Vec<User>, RpcError> {
    Ok(ctx.app().users())
}

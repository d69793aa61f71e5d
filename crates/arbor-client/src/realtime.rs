//! # Realtime channel
//!
//! Client end of a push channel. [`RealtimeChannel::connect`] opens the stream,
//! waits for the `connected` frame, then hands the rest of the stream to a
//! reader task that fans `emit` frames out to listeners keyed by
//! `namespace.event`.
//!
//! State moves `Connecting -> Connected -> Closed` and never back. A closed
//! channel is not reused; the owning client opens a fresh one.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use arbor_core::{ChannelState, ConnectionId, EventContract};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::sync::watch;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::errors::ClientError;
use crate::transport::{FrameStream, Transport};

/// How long to wait for the `connected` frame after the stream opens.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Callback invoked with the `data` of each matching event.
pub type EventHandler = Arc<dyn Fn(Value) + Send + Sync>;

/// Handle returned by [`RealtimeChannel::on`], used to remove the listener.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listeners = RwLock<HashMap<String, Vec<(ListenerId, EventHandler)>>>;

struct Shared {
    state: watch::Sender<ChannelState>,
    listeners: Listeners,
    next_listener: AtomicU64,
    failure: Mutex<Option<String>>,
    cancel: CancellationToken,
}

impl Shared {
    /// Apply a transition if the lifecycle allows it.
    fn transition(&self, next: ChannelState) -> bool {
        self.state.send_if_modified(|current| {
            if current.can_transition_to(next) {
                *current = next;
                true
            } else {
                false
            }
        })
    }

    fn dispatch(&self, key: &str, data: Value) {
        // Clone out of the lock so handlers may register listeners themselves.
        let handlers: Vec<EventHandler> = match self.listeners.read().get(key) {
            Some(entries) => entries.iter().map(|(_, h)| Arc::clone(h)).collect(),
            None => {
                trace!(key, "event without listeners");
                return;
            }
        };
        for handler in handlers {
            handler(data.clone());
        }
    }
}

/// An open (or closed) push channel.
pub struct RealtimeChannel {
    connection_id: ConnectionId,
    shared: Arc<Shared>,
    state: watch::Receiver<ChannelState>,
}

impl RealtimeChannel {
    /// Open a channel over `transport` and complete the handshake.
    pub async fn connect(transport: &dyn Transport) -> Result<Self, ClientError> {
        Self::connect_with_timeout(transport, HANDSHAKE_TIMEOUT).await
    }

    /// Like [`RealtimeChannel::connect`], failing with a handshake error if no
    /// `connected` frame arrives within `timeout`.
    pub async fn connect_with_timeout(
        transport: &dyn Transport,
        handshake_timeout: Duration,
    ) -> Result<Self, ClientError> {
        let mut frames = transport.open_channel().await?;

        let first = tokio::time::timeout(handshake_timeout, frames.next())
            .await
            .map_err(|_| ClientError::Handshake("timed out waiting for connected frame".into()))?;
        let connection_id = match first {
            Some(Ok(EventContract::Connected { connection_id })) => connection_id,
            Some(Ok(EventContract::Emit { event })) => {
                return Err(ClientError::Handshake(format!(
                    "expected connected frame, got event {}",
                    event.key()
                )));
            }
            Some(Err(e)) => return Err(ClientError::Handshake(e.to_string())),
            None => return Err(ClientError::Handshake("channel closed before connected frame".into())),
        };

        let (state_tx, state_rx) = watch::channel(ChannelState::Connecting);
        let shared = Arc::new(Shared {
            state: state_tx,
            listeners: RwLock::new(HashMap::new()),
            next_listener: AtomicU64::new(1),
            failure: Mutex::new(None),
            cancel: CancellationToken::new(),
        });
        let _ = shared.transition(ChannelState::Connected);
        debug!(connection_id = %connection_id, "realtime channel connected");

        let _reader = tokio::spawn(read_frames(Arc::clone(&shared), frames, connection_id.clone()));

        Ok(Self {
            connection_id,
            shared,
            state: state_rx,
        })
    }

    /// Id the server assigned to this channel.
    pub fn connection_id(&self) -> &ConnectionId {
        &self.connection_id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ChannelState {
        *self.state.borrow()
    }

    /// Whether the channel has reached `Closed`.
    pub fn is_closed(&self) -> bool {
        self.state().is_closed()
    }

    /// Watch lifecycle changes.
    pub fn subscribe_state(&self) -> watch::Receiver<ChannelState> {
        self.state.clone()
    }

    /// Register `handler` for events named `key` (`namespace.event`).
    pub fn on<F>(&self, key: impl Into<String>, handler: F) -> Result<ListenerId, ClientError>
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        if self.is_closed() {
            return Err(ClientError::ChannelClosed);
        }
        let id = ListenerId(self.shared.next_listener.fetch_add(1, Ordering::Relaxed));
        self.shared
            .listeners
            .write()
            .entry(key.into())
            .or_default()
            .push((id, Arc::new(handler)));
        Ok(id)
    }

    /// Remove a listener. Returns `false` if it was not registered.
    pub fn off(&self, id: ListenerId) -> bool {
        let mut listeners = self.shared.listeners.write();
        let mut removed = false;
        listeners.retain(|_, entries| {
            let before = entries.len();
            entries.retain(|(lid, _)| *lid != id);
            removed |= entries.len() != before;
            !entries.is_empty()
        });
        removed
    }

    /// Number of listeners registered for `key`.
    pub fn listener_count(&self, key: &str) -> usize {
        self.shared.listeners.read().get(key).map_or(0, Vec::len)
    }

    /// Close the channel. Idempotent.
    pub fn disconnect(&self) {
        if self.shared.transition(ChannelState::Closed) {
            debug!(connection_id = %self.connection_id, "realtime channel disconnected");
        }
        self.shared.cancel.cancel();
    }

    /// Resolve when the channel closes.
    ///
    /// `Ok` for a normal close (local disconnect or the server ending the
    /// stream); `Err` when the stream failed.
    pub async fn status(&self) -> Result<(), ClientError> {
        let mut state = self.state.clone();
        // The sender lives in `shared`, which we hold, so this only ends on Closed.
        let _ = state.wait_for(|s| s.is_closed()).await;
        match self.shared.failure.lock().clone() {
            Some(message) => Err(ClientError::Transport(message)),
            None => Ok(()),
        }
    }
}

impl Drop for RealtimeChannel {
    fn drop(&mut self) {
        self.shared.cancel.cancel();
    }
}

impl std::fmt::Debug for RealtimeChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeChannel")
            .field("connection_id", &self.connection_id)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

async fn read_frames(shared: Arc<Shared>, mut frames: FrameStream, connection_id: ConnectionId) {
    loop {
        let next = tokio::select! {
            () = shared.cancel.cancelled() => break,
            next = frames.next() => next,
        };
        match next {
            Some(Ok(EventContract::Emit { event })) => {
                let key = event.key();
                shared.dispatch(&key, event.data);
            }
            Some(Ok(EventContract::Connected { connection_id: repeated })) => {
                warn!(connection_id = %connection_id, %repeated, "ignoring repeated connected frame");
            }
            Some(Err(e)) => {
                warn!(connection_id = %connection_id, error = %e, "realtime channel failed");
                *shared.failure.lock() = Some(e.to_string());
                break;
            }
            None => {
                debug!(connection_id = %connection_id, "server closed realtime channel");
                break;
            }
        }
    }
    drop(frames);
    let _ = shared.transition(ChannelState::Closed);
}

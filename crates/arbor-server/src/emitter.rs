//! Per-call handle for pushing events to the calling client's channel.

use std::future::Future;
use std::sync::{Arc, Weak};

use arbor_core::{ConnectionId, EventContract, RpcError};
use serde::Serialize;

use crate::registry::ConnectionEntry;

/// Pushes events to one client's push channel.
///
/// Holds only a weak reference to the registry entry; once the channel is
/// gone every `emit` fails with [`RpcError::EmitFailure`]. Cloning is cheap,
/// and clones may be stored by application code (e.g. a chat room member
/// list) beyond the call that produced them.
#[derive(Clone, Debug)]
pub struct RealtimeEmitter {
    namespace: Vec<String>,
    connection_id: ConnectionId,
    entry: Weak<ConnectionEntry>,
}

impl RealtimeEmitter {
    /// Bind an emitter for the controller at `namespace` to a live entry.
    pub fn new(namespace: Vec<String>, entry: &Arc<ConnectionEntry>) -> Self {
        Self {
            namespace,
            connection_id: entry.id().clone(),
            entry: Arc::downgrade(entry),
        }
    }

    /// Push `name` with `data` to the client.
    ///
    /// The event carries this emitter's namespace, so the client receives it
    /// under `<namespace>.<name>`.
    pub fn emit<T: Serialize>(&self, name: &str, data: T) -> Result<(), RpcError> {
        let entry = self.entry.upgrade().ok_or_else(|| RpcError::EmitFailure {
            message: format!("Realtime channel {} no longer exists", self.connection_id),
        })?;
        let data = serde_json::to_value(data)?;
        entry.send(EventContract::emit(self.namespace.clone(), name, data))
    }

    /// Resolves once the channel has closed; immediately if it already has.
    pub fn status(&self) -> impl Future<Output = ()> + Send + 'static {
        let signal = self.entry.upgrade().map(|e| e.close_signal());
        async move {
            if let Some(signal) = signal {
                signal.cancelled().await;
            }
        }
    }

    /// Whether the channel is gone or closed.
    pub fn is_closed(&self) -> bool {
        self.entry.upgrade().is_none_or(|e| e.is_closed())
    }

    /// Id of the channel this emitter writes to.
    pub fn connection_id(&self) -> &ConnectionId {
        &self.connection_id
    }

    /// Namespace attached to every emitted event.
    pub fn namespace(&self) -> &[String] {
        &self.namespace
    }

    /// Same channel, different namespace.
    #[must_use]
    pub fn scoped(&self, namespace: Vec<String>) -> Self {
        Self {
            namespace,
            connection_id: self.connection_id.clone(),
            entry: self.entry.clone(),
        }
    }
}

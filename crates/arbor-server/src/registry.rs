//! Registry of open push channels, keyed by connection id.
//!
//! The registry exclusively owns every [`ConnectionEntry`]. Emitters hold only
//! weak references, and the [`ChannelGuard`] returned from
//! [`ConnectionRegistry::register`] removes the entry when it is dropped, so
//! cleanup runs exactly once on every exit path of the channel task.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use arbor_core::{ChannelState, ConnectionId, EventContract, RpcError};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use metrics::{counter, gauge};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Server-side state of one open push channel.
#[derive(Debug)]
pub struct ConnectionEntry {
    id: ConnectionId,
    tx: mpsc::Sender<EventContract>,
    closed: AtomicBool,
    close_signal: CancellationToken,
}

impl ConnectionEntry {
    fn new(id: ConnectionId, tx: mpsc::Sender<EventContract>) -> Self {
        Self {
            id,
            tx,
            closed: AtomicBool::new(false),
            close_signal: CancellationToken::new(),
        }
    }

    /// Connection id clients use to correlate calls with this channel.
    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    /// Whether the channel has been closed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Current lifecycle state; an entry exists only once registered.
    pub fn state(&self) -> ChannelState {
        if self.is_closed() {
            ChannelState::Closed
        } else {
            ChannelState::Connected
        }
    }

    /// Mark closed and wake everything waiting on [`Self::close_signal`].
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.close_signal.cancel();
        }
    }

    /// Token cancelled when the channel closes.
    pub fn close_signal(&self) -> CancellationToken {
        self.close_signal.clone()
    }

    /// Queue an event without waiting. A closed or full channel is an error.
    pub fn send(&self, event: EventContract) -> Result<(), RpcError> {
        if self.is_closed() {
            return Err(RpcError::EmitFailure {
                message: format!("Realtime channel {} is closed", self.id),
            });
        }
        match self.tx.try_send(event) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                counter!("channel_events_rejected_total", "cause" => "full").increment(1);
                warn!(connection_id = %self.id, "channel queue full, rejecting event");
                Err(RpcError::EmitFailure {
                    message: format!("Realtime channel {} is full", self.id),
                })
            }
            Err(TrySendError::Closed(_)) => {
                counter!("channel_events_rejected_total", "cause" => "closed").increment(1);
                Err(RpcError::EmitFailure {
                    message: format!("Realtime channel {} is closed", self.id),
                })
            }
        }
    }
}

/// Everything the channel task needs after a successful registration.
#[derive(Debug)]
pub struct Registration {
    /// Fresh connection id; already queued as the `connected` frame.
    pub connection_id: ConnectionId,
    /// Receiving half of the event channel.
    pub events: mpsc::Receiver<EventContract>,
    /// Removes the entry from the registry when dropped.
    pub guard: ChannelGuard,
}

/// Scoped registry membership for one channel.
///
/// Dropping the guard closes the entry and unregisters it.
#[derive(Debug)]
pub struct ChannelGuard {
    registry: ConnectionRegistry,
    entry: Arc<ConnectionEntry>,
}

impl ChannelGuard {
    /// The guarded entry.
    pub fn entry(&self) -> &Arc<ConnectionEntry> {
        &self.entry
    }
}

impl Drop for ChannelGuard {
    fn drop(&mut self) {
        self.entry.close();
        let _ = self.registry.unregister(self.entry.id());
    }
}

/// Concurrent map of open channels. Cloning shares the same map.
#[derive(Clone, Debug)]
pub struct ConnectionRegistry {
    entries: Arc<DashMap<ConnectionId, Arc<ConnectionEntry>>>,
    capacity: usize,
}

impl ConnectionRegistry {
    /// Create an empty registry whose channels buffer `capacity` events.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Allocate a fresh connection id and entry.
    ///
    /// The `connected` frame is queued before the entry becomes visible to
    /// [`Self::lookup`], so it is always the first frame on the channel.
    pub fn register(&self) -> Registration {
        loop {
            let id = ConnectionId::generate();
            let Entry::Vacant(slot) = self.entries.entry(id.clone()) else {
                continue;
            };

            let (tx, rx) = mpsc::channel(self.capacity);
            let entry = Arc::new(ConnectionEntry::new(id.clone(), tx));
            let _ = entry.tx.try_send(EventContract::Connected {
                connection_id: id.clone(),
            });
            let _ = slot.insert(Arc::clone(&entry));

            counter!("channels_opened_total").increment(1);
            #[allow(clippy::cast_precision_loss)]
            gauge!("channels_open").set(self.entries.len() as f64);
            debug!(connection_id = %id, "channel registered");

            return Registration {
                connection_id: id,
                events: rx,
                guard: ChannelGuard {
                    registry: self.clone(),
                    entry,
                },
            };
        }
    }

    /// Find a live entry.
    pub fn lookup(&self, id: &ConnectionId) -> Option<Arc<ConnectionEntry>> {
        self.entries
            .get(id)
            .map(|e| Arc::clone(e.value()))
            .filter(|e| !e.is_closed())
    }

    /// Remove an entry. Returns `false` if it was already gone.
    pub fn unregister(&self, id: &ConnectionId) -> bool {
        let Some((_, entry)) = self.entries.remove(id) else {
            return false;
        };
        entry.close();
        counter!("channels_closed_total").increment(1);
        #[allow(clippy::cast_precision_loss)]
        gauge!("channels_open").set(self.entries.len() as f64);
        debug!(connection_id = %id, "channel unregistered");
        true
    }

    /// Server-initiated close. The channel stream ends and its guard runs.
    pub fn close(&self, id: &ConnectionId) -> bool {
        self.unregister(id)
    }

    /// Close every open channel.
    pub fn close_all(&self) {
        for id in self.ids() {
            let _ = self.unregister(&id);
        }
    }

    /// Number of open channels.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no channels are open.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Ids of all open channels, sorted.
    pub fn ids(&self) -> Vec<ConnectionId> {
        let mut ids: Vec<ConnectionId> = self.entries.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    #[tokio::test]
    async fn connected_is_first_frame() {
        let registry = ConnectionRegistry::new(8);
        let mut reg = registry.register();
        let first = reg.events.recv().await.unwrap();
        assert_eq!(
            first,
            EventContract::Connected {
                connection_id: reg.connection_id.clone()
            }
        );
    }

    #[test]
    fn register_makes_entry_visible() {
        let registry = ConnectionRegistry::default();
        let reg = registry.register();
        let entry = registry.lookup(&reg.connection_id).unwrap();
        assert_eq!(entry.id(), &reg.connection_id);
        assert_eq!(entry.state(), ChannelState::Connected);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn ids_are_unique() {
        let registry = ConnectionRegistry::new(1);
        let regs: Vec<Registration> = (0..50).map(|_| registry.register()).collect();
        let mut ids = registry.ids();
        ids.dedup();
        assert_eq!(ids.len(), regs.len());
    }

    #[test]
    fn dropping_guard_unregisters_once() {
        let registry = ConnectionRegistry::new(4);
        let reg = registry.register();
        let id = reg.connection_id.clone();
        let entry = Arc::clone(reg.guard.entry());

        drop(reg);

        assert!(registry.lookup(&id).is_none());
        assert!(registry.is_empty());
        assert!(entry.is_closed());
        assert!(entry.close_signal().is_cancelled());
        assert!(!registry.unregister(&id));
    }

    #[test]
    fn unregister_is_idempotent() {
        let registry = ConnectionRegistry::new(4);
        let reg = registry.register();
        assert!(registry.unregister(&reg.connection_id));
        assert!(!registry.unregister(&reg.connection_id));
        assert!(registry.lookup(&reg.connection_id).is_none());
    }

    #[test]
    fn unknown_id_lookup_is_none() {
        let registry = ConnectionRegistry::new(4);
        assert!(registry.lookup(&ConnectionId::from("nope")).is_none());
    }

    #[test]
    fn server_close_signals_entry() {
        let registry = ConnectionRegistry::new(4);
        let reg = registry.register();
        let signal = reg.guard.entry().close_signal();
        assert!(registry.close(&reg.connection_id));
        assert!(signal.is_cancelled());
        assert!(registry.is_empty());
    }

    #[test]
    fn close_all_empties_registry() {
        let registry = ConnectionRegistry::new(4);
        let _a = registry.register();
        let _b = registry.register();
        registry.close_all();
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn send_delivers_in_order() {
        let registry = ConnectionRegistry::new(8);
        let mut reg = registry.register();
        let entry = registry.lookup(&reg.connection_id).unwrap();
        entry
            .send(EventContract::emit(vec![], "a", json!(1)))
            .unwrap();
        entry
            .send(EventContract::emit(vec![], "b", json!(2)))
            .unwrap();

        let _connected = reg.events.recv().await.unwrap();
        assert_matches!(reg.events.recv().await, Some(EventContract::Emit { event }) if event.name == "a");
        assert_matches!(reg.events.recv().await, Some(EventContract::Emit { event }) if event.name == "b");
    }

    #[test]
    fn send_on_full_channel_fails() {
        let registry = ConnectionRegistry::new(1);
        let reg = registry.register();
        // The connected frame already occupies the only slot.
        let err = reg
            .guard
            .entry()
            .send(EventContract::emit(vec![], "x", json!(null)))
            .unwrap_err();
        assert_matches!(err, RpcError::EmitFailure { .. });
    }

    #[test]
    fn send_after_close_fails() {
        let registry = ConnectionRegistry::new(8);
        let reg = registry.register();
        let entry = Arc::clone(reg.guard.entry());
        drop(reg);
        assert_matches!(
            entry.send(EventContract::emit(vec![], "x", json!(null))),
            Err(RpcError::EmitFailure { .. })
        );
    }
}

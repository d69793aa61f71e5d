//! Server side of a push channel: a stream of frames that owns its registry
//! membership.

use arbor_core::{ConnectionId, EventContract};
use futures::Stream;
use metrics::counter;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::registry::{ConnectionRegistry, Registration};

/// An open push channel.
///
/// The frame stream holds the channel's [`crate::registry::ChannelGuard`];
/// dropping the stream (client went away, server shut down, task aborted)
/// unregisters the connection.
pub struct OpenChannel<S> {
    /// Id announced in the `connected` frame.
    pub connection_id: ConnectionId,
    /// Frames in send order, starting with `connected`.
    pub frames: S,
}

/// Register a channel and return its frame stream.
///
/// The stream ends when the channel is closed through the registry or when
/// `shutdown` fires.
pub fn open(
    registry: &ConnectionRegistry,
    shutdown: CancellationToken,
) -> OpenChannel<impl Stream<Item = EventContract> + Send + 'static> {
    let registration = registry.register();
    OpenChannel {
        connection_id: registration.connection_id.clone(),
        frames: frame_stream(registration, shutdown),
    }
}

fn frame_stream(
    registration: Registration,
    shutdown: CancellationToken,
) -> impl Stream<Item = EventContract> + Send + 'static {
    async_stream::stream! {
        let Registration { connection_id, mut events, guard } = registration;
        let closed = guard.entry().close_signal();
        debug!(%connection_id, "channel open");

        loop {
            let frame = tokio::select! {
                biased;
                () = shutdown.cancelled() => {
                    debug!(%connection_id, "server shutting down, ending channel");
                    None
                }
                () = closed.cancelled() => {
                    debug!(%connection_id, "channel closed by server");
                    None
                }
                frame = events.recv() => frame,
            };
            let Some(frame) = frame else { break };
            counter!("channel_frames_sent_total").increment(1);
            yield frame;
        }

        drop(guard);
        debug!(%connection_id, "channel released");
    }
}

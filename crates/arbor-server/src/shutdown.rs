//! Server stop signal.
//!
//! The HTTP listener and every push channel wait on a child of one root
//! token. Stopping fires the root once; the listener task is then given a
//! bounded window to finish and is aborted if it overruns.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// How long [`StopSignal::stop_and_join`] waits when no timeout is given.
pub const LISTENER_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Root cancellation shared by the listener and open channels.
///
/// Cloning is cheap; clones observe and fire the same signal.
#[derive(Clone, Debug, Default)]
pub struct StopSignal {
    root: CancellationToken,
}

impl StopSignal {
    /// A signal that has not fired.
    pub fn new() -> Self {
        Self::default()
    }

    /// Token for one listener or channel. Cancelling it locally leaves the
    /// root untouched.
    pub fn subscribe(&self) -> CancellationToken {
        self.root.child_token()
    }

    /// Fire the signal. Returns `true` only for the call that fired it.
    pub fn stop(&self) -> bool {
        if self.root.is_cancelled() {
            return false;
        }
        self.root.cancel();
        info!("server stop requested");
        true
    }

    /// Whether [`StopSignal::stop`] has been called.
    pub fn is_stopped(&self) -> bool {
        self.root.is_cancelled()
    }

    /// Fire the signal and wait for `listener` to exit.
    ///
    /// Returns `false` if the listener overran `timeout` and was aborted.
    pub async fn stop_and_join(
        &self,
        mut listener: JoinHandle<()>,
        timeout: Option<Duration>,
    ) -> bool {
        let timeout = timeout.unwrap_or(LISTENER_DRAIN_TIMEOUT);
        let _ = self.stop();

        match tokio::time::timeout(timeout, &mut listener).await {
            Ok(Ok(())) => {
                debug!("listener exited");
                true
            }
            Ok(Err(err)) => {
                warn!(error = %err, "listener task ended abnormally");
                true
            }
            Err(_) => {
                warn!(timeout_ms = timeout.as_millis(), "listener did not exit in time, aborting");
                listener.abort();
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── signal ──────────────────────────────────────────────────────

    #[test]
    fn fresh_signal_is_not_stopped() {
        let signal = StopSignal::new();
        assert!(!signal.is_stopped());
        assert!(!signal.subscribe().is_cancelled());
    }

    #[test]
    fn only_first_stop_reports_firing() {
        let signal = StopSignal::new();
        let subscribed_early = signal.subscribe();
        assert!(signal.stop());
        assert!(!signal.stop());
        assert!(subscribed_early.is_cancelled());
        assert!(signal.subscribe().is_cancelled());
    }

    #[test]
    fn clones_share_the_root() {
        let signal = StopSignal::new();
        let clone = signal.clone();
        assert!(clone.stop());
        assert!(signal.is_stopped());
    }

    #[test]
    fn local_cancel_does_not_stop_server() {
        let signal = StopSignal::new();
        signal.subscribe().cancel();
        assert!(!signal.is_stopped());
    }

    // ── stop_and_join ───────────────────────────────────────────────

    #[tokio::test]
    async fn listener_watching_its_token_exits_cleanly() {
        let signal = StopSignal::new();
        let token = signal.subscribe();
        let listener = tokio::spawn(async move { token.cancelled().await });

        assert!(signal.stop_and_join(listener, None).await);
        assert!(signal.is_stopped());
    }

    #[tokio::test(start_paused = true)]
    async fn stuck_listener_is_aborted() {
        let signal = StopSignal::new();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let listener = tokio::spawn(async move {
            let _keep = tx;
            tokio::time::sleep(Duration::from_secs(300)).await;
        });

        let drained = signal
            .stop_and_join(listener, Some(Duration::from_millis(100)))
            .await;
        assert!(!drained);
        // Aborting drops the task's future, and with it the sender.
        assert!(rx.await.is_err());
    }

    #[tokio::test]
    async fn panicking_listener_still_counts_as_exited() {
        let signal = StopSignal::new();
        let listener = tokio::spawn(async { panic!("listener bug") });
        assert!(signal.stop_and_join(listener, None).await);
    }
}

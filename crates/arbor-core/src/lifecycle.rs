//! Push channel lifecycle shared by both ends of a channel.

use std::fmt;

use serde::{Deserialize, Serialize};

/// State of a single push channel.
///
/// Transitions only move forward: `Connecting -> Connected -> Closed`, or
/// straight from `Connecting` to `Closed` when the handshake fails. `Closed`
/// is terminal; reconnecting means a new channel with a new connection id.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelState {
    /// Channel requested, `connected` frame not yet seen.
    #[default]
    Connecting,
    /// Handshake complete; events may flow.
    Connected,
    /// Channel ended. Terminal.
    Closed,
}

impl ChannelState {
    /// Whether moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Connecting, Self::Connected | Self::Closed) | (Self::Connected, Self::Closed)
        )
    }

    /// Whether this is the terminal state.
    pub fn is_closed(self) -> bool {
        self == Self::Closed
    }
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Closed => "closed",
        })
    }
}

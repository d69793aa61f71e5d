//! # arbor-client
//!
//! Client half of Arbor RPC.
//!
//! ```ignore
//! let client = Client::new("http://127.0.0.1:8080/rpc")?;
//! client.connect().await?;
//! client.path("chat").on("user_message", |data| println!("{data}"))?;
//! client.path("chat").path("join").call(params!["ada"]).await?;
//! ```

#![deny(unsafe_code)]

pub mod errors;
pub mod proxy;
pub mod realtime;
pub mod sse;
pub mod transport;

pub use arbor_core::{ChannelState, ConnectionId, params};
pub use errors::{ClientError, RemoteError};
pub use proxy::{CallPath, Client};
pub use realtime::{EventHandler, ListenerId, RealtimeChannel};
#[cfg(feature = "local")]
pub use transport::LocalTransport;
pub use transport::{FrameStream, HttpTransport, Transport};

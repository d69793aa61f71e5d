//! Client call proxy.
//!
//! A [`CallPath`] accumulates segments (`client.path("chat").path("join")`);
//! calling it sends a request whose method is the last segment and whose
//! namespace is everything before it. While a realtime channel is connected,
//! every call carries its connection id so handlers can emit back.

use std::sync::Arc;

use arbor_core::{ChannelState, ConnectionId, RequestContract, event_key};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::errors::{ClientError, RemoteError};
use crate::realtime::{ListenerId, RealtimeChannel};
use crate::transport::{HttpTransport, Transport};

struct ClientInner {
    transport: Arc<dyn Transport>,
    channel: RwLock<Option<Arc<RealtimeChannel>>>,
}

/// Entry point for calls and the realtime channel. Cheap to clone.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl Client {
    /// Client speaking HTTP to `route` (e.g. `http://127.0.0.1:8080/rpc`).
    pub fn new(route: &str) -> Result<Self, ClientError> {
        Ok(Self::with_transport(HttpTransport::new(route)?))
    }

    /// Client over any [`Transport`], such as an in-process one.
    pub fn with_transport(transport: impl Transport + 'static) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                transport: Arc::new(transport),
                channel: RwLock::new(None),
            }),
        }
    }

    /// Start a call path at `segment`.
    pub fn path(&self, segment: impl Into<String>) -> CallPath {
        self.root().path(segment)
    }

    /// A call path with no segments.
    pub fn root(&self) -> CallPath {
        CallPath {
            client: self.clone(),
            segments: Vec::new(),
        }
    }

    /// Call `path` directly; the last element is the method.
    pub async fn call<S: AsRef<str>>(&self, path: &[S], params: Vec<Value>) -> Result<Value, ClientError> {
        let request = RequestContract::from_path(path, params).ok_or(ClientError::EmptyPath)?;
        self.send(request).await
    }

    async fn send(&self, request: RequestContract) -> Result<Value, ClientError> {
        let connection_id = self.connection_id();
        debug!(
            signature = %request.signature(),
            realtime = connection_id.is_some(),
            "rpc call"
        );
        let response = self.inner.transport.call(request, connection_id).await?;
        response
            .into_result()
            .map_err(|body| ClientError::Rpc(RemoteError::from(body)))
    }

    /// Open the realtime channel.
    ///
    /// Fails with [`ClientError::AlreadyConnected`] while a channel is open.
    /// After a channel closes, a new one may be opened.
    pub async fn connect(&self) -> Result<ConnectionId, ClientError> {
        if self.live_channel().is_some() {
            return Err(ClientError::AlreadyConnected);
        }
        let channel = RealtimeChannel::connect(self.inner.transport.as_ref()).await?;
        let connection_id = channel.connection_id().clone();

        let mut slot = self.inner.channel.write();
        if slot.as_ref().is_some_and(|existing| !existing.is_closed()) {
            // Lost a race with a concurrent connect; keep the first channel.
            channel.disconnect();
            return Err(ClientError::AlreadyConnected);
        }
        *slot = Some(Arc::new(channel));
        Ok(connection_id)
    }

    /// Close the realtime channel.
    pub fn disconnect(&self) -> Result<(), ClientError> {
        let channel = self.inner.channel.read().clone().ok_or(ClientError::NotConnected)?;
        channel.disconnect();
        Ok(())
    }

    /// The current channel, open or closed.
    pub fn realtime(&self) -> Result<Arc<RealtimeChannel>, ClientError> {
        self.inner.channel.read().clone().ok_or(ClientError::NotConnected)
    }

    /// Lifecycle state of the current channel, if any.
    pub fn state(&self) -> Option<ChannelState> {
        self.inner.channel.read().as_ref().map(|c| c.state())
    }

    /// Resolve when the current channel closes.
    pub async fn status(&self) -> Result<(), ClientError> {
        self.realtime()?.status().await
    }

    /// Connection id attached to calls, while a channel is connected.
    pub fn connection_id(&self) -> Option<ConnectionId> {
        self.live_channel().map(|c| c.connection_id().clone())
    }

    /// Remove a listener registered with [`CallPath::on`].
    pub fn off(&self, id: ListenerId) -> bool {
        self.inner
            .channel
            .read()
            .as_ref()
            .is_some_and(|c| c.off(id))
    }

    fn live_channel(&self) -> Option<Arc<RealtimeChannel>> {
        self.inner
            .channel
            .read()
            .as_ref()
            .filter(|c| !c.is_closed())
            .cloned()
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// A path into the server's controller tree.
#[derive(Clone, Debug)]
pub struct CallPath {
    client: Client,
    segments: Vec<String>,
}

impl CallPath {
    /// Extend the path by one segment.
    #[must_use]
    pub fn path(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment.into());
        Self {
            client: self.client.clone(),
            segments,
        }
    }

    /// Path segments; the last one is the method name.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// The request this path sends for `params`.
    pub fn request(&self, params: Vec<Value>) -> Result<RequestContract, ClientError> {
        if self.segments.iter().any(String::is_empty) {
            return Err(ClientError::BrokenContract("call path has an empty segment".into()));
        }
        RequestContract::from_path(&self.segments, params).ok_or(ClientError::EmptyPath)
    }

    /// Call the method at this path.
    pub async fn call(&self, params: Vec<Value>) -> Result<Value, ClientError> {
        let request = self.request(params)?;
        self.client.send(request).await
    }

    /// Call and deserialize the result.
    pub async fn call_as<T: DeserializeOwned>(&self, params: Vec<Value>) -> Result<T, ClientError> {
        let value = self.call(params).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Listen for `event` emitted under this path's namespace.
    ///
    /// `client.path("chat").on("user_message", ..)` receives events a handler
    /// in the `chat` module emits as `user_message`.
    pub fn on<F>(&self, event: &str, handler: F) -> Result<ListenerId, ClientError>
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        let channel = self.client.realtime()?;
        channel.on(event_key(&self.segments, event), handler)
    }
}

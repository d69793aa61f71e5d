//! Transports carry requests and push channels between a [`Client`](crate::Client)
//! and a server.
//!
//! [`HttpTransport`] speaks the HTTP binding: calls as `PUT` with a JSON body,
//! channels as an SSE `GET`. [`LocalTransport`] (feature `local`) calls an
//! in-process [`arbor_server::RpcServer`] directly.

use std::pin::Pin;

use arbor_core::codec::{decode_event, decode_response};
use arbor_core::{CONNECTION_ID_HEADER, ConnectionId, EventContract, RequestContract, ResponseContract, RouteTemplate};
use async_trait::async_trait;
use futures::Stream;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use tokio_stream::StreamExt;
use tracing::debug;

use crate::errors::ClientError;
use crate::sse::parse_sse_lines;

/// Push frames in arrival order. The stream ends when the channel closes.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<EventContract, ClientError>> + Send>>;

/// Carries calls and push channels.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one call, tagged with the caller's connection id when present.
    async fn call(
        &self,
        request: RequestContract,
        connection_id: Option<ConnectionId>,
    ) -> Result<ResponseContract, ClientError>;

    /// Open a push channel. The first frame should be `connected`.
    async fn open_channel(&self) -> Result<FrameStream, ClientError>;
}

/// HTTP/SSE transport built on `reqwest`.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    http: reqwest::Client,
    route: RouteTemplate,
}

impl HttpTransport {
    /// Build a transport for a route such as `http://host:port/rpc` or `/rpc/:signature`.
    pub fn new(route: &str) -> Result<Self, ClientError> {
        Ok(Self::with_client(reqwest::Client::new(), RouteTemplate::parse(route)?))
    }

    /// Build a transport from a preconfigured `reqwest` client.
    pub fn with_client(http: reqwest::Client, route: RouteTemplate) -> Self {
        Self { http, route }
    }

    /// The parsed route this transport targets.
    pub fn route(&self) -> &RouteTemplate {
        &self.route
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn call(
        &self,
        request: RequestContract,
        connection_id: Option<ConnectionId>,
    ) -> Result<ResponseContract, ClientError> {
        let url = self.route.call_url(&request.signature());
        let body = serde_json::to_vec(&request)?;
        let mut builder = self
            .http
            .put(&url)
            .header(CONTENT_TYPE, "application/json")
            .body(body);
        if let Some(id) = &connection_id {
            builder = builder.header(CONNECTION_ID_HEADER, id.as_str());
        }

        let response = builder.send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;
        debug!(url = %url, status = %status, len = bytes.len(), "rpc response");

        // Error responses carry a contract body too; only fail when it does not parse.
        decode_response(&bytes).map_err(|e| {
            if status.is_success() {
                ClientError::BrokenContract(e.to_string())
            } else {
                ClientError::Transport(format!("server answered {status}: {e}"))
            }
        })
    }

    async fn open_channel(&self) -> Result<FrameStream, ClientError> {
        let url = self.route.channel_url();
        let response = self
            .http
            .get(&url)
            .header(ACCEPT, "text/event-stream")
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Handshake(format!("server answered {status}")));
        }
        debug!(url = %url, "push channel opened");

        let frames = parse_sse_lines(Box::pin(response.bytes_stream())).map(|line| {
            line.and_then(|data| {
                decode_event(&data).map_err(|e| ClientError::BrokenContract(e.to_string()))
            })
        });
        Ok(Box::pin(frames))
    }
}

#[cfg(feature = "local")]
pub use local::LocalTransport;

#[cfg(feature = "local")]
mod local {
    use std::sync::Arc;

    use arbor_core::{ConnectionId, RequestContract, ResponseContract};
    use arbor_server::RpcServer;
    use async_trait::async_trait;
    use tokio_stream::StreamExt;

    use super::{FrameStream, Transport};
    use crate::errors::ClientError;

    /// Calls an [`RpcServer`] in the same process, skipping HTTP.
    pub struct LocalTransport<C> {
        server: Arc<RpcServer<C>>,
    }

    impl<C> LocalTransport<C> {
        /// Transport dispatching straight into `server`.
        pub fn new(server: Arc<RpcServer<C>>) -> Self {
            Self { server }
        }
    }

    impl<C> Clone for LocalTransport<C> {
        fn clone(&self) -> Self {
            Self {
                server: Arc::clone(&self.server),
            }
        }
    }

    #[async_trait]
    impl<C: Send + Sync + 'static> Transport for LocalTransport<C> {
        async fn call(
            &self,
            request: RequestContract,
            connection_id: Option<ConnectionId>,
        ) -> Result<ResponseContract, ClientError> {
            Ok(self.server.call(request, connection_id.as_ref()).await)
        }

        async fn open_channel(&self) -> Result<FrameStream, ClientError> {
            let channel = self.server.open_channel();
            Ok(Box::pin(channel.frames.map(Ok)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_transport_parses_route() {
        let transport = HttpTransport::new("http://example.com:8080/api/rpc").unwrap();
        assert_eq!(transport.route().origin(), "http://example.com:8080");
        assert_eq!(transport.route().base_path(), "/api/rpc");
    }

    #[test]
    fn http_transport_rejects_bad_route() {
        let err = HttpTransport::new("ftp://example.com/rpc").unwrap_err();
        assert!(matches!(err, ClientError::RouteParse(_)));
    }

    #[tokio::test]
    async fn unreachable_server_is_transport_error() {
        // Port 9 (discard) on localhost is almost never bound.
        let transport = HttpTransport::new("http://127.0.0.1:9/rpc").unwrap();
        let request = RequestContract::new(["a"], "b", Vec::new());
        let err = transport.call(request, None).await.unwrap_err();
        assert!(matches!(err, ClientError::Transport(_)));
    }
}

//! The client-facing side of an exchange
//!
//! The interceptor talks to the client through [`ClientResponse`]. The server
//! uses [`client_channel`]: the intercept task commits the head through a
//! oneshot and streams the body through a bounded channel that backs the
//! `axum` response body, so the task keeps running (and keeps archiving) even
//! when the client goes away.

use crate::proxy::types::{ProxyError, ProxyResult};
use async_trait::async_trait;
use axum::body::Body;
use bytes::Bytes;
use http::{HeaderMap, Response, StatusCode};
use std::io;
use tokio::sync::{mpsc, oneshot};

/// Destination for the response the client ultimately sees
#[async_trait]
pub trait ClientResponse: Send {
    /// Send status and headers. HTTP framing allows this exactly once.
    async fn commit(&mut self, status: StatusCode, headers: &HeaderMap) -> io::Result<()>;

    async fn write(&mut self, chunk: &Bytes) -> io::Result<()>;

    /// Signal that the body ended abnormally so the client does not mistake a
    /// truncated body for a complete one.
    async fn abort(&mut self, reason: &str);
}

type Head = (StatusCode, HeaderMap);
type BodyItem = Result<Bytes, io::Error>;

/// Create a connected [`ChannelClient`] / [`PendingResponse`] pair
pub fn client_channel(capacity: usize) -> (ChannelClient, PendingResponse) {
    let (head_tx, head_rx) = oneshot::channel();
    let (body_tx, body_rx) = mpsc::channel(capacity.max(1));
    (
        ChannelClient {
            head: Some(head_tx),
            body: body_tx,
        },
        PendingResponse {
            head: head_rx,
            body: body_rx,
        },
    )
}

/// Intercept-task half of a client channel
pub struct ChannelClient {
    head: Option<oneshot::Sender<Head>>,
    body: mpsc::Sender<BodyItem>,
}

#[async_trait]
impl ClientResponse for ChannelClient {
    async fn commit(&mut self, status: StatusCode, headers: &HeaderMap) -> io::Result<()> {
        let head = self
            .head
            .take()
            .ok_or_else(|| io::Error::other("response head already committed"))?;
        head.send((status, headers.clone()))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "client went away"))
    }

    async fn write(&mut self, chunk: &Bytes) -> io::Result<()> {
        self.body
            .send(Ok(chunk.clone()))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "client went away"))
    }

    async fn abort(&mut self, reason: &str) {
        let _ = self.body.send(Err(io::Error::other(reason.to_string()))).await;
    }
}

/// Handler half of a client channel
pub struct PendingResponse {
    head: oneshot::Receiver<Head>,
    body: mpsc::Receiver<BodyItem>,
}

impl PendingResponse {
    /// Wait for the head commit and build a response whose body streams from
    /// the intercept task.
    pub async fn into_response(self) -> ProxyResult<Response<Body>> {
        let (status, headers) = self.head.await.map_err(|_| {
            ProxyError::Internal("exchange ended before the response head was committed".into())
        })?;

        let stream = futures_util::stream::unfold(self.body, |mut body| async move {
            body.recv().await.map(|item| (item, body))
        });

        let mut response = Response::new(Body::from_stream(stream));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        Ok(response)
    }
}

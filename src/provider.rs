//! Concrete providers: REST API over `reqwest`, camera sockets over
//! `tokio-tungstenite`.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use bytes::Bytes;
use futures::StreamExt as _;
use http::{Request, Response};
use realtime::{Config, HttpRequest, Identity, MediaStream, StreamConnector, StreamMessage};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::config;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct Provider {
    http: reqwest::Client,
    config: Arc<config::Config>,
}

impl Provider {
    pub fn new(config: config::Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .context("building http client")?;
        Ok(Self { http, config: Arc::new(config) })
    }
}

impl HttpRequest for Provider {
    async fn fetch(&self, request: Request<Bytes>) -> Result<Response<Bytes>> {
        let (parts, body) = request.into_parts();
        let url = parts.uri.to_string();
        tracing::debug!(method = %parts.method, url = %url, "sending request");

        let response = self
            .http
            .request(parts.method, &url)
            .headers(parts.headers)
            .body(body)
            .send()
            .await
            .with_context(|| format!("sending request to {url}"))?;

        let mut builder = Response::builder().status(response.status());
        if let Some(headers) = builder.headers_mut() {
            headers.extend(response.headers().clone());
        }
        let body = response.bytes().await.context("reading response body")?;
        builder.body(body).context("building response")
    }
}

impl Config for Provider {
    async fn get(&self, key: &str) -> Result<String> {
        match key {
            "API_URL" => Ok(self.config.api_url.clone()),
            _ => std::env::var(key).map_err(|e| anyhow!("{key} not configured: {e}")),
        }
    }
}

impl Identity for Provider {
    async fn access_token(&self) -> Result<String> {
        Ok(self.config.access_token.clone().unwrap_or_default())
    }
}

/// Opens camera sockets.
#[derive(Clone, Copy, Debug, Default)]
pub struct WsConnector;

impl StreamConnector for WsConnector {
    type Stream = WsStream;

    async fn connect(&self, url: &str) -> Result<WsStream> {
        let (inner, response) = tokio_tungstenite::connect_async(url)
            .await
            .with_context(|| format!("opening camera socket {url}"))?;
        tracing::debug!(status = %response.status(), "camera socket handshake complete");
        Ok(WsStream { inner, closed: false })
    }
}

pub struct WsStream {
    inner: WebSocketStream<MaybeTlsStream<TcpStream>>,
    closed: bool,
}

impl MediaStream for WsStream {
    async fn next_message(&mut self) -> Option<Result<StreamMessage>> {
        loop {
            let message = match self.inner.next().await? {
                Ok(message) => message,
                Err(e) => return Some(Err(e.into())),
            };
            if let Some(message) = translate(message) {
                return Some(Ok(message));
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        match self.inner.close(None).await {
            Ok(()) | Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                Ok(())
            }
            Err(e) => Err(e).context("closing camera socket"),
        }
    }
}

// Ping/pong are answered by tungstenite itself; raw frames never surface
// when reading.
fn translate(message: Message) -> Option<StreamMessage> {
    match message {
        Message::Binary(data) => Some(StreamMessage::Binary(data)),
        Message::Text(text) => Some(StreamMessage::Text(text.as_str().to_string())),
        Message::Close(frame) => {
            Some(StreamMessage::Close(frame.map(|f| f.reason.as_str().to_string())))
        }
        Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use tokio_tungstenite::tungstenite::protocol::CloseFrame;
    use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

    use super::*;

    #[test]
    fn translates_messages() {
        assert_eq!(
            translate(Message::Binary(Bytes::from_static(&[0xFF, 0xD8]))),
            Some(StreamMessage::Binary(Bytes::from_static(&[0xFF, 0xD8])))
        );
        assert_eq!(
            translate(Message::text(r#"{"event":"ptz"}"#)),
            Some(StreamMessage::Text(r#"{"event":"ptz"}"#.to_string()))
        );
        assert_eq!(
            translate(Message::Close(Some(CloseFrame {
                code: CloseCode::Away,
                reason: "camera offline".into(),
            }))),
            Some(StreamMessage::Close(Some("camera offline".to_string())))
        );
        assert_eq!(translate(Message::Close(None)), Some(StreamMessage::Close(None)));
        assert_eq!(translate(Message::Ping(Bytes::new())), None);
    }
}

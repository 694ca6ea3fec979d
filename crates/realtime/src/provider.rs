//! # Provider
//!
//! Provider defines external data interfaces for the crate.

use anyhow::Result;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use http::{Request, Response};

/// The `HttpRequest` trait defines the behavior for fetching data from a source.
pub trait HttpRequest: Send + Sync {
    /// Make outbound HTTP request.
    fn fetch(
        &self, request: Request<Bytes>,
    ) -> impl Future<Output = Result<Response<Bytes>>> + Send;
}

/// The `Config` trait is used by implementers to provide configuration to
/// dependent crates.
pub trait Config: Send + Sync {
    /// Request configuration setting.
    fn get(&self, key: &str) -> impl Future<Output = Result<String>> + Send;
}

pub trait Identity: Send + Sync {
    /// Bearer token for the REST API. An empty token disables the
    /// `Authorization` header.
    fn access_token(&self) -> impl Future<Output = Result<String>> + Send;
}

/// The `Clock` trait supplies wall-clock time so arrival timestamps can be
/// controlled in tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// System wall clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A single inbound message on a duplex media stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamMessage {
    /// One complete encoded image.
    Binary(Bytes),

    /// Out-of-band control payload.
    Text(String),

    /// The peer closed the stream, with an optional reason.
    Close(Option<String>),
}

/// An open duplex media stream.
pub trait MediaStream: Send + 'static {
    /// Wait for the next message. `None` means the transport has ended.
    fn next_message(&mut self) -> impl Future<Output = Option<Result<StreamMessage>>> + Send;

    /// Close the stream. Closing an already closed stream is not an error.
    fn close(&mut self) -> impl Future<Output = Result<()>> + Send;
}

/// The `StreamConnector` trait opens media streams to per-vehicle endpoints.
pub trait StreamConnector: Send + Sync + 'static {
    type Stream: MediaStream;

    /// Open a stream to `url`.
    fn connect(&self, url: &str) -> impl Future<Output = Result<Self::Stream>> + Send;
}

//! # Camera Stream Client
//!
//! Each client is an actor task owning at most one socket. The handle sends
//! start/stop commands and observes status and the latest frame through
//! `watch` channels, so a slow consumer only ever sees the newest frame.

use std::future::{self, Future};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, anyhow};
use realtime::{Clock, MediaStream, StreamConnector, StreamMessage};
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::fps::FpsCounter;
use crate::frame::CameraFrame;
use crate::state::{CameraStatus, StreamState};

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const FPS_WINDOW: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct CameraConfig {
    /// Limit on a single connection attempt. `None` waits indefinitely.
    pub connect_timeout: Option<Duration>,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self { connect_timeout: Some(DEFAULT_CONNECT_TIMEOUT) }
    }
}

#[derive(Debug)]
enum Command {
    Start(String),
    Stop,
}

/// Handle to a camera stream actor. Dropping it closes the socket and ends
/// the actor.
#[derive(Debug)]
pub struct CameraStream {
    commands: mpsc::UnboundedSender<Command>,
    status: watch::Receiver<CameraStatus>,
    frame: watch::Receiver<Option<CameraFrame>>,
}

impl CameraStream {
    /// Spawn an idle client. Must be called from within a Tokio runtime.
    pub fn spawn<C, K>(connector: C, clock: K, config: CameraConfig) -> Self
    where
        C: StreamConnector,
        K: Clock + 'static,
    {
        let (commands, rx) = mpsc::unbounded_channel();
        let (status_tx, status) = watch::channel(CameraStatus::default());
        let (frame_tx, frame) = watch::channel(None);

        let actor = Actor {
            connector: Arc::new(connector),
            clock,
            config,
            status: status_tx,
            frame: frame_tx,
            fps: FpsCounter::default(),
            connecting: None,
            stream: None,
            sequence: 0,
        };
        tokio::spawn(actor.run(rx));

        Self { commands, status, frame }
    }

    /// Connect to `url`. Ignored while a connection is being attempted or is
    /// open; from `Closed` or `Failed` a fresh connection is made.
    pub fn start(&self, url: impl Into<String>) {
        if self.commands.send(Command::Start(url.into())).is_err() {
            warn!("camera stream actor has ended");
        }
    }

    /// Close the connection and return to `Idle`. Safe to call in any state.
    pub fn stop(&self) {
        if self.commands.send(Command::Stop).is_err() {
            debug!("camera stream actor has ended");
        }
    }

    #[must_use]
    pub fn status(&self) -> CameraStatus {
        self.status.borrow().clone()
    }

    /// Wait for the next status change. Returns `false` once the actor has
    /// ended.
    pub async fn status_changed(&mut self) -> bool {
        self.status.changed().await.is_ok()
    }

    #[must_use]
    pub fn watch_status(&self) -> watch::Receiver<CameraStatus> {
        self.status.clone()
    }

    /// The most recent frame, if one arrived since the last start.
    #[must_use]
    pub fn latest_frame(&self) -> Option<CameraFrame> {
        self.frame.borrow().clone()
    }

    /// Wait for the next frame (or the slot being cleared).
    pub async fn frame_changed(&mut self) -> bool {
        self.frame.changed().await.is_ok()
    }
}

type Connecting<S> = Pin<Box<dyn Future<Output = anyhow::Result<S>> + Send>>;

struct Actor<C: StreamConnector, K> {
    connector: Arc<C>,
    clock: K,
    config: CameraConfig,
    status: watch::Sender<CameraStatus>,
    frame: watch::Sender<Option<CameraFrame>>,
    fps: FpsCounter,
    connecting: Option<Connecting<C::Stream>>,
    stream: Option<C::Stream>,
    sequence: u64,
}

impl<C, K> Actor<C, K>
where
    C: StreamConnector,
    K: Clock + 'static,
{
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        // the fps window runs for the client's lifetime, independent of
        // connection changes
        let mut fps_ticker = time::interval_at(Instant::now() + FPS_WINDOW, FPS_WINDOW);
        fps_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Start(url)) => self.start(url),
                    Some(Command::Stop) => self.stop().await,
                    None => {
                        self.stop().await;
                        break;
                    }
                },
                result = connecting(&mut self.connecting) => self.connected(result),
                message = receive(&mut self.stream) => self.on_message(message).await,
                _ = fps_ticker.tick() => self.roll_fps(),
            }
        }

        debug!("camera stream actor ended");
    }

    fn start(&mut self, url: String) {
        let state = self.status.borrow().state;
        if state.is_active() {
            debug!(%state, "camera stream already active, ignoring start");
            return;
        }

        // Closed and Failed pass through Idle before reconnecting
        if state != StreamState::Idle {
            self.status.send_modify(|s| *s = CameraStatus { fps: s.fps, ..CameraStatus::default() });
        }

        let connection_id = Uuid::new_v4();
        info!(%connection_id, url = %url, "connecting camera stream");

        self.sequence = 0;
        self.frame.send_if_modified(|frame| frame.take().is_some());
        self.status.send_modify(|s| {
            *s = CameraStatus {
                state: StreamState::Connecting,
                url: Some(url.clone()),
                connection_id: Some(connection_id),
                fps: s.fps,
                ..CameraStatus::default()
            };
        });

        let connector = Arc::clone(&self.connector);
        let timeout = self.config.connect_timeout;
        self.connecting = Some(Box::pin(async move {
            let connect = connector.connect(&url);
            match timeout {
                Some(limit) => time::timeout(limit, connect).await.map_err(|_elapsed| {
                    anyhow!(realtime::Error::Timeout(format!("exceeded {}ms", limit.as_millis())))
                })?,
                None => connect.await,
            }
            .with_context(|| format!("connecting to {url}"))
        }));
    }

    fn connected(&mut self, result: anyhow::Result<C::Stream>) {
        self.connecting = None;

        match result {
            Ok(stream) => {
                self.stream = Some(stream);
                let now = self.clock.now();
                self.status.send_modify(|s| {
                    s.state = StreamState::Connected;
                    s.connected_at = Some(now);
                });
                info!(monotonic_counter.camera_connections = 1, "camera stream connected");
            }
            Err(e) => {
                let reason = format!("{e:#}");
                warn!(monotonic_counter.camera_connect_failures = 1, "camera stream failed: {reason}");
                self.status.send_modify(|s| {
                    s.state = StreamState::Failed;
                    s.disconnect_reason = Some(reason);
                });
            }
        }
    }

    async fn on_message(&mut self, message: Option<anyhow::Result<StreamMessage>>) {
        match message {
            Some(Ok(StreamMessage::Binary(data))) => {
                self.sequence += 1;
                let frame = CameraFrame::new(data, self.clock.now(), self.sequence);
                self.frame.send_replace(Some(frame));
                self.fps.record_frame();
                self.status.send_modify(|s| {
                    s.state = StreamState::Receiving;
                    s.frames_received += 1;
                });
            }
            Some(Ok(StreamMessage::Text(text))) => match serde_json::from_str::<Value>(&text) {
                Ok(control) => {
                    self.status.send_modify(|s| s.last_control = Some(control));
                }
                Err(e) => {
                    debug!(monotonic_counter.camera_invalid_control = 1, "ignoring control message: {e}");
                }
            },
            Some(Ok(StreamMessage::Close(reason))) => {
                let reason = reason.filter(|r| !r.trim().is_empty());
                self.disconnected(reason.unwrap_or_else(|| "stream closed by camera".to_string()))
                    .await;
            }
            Some(Err(e)) => self.disconnected(format!("{e:#}")).await,
            None => self.disconnected("connection lost".to_string()).await,
        }
    }

    // The peer went away while the stream was still wanted. No reconnect:
    // the next start opens a fresh connection.
    async fn disconnected(&mut self, reason: String) {
        self.close().await;
        warn!(monotonic_counter.camera_disconnects = 1, "camera stream disconnected: {reason}");
        self.status.send_modify(|s| {
            s.state = StreamState::Closed;
            s.disconnect_reason = Some(reason);
        });
    }

    async fn stop(&mut self) {
        self.connecting = None;
        self.close().await;
        self.frame.send_if_modified(|frame| frame.take().is_some());
        self.status.send_if_modified(|s| {
            if s.state == StreamState::Idle && s.disconnect_reason.is_none() {
                return false;
            }
            *s = CameraStatus { fps: s.fps, ..CameraStatus::default() };
            true
        });
    }

    async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.close().await {
                debug!("closing camera stream: {e}");
            }
            info!("camera stream closed");
        }
    }

    fn roll_fps(&mut self) {
        let fps = self.fps.roll();
        self.status.send_if_modified(|s| {
            if s.fps == fps {
                return false;
            }
            s.fps = fps;
            true
        });
    }
}

// Pending forever when no connection attempt is in progress.
async fn connecting<S>(pending: &mut Option<Connecting<S>>) -> anyhow::Result<S> {
    match pending {
        Some(connect) => connect.await,
        None => future::pending().await,
    }
}

// Pending forever when no stream is open. `next_message` must be cancel safe.
async fn receive<S: MediaStream>(stream: &mut Option<S>) -> Option<anyhow::Result<StreamMessage>> {
    match stream {
        Some(stream) => stream.next_message().await,
        None => future::pending().await,
    }
}

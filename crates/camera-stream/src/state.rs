use std::fmt::{self, Display};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

/// Connection lifecycle.
///
/// `Idle -> Connecting -> Connected -> Receiving -> Closed`, with
/// `Connecting -> Failed` on connection error. `Closed` and `Failed` hold
/// until the next start or stop; stop from any state returns to `Idle`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamState {
    #[default]
    Idle,
    Connecting,
    Connected,
    Receiving,
    Closed,
    Failed,
}

impl StreamState {
    /// Whether a connection is being attempted or is open.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Connecting | Self::Connected | Self::Receiving)
    }
}

impl Display for StreamState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Receiving => "receiving",
            Self::Closed => "closed",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraStatus {
    pub state: StreamState,
    pub url: Option<String>,
    /// Identifies one connection attempt; changes on every start.
    pub connection_id: Option<Uuid>,
    pub connected_at: Option<DateTime<Utc>>,
    /// Frames received in the last complete one-second window.
    pub fps: u32,
    pub frames_received: u64,
    /// Human-readable reason the stream closed or failed.
    pub disconnect_reason: Option<String>,
    /// Most recent valid control message.
    pub last_control: Option<Value>,
}

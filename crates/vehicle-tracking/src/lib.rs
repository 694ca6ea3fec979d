//! # Vehicle Tracking
//!
//! Polls a vehicle's live position, classifies trip progress from the stop
//! list, and composes both into a renderer-agnostic map scene.

mod de;
mod history;
mod location;
mod request;

pub mod map;
pub mod monitor;
pub mod notifications;
pub mod poller;
pub mod progress;
pub mod trip;

pub use self::history::PositionHistory;
pub use self::location::*;
pub use self::monitor::{MonitorConfig, TripMonitor, TripSnapshot};
pub use self::poller::{LocationPoller, LocationSnapshot, OrderingPolicy, PollerConfig};
pub use self::progress::{Segment, TripProgress, TripStatus, derive_progress};
pub use self::trip::{StopKind, Trip, TripStop};

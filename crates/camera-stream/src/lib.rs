//! # Camera Stream
//!
//! Client for the per-vehicle live camera socket. Binary messages are
//! complete encoded images, text messages are JSON control payloads.

mod client;
mod fps;
mod frame;
mod state;

pub use self::client::{CameraConfig, CameraStream};
pub use self::fps::FpsCounter;
pub use self::frame::{CameraFrame, ImageFormat};
pub use self::state::{CameraStatus, StreamState};

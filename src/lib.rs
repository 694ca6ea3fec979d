//! # Fleet Tracker
//!
//! Host wiring for live vehicle tracking, trip progress and camera streams:
//! concrete providers, environment configuration, the session registry and
//! the HTTP snapshot API.

pub mod config;
pub mod http;
pub mod provider;
pub mod state;

pub use self::config::Config;
pub use self::state::AppState;

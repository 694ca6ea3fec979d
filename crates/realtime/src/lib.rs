//! # Realtime Core
//!
//! Error type and external data interfaces shared by the tracking crates.

mod error;
mod provider;

pub use crate::error::*;
pub use crate::provider::*;

//! mpris-indicator - follow and control MPRIS media players.
//!
//! Discovers every MPRIS player on the session bus, keeps a live model of
//! each one (status, track, artwork, position, volume, capabilities) and
//! surfaces a single "current" player for a panel indicator to display.
//!
//! ```rust,no_run
//! use mpris_indicator::services::mpris::{MprisConfig, MprisService};
//!
//! # async fn run() -> Result<(), mpris_indicator::services::MediaError> {
//! let service = MprisService::start(MprisConfig::default()).await?;
//! if let Some(player) = service.selected() {
//!     println!("{}: {}", player.identity, player.status_text("%a - %t"));
//! }
//! # Ok(())
//! # }
//! ```

#![cfg_attr(
    test,
    allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)
)]

/// Command-line front end.
pub mod cli;

/// Configuration schema and loading.
pub mod config;

/// Core error types and result aliases.
pub mod core;

/// Reactive services for system integration.
pub mod services;

/// Logging setup.
pub mod tracing_config;

/// Re-exported core types for convenience.
pub use core::{IndicatorError, Result};

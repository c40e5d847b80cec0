//! skyscale-core — shared configuration for Skyscale crates.
//!
//! Parses `skyscale.toml` into [`SkyscaleConfig`] and provides the
//! duration-string grammar (`"500ms"`, `"30s"`, `"5m"`, `"1h"`, `"30d"`)
//! used by every interval and TTL setting.

pub mod config;
pub mod duration;

pub use config::{HistoryConfig, LockSettings, ServerConfig, SkyscaleConfig};
pub use duration::{parse_duration, DurationError};

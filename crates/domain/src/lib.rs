//! Shared domain types for the calagent crates.
//!
//! Holds the workspace-wide error type, the duration-string parser used by
//! the wire payloads, user input, and persistence alike, the provider-agnostic
//! LM message types, and the configuration schema.

pub mod config;
pub mod duration;
pub mod error;
pub mod time;
pub mod tool;

pub use config::Config;
pub use duration::parse_duration_minutes;
pub use error::{Error, Result};
pub use time::parse_instant;

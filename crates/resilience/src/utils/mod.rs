//! Shared helpers
//!
//! - **[`serde`]**: serde adapters for durations in config structs

pub mod serde;

pub use self::serde::duration_millis;

//! Shared utilities.

mod duration;
mod hash;

pub use duration::{format_duration, parse_duration, DurationParseError};
pub use hash::content_hash;
pub(crate) use hash::short_token;

pub(crate) use duration::serde_duration;

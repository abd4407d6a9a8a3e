//! Shared types and error definitions for the ad-budget bot.

pub mod error;
pub mod types;

pub use error::{Error, SheetErrorKind};
pub use types::*;

/// Convenience Result alias.
pub type Result<T> = std::result::Result<T, Error>;

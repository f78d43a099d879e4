//! Bugtrack Common Library
//!
//! Wire model shared by the end-to-end suite and the reference backend:
//! bugs, comments, the closed status/priority enumerations and the error
//! body the API returns on rejection.

pub mod error;
pub mod types;

pub use error::{messages, Error, Result};
pub use types::*;

/// Bugtrack suite version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

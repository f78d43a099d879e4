//! Error types for the Bugtrack model

use thiserror::Error;

/// Result type alias using the model Error
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("invalid status: {0}")]
    InvalidStatus(String),

    #[error("invalid priority: {0}")]
    InvalidPriority(String),
}

/// Messages the API returns in `{"error": ...}` bodies.
pub mod messages {
    pub const TITLE_REQUIRED: &str = "title is required";
    pub const STATUS_REQUIRED: &str = "status is required";
    pub const PRIORITY_REQUIRED: &str = "priority is required";
    pub const INVALID_STATUS: &str = "invalid status";
    pub const INVALID_PRIORITY: &str = "invalid priority";
    pub const BUG_NOT_FOUND: &str = "bug not found";
    pub const INVALID_BUG_ID: &str = "invalid bug ID format";
    pub const TEXT_REQUIRED: &str = "text is required";
    pub const AUTHOR_REQUIRED: &str = "author is required";
}

//! Error types for stash-core

use thiserror::Error;

use crate::auth::AuthError;

/// Result type alias using stash-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in stash-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Auth provider rejected or failed the request
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Device/media-library permission was not granted
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Remote document store error
    #[error("Store error: {0}")]
    Store(String),

    /// Remote media endpoint error
    #[error("{0}")]
    Media(String),

    /// HTTP transport error
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// An action needs a signed-in user
    #[error("No user logged in")]
    NotSignedIn,

    /// Record not found in the local mirror
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Another mutation for the same record or action is still in flight
    #[error("Action already in progress: {0}")]
    Busy(String),

    /// A stored document could not be read as a record
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    /// Client configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

/// User-facing error classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Invalid credentials, malformed email, account exists.
    Auth,
    /// Recoverable by the user through OS settings.
    PermissionDenied,
    /// Any failure at the document-store or media boundary.
    NetworkOrStore,
    /// Everything else.
    Unknown,
}

impl Error {
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Auth(_) => ErrorKind::Auth,
            Self::PermissionDenied(_) => ErrorKind::PermissionDenied,
            Self::Store(_) | Self::Media(_) | Self::Http(_) | Self::InvalidRecord(_) => {
                ErrorKind::NetworkOrStore
            }
            Self::Serialization(_)
            | Self::Io(_)
            | Self::InvalidInput(_)
            | Self::NotSignedIn
            | Self::NotFound(_)
            | Self::Busy(_)
            | Self::Config(_) => ErrorKind::Unknown,
        }
    }
}

use std::path::PathBuf;

use thiserror::Error;

/// Why a listing attempt produced no usable image list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListFailure {
    PathNotFound,
    NetworkError,
    EmptyResult,
}

/// Why a single image could not be retrieved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchFailure {
    NotFound,
    NetworkError,
    AuthError,
}

/// Errors raised while enumerating a local or remote repository.
#[derive(Debug, Error)]
pub enum ListError {
    /// The configured local root is missing or is not a directory.
    #[error("image directory not found: {}", .0.display())]
    PathNotFound(PathBuf),

    /// The remote share could not be reached or answered with a failure status.
    #[error("listing request failed: {0}")]
    Network(String),

    /// The listing succeeded but produced no images.
    #[error("no images found in {0}")]
    Empty(String),
}

impl ListError {
    pub fn reason(&self) -> ListFailure {
        match self {
            Self::PathNotFound(_) => ListFailure::PathNotFound,
            Self::Network(_) => ListFailure::NetworkError,
            Self::Empty(_) => ListFailure::EmptyResult,
        }
    }
}

impl From<reqwest::Error> for ListError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network(err.to_string())
    }
}

/// Errors raised while retrieving one image.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("image not found: {0}")]
    NotFound(String),

    #[error("image request failed: {0}")]
    Network(String),

    /// Reading a local file failed.
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The remote share rejected the configured credentials.
    #[error("remote share refused credentials (HTTP {status})")]
    Auth { status: u16 },
}

impl FetchError {
    pub fn reason(&self) -> FetchFailure {
        match self {
            Self::NotFound(_) => FetchFailure::NotFound,
            Self::Network(_) => FetchFailure::NetworkError,
            Self::Io { source, .. } => match source.kind() {
                std::io::ErrorKind::NotFound => FetchFailure::NotFound,
                std::io::ErrorKind::PermissionDenied => FetchFailure::AuthError,
                _ => FetchFailure::NetworkError,
            },
            Self::Auth { .. } => FetchFailure::AuthError,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network(err.to_string())
    }
}

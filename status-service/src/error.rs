use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StatusServiceError {
    /// Another live registration already owns this name.
    #[error("status provider `{name}` is already registered")]
    AlreadyRegistered { name: String },

    #[error("status provider name must not be empty")]
    InvalidName,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read status service config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid status service config: {0}")]
    Parse(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, StatusServiceError>;

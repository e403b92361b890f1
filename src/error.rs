//! Error types for vmfactory.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using vmfactory's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in vmfactory operations.
#[derive(Error, Debug)]
pub enum Error {
    // State store errors
    /// Setting up or tearing down the template state store failed.
    #[error("storage error at {}: {message}", path.display())]
    Storage {
        /// State store path.
        path: PathBuf,
        /// What went wrong.
        message: String,
    },

    /// A template is already established at the path.
    #[error("a vm template already exists in {}", path.display())]
    AlreadyExists {
        /// State store path.
        path: PathBuf,
    },

    /// No established template at the path.
    #[error("no vm template in {}: {} is missing", path.display(), missing.display())]
    NotFound {
        /// State store path.
        path: PathBuf,
        /// First artifact that could not be found.
        missing: PathBuf,
    },

    // VM lifecycle errors
    /// Failed to boot a VM.
    #[error("vm boot failed: {0}")]
    Boot(String),

    /// Failed to disconnect from the guest agent.
    #[error("agent disconnect failed: {0}")]
    Disconnect(String),

    /// Failed to pause a VM.
    #[error("vm pause failed: {0}")]
    Pause(String),

    /// Failed to save VM memory and device state.
    #[error("vm save failed: {0}")]
    Save(String),

    /// Failed to boot a VM from a template.
    #[error("vm clone failed: {0}")]
    Clone(String),

    /// The factory strategy does not implement the operation.
    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),

    // Configuration errors
    /// VM configuration failed validation.
    #[error("invalid vm config: {0}")]
    InvalidConfig(String),

    /// Failed to load configuration.
    #[error("failed to load config: {0}")]
    ConfigLoad(String),

    // IO errors
    /// IO error wrapper.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a storage error for a path.
    pub fn storage(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Storage {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a boot error with a message.
    pub fn boot(msg: impl Into<String>) -> Self {
        Self::Boot(msg.into())
    }

    /// Create a clone error with a message.
    pub fn clone_failed(msg: impl Into<String>) -> Self {
        Self::Clone(msg.into())
    }

    /// Create an invalid config error with a message.
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }
}

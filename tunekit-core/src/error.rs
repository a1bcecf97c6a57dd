//! Error types for the tunekit-core crate.

use thiserror::Error;

/// Top-level error type for tunekit operations.
#[derive(Debug, Error)]
pub enum TuneError {
    /// The caller handed us a model this crate cannot safely handle.
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Tensor error: {0}")]
    Tensor(#[from] candle_core::Error),

    #[error("Hub error: {0}")]
    Hub(#[from] hf_hub::api::sync::ApiError),

    /// A configuration source could not be read or merged.
    #[error("Settings error: {0}")]
    Settings(#[from] Box<figment::Error>),
}

impl TuneError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn checkpoint(msg: impl Into<String>) -> Self {
        Self::Checkpoint(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }
}

/// Result alias used throughout the crate.
pub type Result<T, E = TuneError> = std::result::Result<T, E>;

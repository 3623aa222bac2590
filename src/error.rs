use std::io;
use thiserror::Error;

/// Tapwire application error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("Invalid setting {key}: {message}")]
    InvalidSetting { key: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("Server error: {0}")]
    Serve(#[source] io::Error),
}

impl Error {
    pub fn invalid_setting(key: impl Into<String>, message: impl ToString) -> Self {
        Self::InvalidSetting {
            key: key.into(),
            message: message.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

//! Error types for davmail-testkit

use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(
        "Missing {}: please create it with davmail.username and davmail.password \
         (or set DAVMAIL_URL to skip the file)",
        .path.display()
    )]
    MissingConfig { path: PathBuf },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("Invalid recipient '{recipient}': {reason}")]
    InvalidRecipient { recipient: String, reason: String },

    #[error("Message encoding error: {0}")]
    Encoding(String),

    #[error("Message parsing error: {0}")]
    Parse(String),

    /// Bootstrap failed earlier in this process; the original cause is
    /// kept and returned to every later caller.
    #[error("Test environment setup failed: {0}")]
    Setup(#[source] Arc<Error>),
}

impl Error {
    /// The underlying cause, looking through [`Error::Setup`].
    #[must_use]
    pub fn root(&self) -> &Self {
        match self {
            Self::Setup(inner) => inner.root(),
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

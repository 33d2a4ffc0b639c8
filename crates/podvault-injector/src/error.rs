//! Error taxonomy for the injector
//!
//! Every variant is terminal to the process: configuration problems
//! die before any network activity, authentication problems abort with
//! no retry, and the first resolution or write failure abandons the
//! whole batch.

use std::path::PathBuf;

/// Injector result type
pub type Result<T> = std::result::Result<T, Error>;

/// Injector errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Required parameter missing or invalid for the chosen auth mode
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Session negotiation with the vault failed
    #[error("authentication error: {0}")]
    Authentication(String),

    /// An auth mode accepted by validation but with no session branch
    #[error("authentication mode '{0}' is not implemented")]
    UnimplementedMode(String),

    /// Resource/account lookup or secret checkout failed
    #[error("resolution error: {0}")]
    Resolution(String),

    /// A staged secret file could not be written
    #[error("failed to write secret file {path}: {source}")]
    Write {
        /// Destination that failed
        path: PathBuf,
        /// Underlying I/O failure
        source: std::io::Error,
    },

    /// Transport failure talking to the vault
    #[error("vault request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

impl Error {
    /// Build a configuration error
    pub fn configuration(msg: impl Into<String>) -> Self {
        Error::Configuration(msg.into())
    }

    /// Build an authentication error
    pub fn authentication(msg: impl Into<String>) -> Self {
        Error::Authentication(msg.into())
    }

    /// Build a resolution error
    pub fn resolution(msg: impl Into<String>) -> Self {
        Error::Resolution(msg.into())
    }
}

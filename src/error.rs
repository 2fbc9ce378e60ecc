//! Crate-wide error type. Dispatch errors never escape the connection
//! service, they are turned into local responses instead (see
//! [`crate::http::response::LocalResponse::from_error`]). Startup errors
//! bubble up to `main` and stop the process.

use std::{io, time::Duration};

/// Everything that can go wrong in this crate.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Every backend failed its last health check.
    #[error("no healthy backends available")]
    NoHealthyBackends,

    /// The healthy prefix shrank between reading its length and reading one
    /// of its elements.
    #[error("backend index {index} out of range, only {healthy} healthy backends")]
    IndexOutOfRange { index: usize, healthy: usize },

    /// Connection refused, broken handshake, malformed response and so on.
    #[error("upstream request failed: {0}")]
    Upstream(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Upstream didn't send the response head in time.
    #[error("upstream did not respond within {0:?}")]
    UpstreamTimeout(Duration),

    /// Unknown algorithm, malformed backend list and other invalid options.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    /// Wraps any transport or protocol error from an outbound call.
    pub(crate) fn upstream(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Upstream(err.into())
    }

    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }
}

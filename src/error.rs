//! Error types for clickstream

use thiserror::Error;

/// Result type for clickstream operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for clickstream
#[derive(Debug, Error)]
pub enum Error {
    /// Request could not be sent (connection refused, DNS, timeout)
    #[error("Transport error: {context}")]
    Transport {
        context: String,
        #[source]
        source: Option<reqwest::Error>,
    },

    /// Endpoint answered with a non-success status
    #[error("HTTP {status} from {url}")]
    Http { status: u16, url: String },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// URL could not be parsed
    #[error("Invalid URL '{url}': {message}")]
    InvalidUrl { url: String, message: String },

    /// Host capability query failed (geolocation denied, battery API error)
    #[error("Capability '{capability}' failed: {message}")]
    Capability { capability: String, message: String },
}

impl Error {
    /// Create a transport error with context
    pub fn transport(context: impl Into<String>) -> Self {
        Self::Transport {
            context: context.into(),
            source: None,
        }
    }

    /// Create a transport error wrapping a reqwest failure
    pub fn transport_reqwest(context: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Transport {
            context: context.into(),
            source: Some(source),
        }
    }

    /// Create an invalid URL error
    pub fn invalid_url(url: impl Into<String>, message: impl ToString) -> Self {
        Self::InvalidUrl {
            url: url.into(),
            message: message.to_string(),
        }
    }

    /// Create a capability error
    pub fn capability(capability: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Capability {
            capability: capability.into(),
            message: message.into(),
        }
    }
}

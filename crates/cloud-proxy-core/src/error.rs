//! Error types for cloud-proxy

use thiserror::Error;

/// Result type alias using cloud-proxy-core's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed error used to carry the underlying cause of a collaborator failure
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Error taxonomy shared by the secrets and storage crates
#[derive(Error, Debug)]
pub enum Error {
    /// Remote secret retrieval failed; the cache is left unchanged
    #[error("unable to retrieve secret '{name}'")]
    SecretFetch {
        name: String,
        #[source]
        source: BoxError,
    },

    /// Source object metadata could not be read
    #[error("unable to read source file metadata for '{key}'")]
    MetadataFetch {
        key: String,
        #[source]
        source: BoxError,
    },

    /// A part transfer failed during a chunked copy and the session was aborted
    #[error("error staging blocks; copy aborted (part {part} of '{key}')")]
    Staging {
        key: String,
        part: u32,
        #[source]
        source: BoxError,
    },

    /// The final assemble-parts call failed after every part was staged
    #[error("unable to complete multipart upload for '{key}'")]
    Commit {
        key: String,
        #[source]
        source: BoxError,
    },

    /// Invalid parameters detected before any remote call
    #[error("invalid configuration: {message}")]
    Configuration { message: String },

    /// A pass-through provider call failed
    #[error("{operation} failed for '{target}'")]
    Provider {
        operation: &'static str,
        target: String,
        #[source]
        source: BoxError,
    },

    /// The operation observed cancellation of its enclosing scope
    #[error("{operation} cancelled for '{target}'")]
    Cancelled {
        operation: &'static str,
        target: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing error
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),
}

impl Error {
    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a secret fetch error wrapping the remote cause
    pub fn secret_fetch(name: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::SecretFetch {
            name: name.into(),
            source: source.into(),
        }
    }

    /// Create a metadata fetch error wrapping the remote cause
    pub fn metadata_fetch(key: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::MetadataFetch {
            key: key.into(),
            source: source.into(),
        }
    }

    /// Create a provider error for a pass-through call
    pub fn provider(
        operation: &'static str,
        target: impl Into<String>,
        source: impl Into<BoxError>,
    ) -> Self {
        Self::Provider {
            operation,
            target: target.into(),
            source: source.into(),
        }
    }

    /// Create a cancellation error
    pub fn cancelled(operation: &'static str, target: impl Into<String>) -> Self {
        Self::Cancelled {
            operation,
            target: target.into(),
        }
    }

    /// Whether this error is a configuration error
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration { .. })
    }

    /// Whether this error only reports observed cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

/// Non-success HTTP response returned by a REST endpoint
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("HTTP {status}: {body}")]
pub struct HttpStatusError {
    /// Response status code
    pub status: u16,
    /// Response body, truncated
    pub body: String,
}

impl HttpStatusError {
    const MAX_BODY: usize = 512;

    /// Create a status error, truncating long bodies
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        let mut body = body.into();
        if body.len() > Self::MAX_BODY {
            let mut cut = Self::MAX_BODY;
            while !body.is_char_boundary(cut) {
                cut -= 1;
            }
            body.truncate(cut);
        }
        Self { status, body }
    }

    /// Whether the endpoint reported the resource as missing
    pub fn is_not_found(&self) -> bool {
        self.status == 404
    }
}

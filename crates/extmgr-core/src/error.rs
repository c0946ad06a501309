//! Error types for extmgr-core

use thiserror::Error;

/// Result type alias using extmgr-core's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for extmgr
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing error (configuration file)
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),

    /// A release-file line that is neither a comment nor KEY=VALUE
    #[error("{path}:{line}: not a KEY=VALUE entry")]
    MalformedRelease { path: String, line: usize },

    /// Missing required key in a release file
    #[error("missing required key '{key}' in {path}")]
    MissingKey { key: String, path: String },

    /// Structurally invalid image metadata (sidecar or build manifest)
    #[error("malformed image metadata: {message}")]
    Metadata { message: String },

    /// Image file name without a recognized suffix
    #[error("image '{name}' has no supported suffix")]
    UnsupportedSuffix { name: String },

    /// Resource does not exist; soft error, callers may fall back
    #[error("'{resource}' not found")]
    NotFound { resource: String },

    /// External tool ran but did not terminate cleanly
    #[error("{tool} {status}")]
    Callout { tool: String, status: String },

    /// External tool could not be started at all
    #[error("failed to run {tool}: {source}")]
    CalloutSpawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    /// Unauthorized privileged request
    #[error("permission denied")]
    PermissionDenied,

    /// A metadata source yielded more than one record for a single image
    #[error("more than one metadata record found for '{image}'")]
    AmbiguousMetadata { image: String },
}

impl Error {
    /// Create a missing key error
    pub fn missing_key(key: impl Into<String>, path: impl Into<String>) -> Self {
        Self::MissingKey {
            key: key.into(),
            path: path.into(),
        }
    }

    /// Create a metadata error
    pub fn metadata(message: impl Into<String>) -> Self {
        Self::Metadata {
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    /// Whether this error means "the resource does not exist" rather than
    /// "something broke while getting it"
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

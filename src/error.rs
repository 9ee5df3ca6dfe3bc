//! Error types for switchboard.

/// Top-level error type for the router.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("State store error: {0}")]
    State(#[from] StateError),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),
}

/// Configuration-related errors. These surface only from `config load`-style
/// diagnostics; `config::load` itself never fails (see its doc comment).
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to parse {path}: {reason}")]
    ParseError { path: String, reason: String },

    #[error("IO error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// State-store errors. Per spec.md §4.1/§4.7, only *write* failures are
/// allowed to propagate; reads degrade to defaults and are never an `Err`.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("failed to create {path}: {source}")]
    CreateDir {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize {what}: {source}")]
    Serialize {
        what: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to delete {path}: {source}")]
    Delete {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Provider adapter errors — these are internal failures of the adapter
/// machinery itself (e.g. building a command), never a provider's own
/// classified failure, which is data (`ProviderResult`), not an exception.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("unknown provider name in config: {0}")]
    UnknownProvider(String),
}

/// Result type alias for the router.
pub type Result<T> = std::result::Result<T, Error>;

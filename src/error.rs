//! Error types for plugin-bridge

use thiserror::Error;

/// Result type alias for plugin-bridge
pub type Result<T> = std::result::Result<T, Error>;

/// plugin-bridge errors
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Manifest or spec could not be fetched
    #[error("Network error: {0}")]
    Network(String),

    /// Manifest or spec could not be parsed or validated
    #[error("Parse error: {0}")]
    Parse(String),

    /// Plugin API request failed below the HTTP layer
    #[error("Transport error: {0}")]
    Transport(String),

    /// LLM output did not follow the call convention
    #[error("Malformed call: {0}")]
    MalformedCall(String),

    /// A required parameter was not supplied
    #[error("Missing required parameter: {0}")]
    MissingParameter(String),

    /// HTTP method outside GET/POST
    #[error("Unsupported HTTP method: {0}")]
    UnsupportedMethod(String),

    /// Plugin not installed or not active
    #[error("Plugin not found: {0}")]
    PluginNotFound(String),

    /// Operation not present in the plugin's index
    #[error("Operation {operation} not found in plugin {plugin}")]
    OperationNotFound {
        /// Plugin name
        plugin: String,
        /// Operation id
        operation: String,
    },

    /// Active plugin limit reached
    #[error("Cannot activate {name}: active plugin limit of {limit} reached")]
    ActivationLimit {
        /// Plugin that was refused
        name: String,
        /// Configured limit
        limit: usize,
    },

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Whether the registry absorbs this error instead of propagating it.
    ///
    /// Lookup misses, capacity refusals, malformed LLM output and missing
    /// parameters only affect the single request that caused them.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::MalformedCall(_)
                | Self::MissingParameter(_)
                | Self::PluginNotFound(_)
                | Self::OperationNotFound { .. }
                | Self::ActivationLimit { .. }
        )
    }
}

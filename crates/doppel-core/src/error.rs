//! Error types for the doppel request-handling pipeline.

/// Result type alias used throughout `doppel-core`.
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy for the core pipeline, matching the failure categories a
/// resolved request can hit. Configuration loading is an external
/// collaborator's concern and is intentionally not represented here.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No resource and no root response matched the request; the router
    /// answers with 404.
    #[error("no resource matched the request")]
    NoMatch,

    /// A body matcher (JSONPath/XPath/regex) threw while evaluating a
    /// candidate resource. The matcher skips the resource rather than
    /// failing the request.
    #[error("resolution error evaluating resource {resource_id}: {message}")]
    Resolution {
        /// Identifier of the resource whose matcher failed.
        resource_id: String,
        /// Human-readable detail.
        message: String,
    },

    /// The configured script threw, or no script engine was available.
    #[error("script error in {script_path}: {message}")]
    Script {
        /// Path to the script file that failed.
        script_path: String,
        /// Human-readable detail.
        message: String,
    },

    /// A single capture's source evaluation threw. Absorbed by the capture
    /// engine; never fails the request.
    #[error("capture error for key '{key}': {message}")]
    Capture {
        /// The capture's configured key, if resolvable.
        key: String,
        /// Human-readable detail.
        message: String,
    },

    /// The response file was missing, escaped the plugin directory, or a
    /// template transformer threw.
    #[error("render error: {0}")]
    Render(String),

    /// The client disconnected or the flush failed.
    #[error("transmission error: {0}")]
    Transmission(String),

    /// A named store could not be opened, created, or round-tripped.
    #[error("store error: {0}")]
    Store(String),

    /// IO error, typically reading a response file.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialisation error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML (de)serialisation error.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Regex compile/evaluate error from a body matcher or capture source.
    #[error("regex error: {0}")]
    Regex(#[from] regex::Error),

    /// JavaScript engine error (only available with the `scripting` feature).
    #[cfg(feature = "scripting")]
    #[error("javascript error: {0}")]
    JavaScript(#[from] rquickjs::Error),

    /// Any other error not worth a dedicated variant.
    #[error("{0}")]
    Generic(String),
}

impl From<String> for Error {
    fn from(message: String) -> Self {
        Self::Generic(message)
    }
}

impl Error {
    /// Construct a [`Error::Resolution`].
    pub fn resolution<S: Into<String>>(resource_id: S, message: S) -> Self {
        Self::Resolution { resource_id: resource_id.into(), message: message.into() }
    }

    /// Construct a [`Error::Script`].
    pub fn script<S: Into<String>>(script_path: S, message: S) -> Self {
        Self::Script { script_path: script_path.into(), message: message.into() }
    }

    /// Construct a [`Error::Capture`].
    pub fn capture<S: Into<String>>(key: S, message: S) -> Self {
        Self::Capture { key: key.into(), message: message.into() }
    }

    /// Construct a [`Error::Store`].
    pub fn store<S: Into<String>>(message: S) -> Self {
        Self::Store(message.into())
    }

    /// Construct a [`Error::Render`].
    pub fn render<S: Into<String>>(message: S) -> Self {
        Self::Render(message.into())
    }

    /// HTTP status code a client-visible error should be reported as.
    /// Capture/resolution errors never reach this point — they are absorbed
    /// upstream by the capture engine and matcher — so they map to 500 only
    /// defensively, in case a caller surfaces one directly.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::NoMatch => 404,
            _ => 500,
        }
    }
}

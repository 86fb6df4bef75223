/// Shared error type used across all orchestrator crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP: {0}")]
    Http(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("provider {provider}: {message}")]
    Provider { provider: String, message: String },

    /// The remote model rejected the request for rate-limit reasons.
    /// C3 translates this into a backoff, not process termination.
    #[error("throttled by {model_id}")]
    Throttled { model_id: String },

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("task not found: {0}")]
    TaskNotFound(String),

    #[error("tool not found: {0}")]
    ToolNotFound(String),

    #[error("config: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether this error should crash the worker process per the error
    /// taxonomy (throttling is recoverable; everything else here is not).
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::Throttled { .. })
    }
}

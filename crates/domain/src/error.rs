/// Shared error type used across all crates in the engine.
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

    #[error("config: {0}")]
    Config(String),

    #[error("auth: {0}")]
    Auth(String),

    /// A downstream dependency (LLM provider, catalog store) failed in a
    /// way that is reasonable to retry — callers should not treat this as
    /// a permanent failure of the request.
    #[error("transient dependency failure: {0}")]
    TransientDependency(String),

    /// Request payload failed a field-level validation rule.
    #[error("validation failed for '{field}': {message}")]
    Validation { field: String, message: String },

    /// The referenced entity (session, product, order, transcript) does
    /// not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The authenticated principal does not hold the role/claim required
    /// for the requested operation.
    #[error("authorization denied")]
    AuthorizationDenied,

    /// The requested state transition or write conflicts with the
    /// entity's current state (e.g. cancelling an already-fulfilled order).
    #[error("conflict: {0}")]
    Conflict(String),

    /// An unexpected internal failure with no more specific variant.
    #[error("internal: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;

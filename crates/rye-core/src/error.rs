use std::path::PathBuf;

/// The closed error taxonomy for the trust-and-resolution engine.
///
/// Every fallible operation in this crate returns one of these variants (or
/// a narrower enum, such as [`crate::chain::ChainError`], that converts into
/// one). Nothing in this crate logs or swallows an error internally; every
/// failure is handed to the caller with full diagnostic context attached.
#[derive(Debug, thiserror::Error)]
pub enum RyeError {
    #[error("{path}: no signature found")]
    Unsigned { path: PathBuf },

    #[error("{path}: content hash mismatch (expected {expected}, got {actual})")]
    HashMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("{path}: signing key {fingerprint} is not in the trust store")]
    UntrustedKey { path: PathBuf, fingerprint: String },

    #[error("{path}: signature does not verify against key {fingerprint}")]
    SignatureInvalid { path: PathBuf, fingerprint: String },

    #[error("{item_type} '{logical_id}' was not found in any tier")]
    ItemNotFound {
        item_type: String,
        logical_id: String,
    },

    #[error("executor '{executor_id}' could not be resolved")]
    ExecutorNotFound { executor_id: String },

    #[error("'{logical_id}' has no executor_id and is not a primitive")]
    MissingExecutor { logical_id: String },

    #[error("circular executor chain detected: {}", path.join(" -> "))]
    CircularDependency { path: Vec<String> },

    #[error("executor chain exceeded maximum depth of {max_depth} starting at '{start}'")]
    ChainTooDeep { start: String, max_depth: usize },

    #[error("validation failed: {0}")]
    ValidationFailed(String),

    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    #[error("invalid lockfile at {path}: {reason}")]
    InvalidLockfile { path: PathBuf, reason: String },

    #[error("capability '{required}' is not granted by this token")]
    CapabilityDenied { required: String },

    #[error("token for '{subject}' expired at {expired_at}")]
    TokenExpired { subject: String, expired_at: String },

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("canonicalization failed: {0}")]
    Canonicalization(String),
}

pub type Result<T> = std::result::Result<T, RyeError>;

impl RyeError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        RyeError::Io {
            path: path.into(),
            source,
        }
    }
}

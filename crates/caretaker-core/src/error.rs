//! Error types for `caretaker-core`.
//!
//! Each error variant carries enough context to diagnose the problem without
//! a debugger. Token errors never include token material — only the reason a
//! token was rejected.

/// Errors from session token operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The token failed signature or structural validation.
    #[error("invalid session token: {reason}")]
    Invalid { reason: String },

    /// The token's expiry timestamp has passed.
    #[error("session token expired")]
    Expired,

    /// The token's identifier is present in the revocation store.
    #[error("session token revoked")]
    Revoked,

    /// Signing or serializing a new token failed.
    #[error("token encoding failed: {reason}")]
    Encoding { reason: String },
}

/// Errors from the revoked-token store.
#[derive(Debug, thiserror::Error)]
pub enum RevocationError {
    /// The backing store could not be reached or returned an error.
    #[error("revocation store unavailable: {reason}")]
    Unavailable { reason: String },
}

impl From<redis::RedisError> for RevocationError {
    fn from(err: redis::RedisError) -> Self {
        Self::Unavailable {
            reason: err.to_string(),
        }
    }
}

/// Errors from the central analytics store.
#[derive(Debug, thiserror::Error)]
pub enum CentralStoreError {
    /// A query against the SQLite file failed.
    #[error("central store query failed: {0}")]
    Query(#[from] sqlx::Error),
}

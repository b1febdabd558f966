//! Engine error types
//!
//! Every failure crossing the engine boundary is a value of [`ChittaError`].
//! There is no unwinding across the boundary; internal paths return
//! [`Result`] and propagate explicitly.

use crate::primitives::NodeId;

/// Engine error type
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum ChittaError {
    /// The file header is missing, truncated, or carries a bad magic
    #[error("Corrupt header: {0}")]
    CorruptHeader(String),
    /// The on-disk format version is newer than this engine understands
    #[error("Incompatible version: found {found}, current {current}")]
    IncompatibleVersion { found: u32, current: u32 },
    /// Persistence failure
    #[error("IO failure: {0}")]
    IoFailure(#[from] std::io::Error),
    /// Referenced node is not in the index
    #[error("Unknown node: {0}")]
    UnknownNode(NodeId),
    /// Referenced tag has no postings
    #[error("Unknown tag: {0}")]
    UnknownTag(String),
    /// Referenced realm is not in the realm tree
    #[error("Unknown realm: {0}")]
    UnknownRealm(String),
    /// Validation failure at the API boundary
    #[error("Invalid params: {0}")]
    InvalidParams(String),
    /// A required parameter was not supplied
    #[error("Missing required parameter: {0}")]
    MissingRequired(String),
    /// Text operation requested without an attached embedder
    #[error("No embedder attached")]
    NoEmbedder,
    /// Mutation refused on an invariant or belief node
    #[error("Protected node: {0}")]
    Protected(NodeId),
    /// Type or global quota refused the insert
    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),
    /// Contradictory facts detected at write time; both are recorded
    #[error("Conflict: {0}")]
    Conflict(String),
}

/// Engine result type
pub type Result<T> = std::result::Result<T, ChittaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ChittaError::IncompatibleVersion { found: 9, current: 3 };
        assert_eq!(err.to_string(), "Incompatible version: found 9, current 3");

        let err = ChittaError::NoEmbedder;
        assert_eq!(err.to_string(), "No embedder attached");
    }
}

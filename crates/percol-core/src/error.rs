//! Error types for the graph engine and containment extension.

use crate::store::NodeId;

/// Engine-level error.
///
/// Node *removal* by identifier is deliberately not represented here:
/// deleting an absent node is a no-op, not an error, so deletion calls
/// are idempotent by id.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    /// A construction or call argument is out of range.
    #[error("invalid parameter {what}: {value}")]
    InvalidParameter {
        /// Name of the offending parameter.
        what: &'static str,
        /// Rendered value.
        value: String,
    },

    /// An operation referenced a node id that is not in the active set,
    /// where the contract requires it to exist.
    #[error("unknown node {0}")]
    UnknownNode(NodeId),

    /// A sampling operation could not satisfy the requested count from
    /// the available pool.
    #[error("insufficient nodes: requested {requested}, only {available} available")]
    InsufficientNodes {
        /// How many nodes the caller asked for.
        requested: usize,
        /// How many were actually available.
        available: usize,
    },

    /// An internal consistency check failed. Always surfaced to the
    /// caller, never silently patched.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, GraphError>;

use thiserror::Error;

/// Errors surfaced by the join optimization core.
///
/// Most optimizer-internal failures are non-fatal and are absorbed by
/// demoting the offending candidate (see `spec.md` §7); this enum is
/// reserved for the cases that must propagate to the caller.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OptimizerError {
    /// The statistics provider had no data for a table or column.
    /// Non-fatal: callers that hit this in `Coster`/`Carder` fall back
    /// to the default row-count estimate instead of propagating it.
    #[error("statistics unavailable for {0}")]
    StatsUnavailable(String),

    /// A logical node reached optimization with no physical expansion.
    #[error("no physical expansion for operator: {0}")]
    UnsupportedOperator(String),

    /// A merge-join's range expression type didn't match its index's
    /// column type. The candidate is demoted (cost = +infinity) rather
    /// than the query failing; this variant exists for diagnostics.
    #[error("index type mismatch for index {index}: expected {expected}, found {found}")]
    IndexTypeMismatch {
        index: String,
        expected: String,
        found: String,
    },

    /// A hint referenced an unknown table or had the wrong arity.
    /// Recoverable: the hint is dropped and optimization continues.
    #[error("invalid hint {hint}: {reason}")]
    InvalidHint { hint: String, reason: String },

    /// The host-provided cancellation signal fired mid-optimization.
    #[error("optimization cancelled")]
    Cancelled,

    /// A broken invariant: duplicate group id, best-plan selection on
    /// an unfinished group, unknown operator dispatch. Always fatal.
    #[error("internal optimizer error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, OptimizerError>;

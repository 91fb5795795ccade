use thiserror::Error;

use crate::key::Key;

/// Failure taxonomy for batch loading. Errors are cloneable because a
/// deferred result memoizes its outcome: every subsequent force of the same
/// cell observes the same failure. Nothing in this crate retries; a caller
/// that wants a retry issues a fresh resolve in a new round.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    /// The bulk fetch for a round failed. All keys pending in that round
    /// observe this error when forced.
    #[error("bulk fetch failed: {0}")]
    Fetch(String),

    /// A fetched record could not be translated into an application value.
    /// Scoped to the one key; sibling keys in the same round are unaffected.
    #[error("failed to translate record for {key}: {message}")]
    Translation { key: Key, message: String },

    /// A per-key result was forced before its round executed. Accumulation
    /// never issues a fetch on its own; call `Loader::execute` first.
    #[error("result for {0} forced before its round executed")]
    NotExecuted(Key),

    /// A deferred cell was forced while its own computation was in flight.
    /// This is how a malformed load cycle surfaces instead of looping.
    #[error("re-entrant force of an in-flight deferred result")]
    Cycle,

    /// The reference was never wired to a load, so there is nothing to force.
    #[error("reference to {0} was never loaded")]
    Unloaded(Key),

    /// The unit of work that owned this round was dropped before the result
    /// was forced.
    #[error("owning session was discarded before this result was forced")]
    SessionGone,
}

//! Error types for the resolution engine
//!
//! Infeasibility is not an error: lattice operations signal "no admissible
//! binding" with `None` and the resolver silently drops the branch. Only
//! engine-internal invariant violations surface through [`ResolveError`].

use crate::types::VarId;
use miette::Diagnostic;
use thiserror::Error;

/// Result type for engine operations that may hit an internal failure
pub type ResolveResult<T> = Result<T, ResolveError>;

/// Engine-internal failures
///
/// Every variant here indicates a broken invariant, never an unsatisfiable
/// constraint set. An unsatisfiable constraint set simply produces an empty
/// solution holder.
#[derive(Error, Diagnostic, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("cannot combine bindings from different variable universes")]
    #[diagnostic(
        code(generify::resolve::foreign_binding),
        help("Bindings are only composable within the resolution run that created them")
    )]
    ForeignBinding,

    #[error("variable {var} is outside the bound-variable universe")]
    #[diagnostic(
        code(generify::resolve::unknown_variable),
        help("Constraints may only mention variables allocated from the run's universe")
    )]
    UnknownVariable { var: VarId },

    #[error("cycle collapse produced conflicting bindings for {var}")]
    #[diagnostic(
        code(generify::resolve::inconsistent_collapse),
        help("A strongly connected component of variable constraints collapsed onto incompatible types")
    )]
    InconsistentCycleCollapse { var: VarId },
}

//! A CDCL-based dependency solver over pooled identifiers.
//!
//! Package names, version sets, and candidates are interned into a [`Pool`]
//! and addressed by dense integer ids. A [`DependencyProvider`] supplies
//! candidates and dependencies on demand; the [`Solver`] runs boolean
//! satisfiability over candidate literals with watched-literal unit
//! propagation, 1-UIP clause learning, and non-chronological backtracking.
//! When no assignment exists, a [`Conflict`] graph explains why.

pub use crate::arena::Arena;
pub use crate::conflict::{
    Conflict, ConflictCause, ConflictEdge, ConflictGraph, ConflictNode, DisplayUnsat,
};
pub use crate::ids::{
    ArenaId, ClauseId, LearntClauseId, NameId, SolvableId, StringId, VersionSetId,
};
pub use crate::pool::{PackageSolvable, Pool, Solvable};
pub use crate::provider::{Candidates, Dependencies, DependencyProvider};
pub use crate::solver::{Solver, UnsolvableOrCancelled};

mod arena;
mod conflict;
mod ids;
mod pool;
mod provider;
mod solver;

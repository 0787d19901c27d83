//! Dependency Graph
//!
//! This module implements the dependency graph that tracks relationships
//! between signals, computeds and effects, and the ownership tree that
//! decides when they are torn down.
//!
//! # Overview
//!
//! - Nodes represent sources (signals) or computations (computeds, effects).
//! - Edges represent dependencies: if A reads B, B lists A as a subscriber
//!   and A lists B, with the version it saw, as a dependency.
//! - Scopes own computations. Edges are plain id sets and never own anything.
//!
//! # Design Decisions
//!
//! 1. Nodes live in a central arena keyed by [`NodeId`] rather than behind
//!    `Rc` pointers to each other, so there are no reference cycles and
//!    disposal is the only thing that removes a node.
//!
//! 2. Ids are never reused. A handle to a disposed node finds nothing and
//!    reports it instead of reading someone else's data.
//!
//! 3. Dependency lists are replaced wholesale after every evaluation, so
//!    edges from branches that were not taken disappear.

mod node;
mod scheduler;
mod scope;
mod snapshot;

pub use node::{Dependency, NodeId, NodeKind, NodeState};
pub use scope::ScopeId;
pub use snapshot::{GraphSnapshot, NodeSnapshot, ScopeSnapshot};

pub(crate) use node::Computation;
pub(crate) use scheduler::{Released, Scheduler};
pub(crate) use scope::ScopeCleanup;

//! Ownership Scopes
//!
//! Scopes form a tree that owns computeds and effects. The tree is the only
//! owner-of-record for nodes: subscriber and dependency edges never keep a
//! node alive.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use super::NodeId;

/// Unique identifier for a scope in the ownership tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct ScopeId(u64);

impl ScopeId {
    /// Generate a new unique scope ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for ScopeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scope#{}", self.0)
    }
}

/// A scope record in the graph.
#[derive(Debug)]
pub(crate) struct ScopeNode {
    id: ScopeId,

    pub(crate) parent: Option<ScopeId>,

    /// Set when this is the private scope of a computed or effect.
    pub(crate) owner_node: Option<NodeId>,

    /// Child scopes, in creation order.
    pub(crate) children: Vec<ScopeId>,

    /// Directly owned nodes, in creation order.
    pub(crate) nodes: Vec<NodeId>,

    /// Cleanups registered on the scope, in registration order.
    pub(crate) cleanups: Vec<ScopeCleanup>,
}

/// A user cleanup attached to a scope.
pub(crate) struct ScopeCleanup(pub(crate) Box<dyn FnOnce()>);

impl fmt::Debug for ScopeCleanup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ScopeCleanup")
    }
}

impl ScopeNode {
    pub fn new(parent: Option<ScopeId>, owner_node: Option<NodeId>) -> Self {
        Self {
            id: ScopeId::new(),
            parent,
            owner_node,
            children: Vec::new(),
            nodes: Vec::new(),
            cleanups: Vec::new(),
        }
    }

    pub fn id(&self) -> ScopeId {
        self.id
    }
}

//! Graph Snapshots
//!
//! A read-only, serializable view of the dependency graph for debugging and
//! inspection tools. Taking a snapshot never evaluates or marks anything.

use serde::Serialize;

use super::{Dependency, NodeId, NodeKind, NodeState, ScopeId};

/// A point-in-time copy of the whole graph, sorted by id.
#[derive(Debug, Clone, Serialize)]
pub struct GraphSnapshot {
    /// The current write epoch.
    pub epoch: u64,
    pub nodes: Vec<NodeSnapshot>,
    pub scopes: Vec<ScopeSnapshot>,
    /// Effects queued for the next flush, in run order.
    pub pending_effects: Vec<NodeId>,
}

/// One node of a [`GraphSnapshot`].
#[derive(Debug, Clone, Serialize)]
pub struct NodeSnapshot {
    pub id: NodeId,
    pub kind: NodeKind,
    pub state: NodeState,
    pub version: u64,
    pub dependencies: Vec<Dependency>,
    pub subscribers: Vec<NodeId>,
    pub owner: Option<ScopeId>,
    pub queued: bool,
    pub failed: bool,
}

/// One scope of a [`GraphSnapshot`].
#[derive(Debug, Clone, Serialize)]
pub struct ScopeSnapshot {
    pub id: ScopeId,
    pub parent: Option<ScopeId>,
    /// Set for the private scope of a computed or effect.
    pub owner_node: Option<NodeId>,
    pub children: Vec<ScopeId>,
    pub nodes: Vec<NodeId>,
    /// Number of cleanups registered on the scope.
    pub cleanups: usize,
}

impl GraphSnapshot {
    /// Look up a node by id.
    pub fn node(&self, id: NodeId) -> Option<&NodeSnapshot> {
        self.nodes
            .binary_search_by_key(&id, |node| node.id)
            .ok()
            .map(|index| &self.nodes[index])
    }

    /// Look up a scope by id.
    pub fn scope(&self, id: ScopeId) -> Option<&ScopeSnapshot> {
        self.scopes
            .binary_search_by_key(&id, |scope| scope.id)
            .ok()
            .map(|index| &self.scopes[index])
    }
}

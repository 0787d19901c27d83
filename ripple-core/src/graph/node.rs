//! Graph Nodes
//!
//! This module defines the records that live in the dependency graph arena.
//! A node carries identity, version, dirty state and edges; the typed value
//! and the user closure live in the handle's shared state and are reached
//! through the [`Computation`] trait object.

use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexSet;
use serde::Serialize;
use smallvec::SmallVec;

use super::ScopeId;

/// Unique identifier for a node in the dependency graph.
///
/// Ids come from a process-wide monotonic counter and are never reused, so a
/// stale handle can never alias a newer node. Ordering follows creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct NodeId(u64);

impl NodeId {
    /// Generate a new unique node ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// The kind of node in the dependency graph.
///
/// Computeds and effects share one refresh algorithm and differ only in
/// whether the scheduler pulls them (`Lazy`) or pushes them (`Eager`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NodeKind {
    /// A writable leaf (signal). Has dependents, never dependencies.
    Source,

    /// A memoized derived value (computed). Recomputed only when read.
    Lazy,

    /// A side-effecting subscriber (effect). Re-run by the scheduler.
    Eager,
}

impl NodeKind {
    /// Whether nodes of this kind run a computation.
    pub fn is_derived(self) -> bool {
        !matches!(self, NodeKind::Source)
    }
}

/// Dirty state of a node.
///
/// The first three variants are ordered by severity so that marking can only
/// ever raise a node's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum NodeState {
    /// The cached value is up to date.
    Clean,

    /// Some transitive dependency changed. The node must walk its
    /// dependencies before deciding whether to re-run.
    Checking,

    /// A direct dependency changed. The node must re-run.
    Dirty,

    /// The node's computation is on the stack right now.
    Evaluating,
}

/// A dependency edge as observed by the reading node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Dependency {
    /// The node that was read.
    pub node: NodeId,
    /// That node's version at the time of the read.
    pub version: u64,
}

/// Type-erased behaviour of a computed or effect.
///
/// Implementations own the user closure and the cached value. None of these
/// methods may be called while the graph is borrowed.
pub(crate) trait Computation {
    /// Run the user function. Returns `true` when the observable value changed.
    fn run(&self) -> bool;

    /// Release per-run resources before the next run.
    fn cleanup(&self) {}

    /// Release everything; the node has left the graph.
    fn dispose(&self);
}

/// A node in the dependency graph.
pub(crate) struct Node {
    id: NodeId,
    kind: NodeKind,
    pub(crate) state: NodeState,
    pub(crate) version: u64,

    /// Nodes read during the last evaluation, in read order.
    pub(crate) dependencies: SmallVec<[Dependency; 4]>,

    /// Nodes that read this node during their last evaluation.
    pub(crate) subscribers: IndexSet<NodeId>,

    /// The scope this node was registered under.
    pub(crate) owner: Option<ScopeId>,

    /// The scope owning nodes created while this node runs.
    pub(crate) scope: Option<ScopeId>,

    pub(crate) computation: Option<Rc<dyn Computation>>,

    /// Sitting in the scheduler's effect queue.
    pub(crate) queued: bool,

    /// A dependency changed while this node was evaluating.
    pub(crate) stale: bool,

    /// The last evaluation panicked or a dependency failed.
    pub(crate) failed: bool,
}

impl Node {
    /// Create a new source (signal) node.
    pub fn source() -> Self {
        Self::new(NodeKind::Source, None, None)
    }

    /// Create a computed or effect node. It starts dirty so the first read
    /// (or the scheduler) runs it.
    pub fn derived(kind: NodeKind, owner: Option<ScopeId>, computation: Rc<dyn Computation>) -> Self {
        Self::new(kind, owner, Some(computation))
    }

    fn new(kind: NodeKind, owner: Option<ScopeId>, computation: Option<Rc<dyn Computation>>) -> Self {
        Self {
            id: NodeId::new(),
            kind,
            state: match kind {
                NodeKind::Source => NodeState::Clean,
                NodeKind::Lazy | NodeKind::Eager => NodeState::Dirty,
            },
            version: 0,
            dependencies: SmallVec::new(),
            subscribers: IndexSet::new(),
            owner,
            scope: None,
            computation,
            queued: false,
            stale: false,
            failed: false,
        }
    }

    /// Get the node's ID.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Get the node's kind.
    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    /// Raise the node's state to at least `state`.
    ///
    /// Returns `true` when subscribers have not heard about this change yet:
    /// the node was clean, or it is mid-evaluation and will come out stale.
    pub fn mark(&mut self, state: NodeState) -> bool {
        match self.state {
            NodeState::Evaluating => {
                self.stale = true;
                true
            }
            current if current < state => {
                self.state = state;
                current == NodeState::Clean
            }
            _ => false,
        }
    }

    /// Whether the dependency list mentions `id`.
    pub fn depends_on(&self, id: NodeId) -> bool {
        self.dependencies.iter().any(|dep| dep.node == id)
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("state", &self.state)
            .field("version", &self.version)
            .field("dependencies", &self.dependencies)
            .field("subscribers", &self.subscribers)
            .field("owner", &self.owner)
            .field("queued", &self.queued)
            .field("failed", &self.failed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;

    impl Computation for Noop {
        fn run(&self) -> bool {
            false
        }

        fn dispose(&self) {}
    }

    #[test]
    fn node_ids_are_unique_and_ordered() {
        let id1 = NodeId::new();
        let id2 = NodeId::new();
        assert_ne!(id1, id2);
        assert!(id1 < id2);
    }

    #[test]
    fn source_node_starts_clean() {
        let node = Node::source();
        assert_eq!(node.kind(), NodeKind::Source);
        assert_eq!(node.state, NodeState::Clean);
    }

    #[test]
    fn derived_node_starts_dirty() {
        let node = Node::derived(NodeKind::Lazy, None, Rc::new(Noop));
        assert_eq!(node.kind(), NodeKind::Lazy);
        assert_eq!(node.state, NodeState::Dirty);
    }

    #[test]
    fn marking_only_raises_state() {
        let mut node = Node::derived(NodeKind::Lazy, None, Rc::new(Noop));
        node.state = NodeState::Clean;

        // First mark from clean reports that subscribers need to hear about it
        assert!(node.mark(NodeState::Checking));
        assert_eq!(node.state, NodeState::Checking);

        // Raising further does not re-notify
        assert!(!node.mark(NodeState::Dirty));
        assert_eq!(node.state, NodeState::Dirty);

        // Lowering is ignored
        assert!(!node.mark(NodeState::Checking));
        assert_eq!(node.state, NodeState::Dirty);
    }

    #[test]
    fn marking_an_evaluating_node_flags_it_stale() {
        let mut node = Node::derived(NodeKind::Eager, None, Rc::new(Noop));
        node.state = NodeState::Evaluating;

        assert!(node.mark(NodeState::Dirty));
        assert_eq!(node.state, NodeState::Evaluating);
        assert!(node.stale);
    }
}

//! Update Scheduler
//!
//! The scheduler owns the node arena, the scope tree and the effect queue.
//! It never calls user code: every method runs while the runtime holds the
//! graph borrow, and anything that must run user code (computations,
//! cleanups) is handed back to the caller instead.
//!
//! # Algorithm
//!
//! Propagation is push-pull:
//!
//! 1. When a source changes, its version is bumped and its direct
//!    subscribers are marked `Dirty`.
//! 2. Everything further downstream is marked `Checking`, breadth-first.
//!    A node that was already non-clean stops the walk; its subscribers have
//!    already been told.
//! 3. Effects reached by the walk are queued, tagged with the write epoch.
//! 4. Nothing is recomputed here. Computeds resolve when pulled; a `Checking`
//!    node compares the versions it observed against its dependencies'
//!    current versions before deciding to re-run.

use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::Rc;

use smallvec::SmallVec;

use super::node::{Computation, Dependency, Node, NodeId, NodeKind, NodeState};
use super::scope::{ScopeCleanup, ScopeId, ScopeNode};
use super::snapshot::{GraphSnapshot, NodeSnapshot, ScopeSnapshot};

/// An effect waiting for the next flush.
///
/// Ordered by the write epoch that first dirtied it, then by creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct PendingEffect {
    epoch: u64,
    node: NodeId,
}

/// Something disposal handed back to the runtime to finish outside the
/// graph borrow.
pub(crate) enum Released {
    /// A removed computed or effect whose `dispose` must run.
    Node {
        id: NodeId,
        computation: Rc<dyn Computation>,
    },
    /// A cleanup registered on a removed or reset scope.
    Cleanup { scope: ScopeId, cleanup: ScopeCleanup },
}

/// The update scheduler manages the dependency graph and coordinates updates.
#[derive(Debug, Default)]
pub(crate) struct Scheduler {
    /// All live nodes, indexed by ID.
    nodes: HashMap<NodeId, Node>,

    /// All live scopes, indexed by ID.
    scopes: HashMap<ScopeId, ScopeNode>,

    /// Effects to run on the next flush.
    pending: Vec<PendingEffect>,

    /// Bumped by every effective source write.
    epoch: u64,
}

impl Scheduler {
    /// Create a new empty scheduler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a source node. Sources are not owned by any scope.
    pub fn add_source(&mut self) -> NodeId {
        let node = Node::source();
        let id = node.id();
        self.nodes.insert(id, node);
        id
    }

    /// Add a computed or effect node under `owner`, together with the private
    /// scope that will own whatever it creates while running.
    pub fn add_derived(
        &mut self,
        kind: NodeKind,
        owner: Option<ScopeId>,
        computation: Rc<dyn Computation>,
    ) -> NodeId {
        let owner = owner.filter(|scope| self.scopes.contains_key(scope));
        let mut node = Node::derived(kind, owner, computation);
        let id = node.id();

        let private = ScopeNode::new(None, Some(id));
        node.scope = Some(private.id());
        self.scopes.insert(private.id(), private);

        if let Some(scope) = owner.and_then(|owner| self.scopes.get_mut(&owner)) {
            scope.nodes.push(id);
        }

        self.nodes.insert(id, node);
        id
    }

    /// Add a root scope.
    pub fn add_root_scope(&mut self) -> ScopeId {
        let scope = ScopeNode::new(None, None);
        let id = scope.id();
        self.scopes.insert(id, scope);
        id
    }

    /// Add a scope under `parent`.
    ///
    /// Returns `None` when `parent` has already been disposed.
    pub fn add_scope(&mut self, parent: ScopeId) -> Option<ScopeId> {
        let scope = ScopeNode::new(Some(parent), None);
        let id = scope.id();
        self.scopes.get_mut(&parent)?.children.push(id);
        self.scopes.insert(id, scope);
        Some(id)
    }

    /// Attach a cleanup to `scope`. Hands it back if the scope is gone.
    pub fn add_cleanup(&mut self, scope: ScopeId, cleanup: ScopeCleanup) -> Result<(), ScopeCleanup> {
        match self.scopes.get_mut(&scope) {
            Some(node) => {
                node.cleanups.push(cleanup);
                Ok(())
            }
            None => Err(cleanup),
        }
    }

    /// Get a reference to a node.
    pub fn get_node(&self, node_id: NodeId) -> Option<&Node> {
        self.nodes.get(&node_id)
    }

    /// Get a mutable reference to a node.
    pub fn get_node_mut(&mut self, node_id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&node_id)
    }

    /// Check whether a node is still live.
    pub fn contains(&self, node_id: NodeId) -> bool {
        self.nodes.contains_key(&node_id)
    }

    /// Check whether a scope is still live.
    pub fn contains_scope(&self, scope_id: ScopeId) -> bool {
        self.scopes.contains_key(&scope_id)
    }

    /// Record that `source` changed and propagate dirty flags.
    ///
    /// Returns the number of nodes whose state was raised.
    pub fn mark_changed(&mut self, source: NodeId) -> usize {
        self.epoch += 1;

        let mut marked = 0;
        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();

        // Start with the source node's direct dependents
        if let Some(node) = self.nodes.get_mut(&source) {
            node.version += 1;
            queue.extend(node.subscribers.iter().map(|&id| (id, NodeState::Dirty)));
        }

        // BFS; direct dependents are all queued first, so they are visited as dirty
        while let Some((node_id, state)) = queue.pop_front() {
            if !visited.insert(node_id) {
                continue;
            }

            let Some(node) = self.nodes.get_mut(&node_id) else {
                continue;
            };

            let notify = node.mark(state) || node.failed;
            if notify {
                marked += 1;
            }

            if node.kind() == NodeKind::Eager && !node.queued && node.state != NodeState::Clean {
                node.queued = true;
                self.pending.push(PendingEffect {
                    epoch: self.epoch,
                    node: node_id,
                });
            }

            if notify {
                queue.extend(
                    node.subscribers
                        .iter()
                        .map(|&id| (id, NodeState::Checking)),
                );
            }
        }

        tracing::trace!(%source, epoch = self.epoch, marked, "marked dependents");
        marked
    }

    /// Drain the effect queue in run order.
    pub fn take_pending(&mut self) -> Vec<NodeId> {
        let mut pending = std::mem::take(&mut self.pending);
        pending.sort();

        pending
            .into_iter()
            .filter_map(|entry| {
                let node = self.nodes.get_mut(&entry.node)?;
                node.queued = false;
                Some(entry.node)
            })
            .collect()
    }

    /// Whether any effect is waiting for a flush.
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Put a node into the `Evaluating` state.
    ///
    /// Returns its computation and private scope.
    pub fn begin_evaluation(
        &mut self,
        node_id: NodeId,
    ) -> Option<(Rc<dyn Computation>, Option<ScopeId>)> {
        let node = self.nodes.get_mut(&node_id)?;
        let computation = node.computation.clone()?;
        node.state = NodeState::Evaluating;
        node.stale = false;
        Some((computation, node.scope))
    }

    /// Install the dependency set captured by a successful evaluation.
    ///
    /// Edges to nodes that were not read this time are dropped. Returns `true`
    /// when a dependency moved on during the evaluation, in which case the
    /// node is left dirty (and effects are re-queued).
    pub fn finish_evaluation(
        &mut self,
        node_id: NodeId,
        dependencies: SmallVec<[Dependency; 4]>,
        changed: bool,
    ) -> bool {
        // The node may have been disposed by its own computation
        let Some(node) = self.nodes.get_mut(&node_id) else {
            return false;
        };

        let previous = std::mem::replace(&mut node.dependencies, dependencies.clone());
        if changed {
            node.version += 1;
        }
        node.failed = false;
        let mut stale = std::mem::take(&mut node.stale);

        for dep in previous {
            if !dependencies.iter().any(|d| d.node == dep.node) {
                if let Some(upstream) = self.nodes.get_mut(&dep.node) {
                    upstream.subscribers.shift_remove(&node_id);
                }
            }
        }

        for dep in &dependencies {
            match self.nodes.get_mut(&dep.node) {
                Some(upstream) => {
                    upstream.subscribers.insert(node_id);
                    stale |= upstream.version != dep.version;
                }
                None => stale = true,
            }
        }

        self.settle_after_run(node_id, stale);
        stale
    }

    /// Record a failed evaluation.
    ///
    /// The node stays dirty. Whatever was read before the failure is merged
    /// into the previous dependency set so that a later change still reaches it.
    pub fn fail_evaluation(&mut self, node_id: NodeId, dependencies: SmallVec<[Dependency; 4]>) {
        let Some(node) = self.nodes.get_mut(&node_id) else {
            return;
        };

        node.state = NodeState::Dirty;
        node.stale = false;
        node.failed = true;

        let mut added = SmallVec::<[NodeId; 4]>::new();
        for dep in dependencies {
            if !node.depends_on(dep.node) {
                node.dependencies.push(dep);
                added.push(dep.node);
            }
        }

        for upstream in added {
            if let Some(upstream) = self.nodes.get_mut(&upstream) {
                upstream.subscribers.insert(node_id);
            }
        }
    }

    /// Settle a `Checking` node whose dependencies all turned out unchanged.
    ///
    /// Returns `false` if the node was raised to `Dirty` in the meantime.
    pub fn settle(&mut self, node_id: NodeId) -> bool {
        match self.nodes.get_mut(&node_id) {
            Some(node) if node.state == NodeState::Checking => {
                node.state = NodeState::Clean;
                true
            }
            Some(node) => node.state == NodeState::Clean,
            None => true,
        }
    }

    /// A dependency failed while a `Checking` node was resolving it.
    pub fn fail_check(&mut self, node_id: NodeId) {
        if let Some(node) = self.nodes.get_mut(&node_id) {
            node.state = NodeState::Dirty;
            node.failed = true;
        }
    }

    fn settle_after_run(&mut self, node_id: NodeId, stale: bool) {
        let epoch = self.epoch;
        let Some(node) = self.nodes.get_mut(&node_id) else {
            return;
        };

        if !stale {
            node.state = NodeState::Clean;
            return;
        }

        node.state = NodeState::Dirty;
        if node.kind() == NodeKind::Eager && !node.queued {
            node.queued = true;
            self.pending.push(PendingEffect {
                epoch,
                node: node_id,
            });
        }
    }

    /// Dispose a scope and everything it owns.
    ///
    /// With `retain` the scope itself survives, emptied; this is how a
    /// computation's private scope is reset between runs. Returns the released
    /// items in disposal order: child scopes first, then owned nodes in
    /// reverse creation order, each node after whatever it created, then the
    /// scope's own cleanups newest first.
    pub fn dispose_scope(&mut self, scope_id: ScopeId, retain: bool) -> Vec<Released> {
        let mut released = Vec::new();
        self.release_scope(scope_id, retain, &mut released);
        released
    }

    /// Dispose a single node (and whatever it created).
    pub fn dispose_node(&mut self, node_id: NodeId) -> Vec<Released> {
        let mut released = Vec::new();

        let owner = self.nodes.get(&node_id).and_then(|node| node.owner);
        if let Some(scope) = owner.and_then(|owner| self.scopes.get_mut(&owner)) {
            scope.nodes.retain(|id| *id != node_id);
        }

        self.release_node(node_id, &mut released);
        released
    }

    fn release_scope(&mut self, scope_id: ScopeId, retain: bool, released: &mut Vec<Released>) {
        let (children, nodes, cleanups) = if retain {
            let Some(scope) = self.scopes.get_mut(&scope_id) else {
                return;
            };
            (
                std::mem::take(&mut scope.children),
                std::mem::take(&mut scope.nodes),
                std::mem::take(&mut scope.cleanups),
            )
        } else {
            let Some(scope) = self.scopes.remove(&scope_id) else {
                return;
            };
            if let Some(parent) = scope.parent.and_then(|parent| self.scopes.get_mut(&parent)) {
                parent.children.retain(|id| *id != scope_id);
            }
            (scope.children, scope.nodes, scope.cleanups)
        };

        for child in children.into_iter().rev() {
            self.release_scope(child, false, released);
        }

        for node_id in nodes.into_iter().rev() {
            self.release_node(node_id, released);
        }

        released.extend(cleanups.into_iter().rev().map(|cleanup| Released::Cleanup {
            scope: scope_id,
            cleanup,
        }));
    }

    fn release_node(&mut self, node_id: NodeId, released: &mut Vec<Released>) {
        let Some(node) = self.nodes.remove(&node_id) else {
            return;
        };

        // Subscribers keep their (now dangling) dependency entry; the missing
        // node reads as changed, and re-running surfaces the disposal.
        for dep in &node.dependencies {
            if let Some(upstream) = self.nodes.get_mut(&dep.node) {
                upstream.subscribers.shift_remove(&node_id);
            }
        }

        if let Some(scope) = node.scope {
            self.release_scope(scope, false, released);
        }

        if let Some(computation) = node.computation {
            released.push(Released::Node {
                id: node_id,
                computation,
            });
        }
    }

    /// Build a read-only view of the graph.
    pub fn snapshot(&self) -> GraphSnapshot {
        let mut nodes: Vec<NodeSnapshot> = self
            .nodes
            .values()
            .map(|node| NodeSnapshot {
                id: node.id(),
                kind: node.kind(),
                state: node.state,
                version: node.version,
                dependencies: node.dependencies.to_vec(),
                subscribers: node.subscribers.iter().copied().collect(),
                owner: node.owner,
                queued: node.queued,
                failed: node.failed,
            })
            .collect();
        nodes.sort_by_key(|node| node.id);

        let mut scopes: Vec<ScopeSnapshot> = self
            .scopes
            .values()
            .map(|scope| ScopeSnapshot {
                id: scope.id(),
                parent: scope.parent,
                owner_node: scope.owner_node,
                children: scope.children.clone(),
                nodes: scope.nodes.clone(),
                cleanups: scope.cleanups.len(),
            })
            .collect();
        scopes.sort_by_key(|scope| scope.id);

        let mut pending = self.pending.clone();
        pending.sort();

        GraphSnapshot {
            epoch: self.epoch,
            nodes,
            scopes,
            pending_effects: pending.into_iter().map(|entry| entry.node).collect(),
        }
    }

    /// Get the total number of nodes in the graph.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects signals, computeds
//! and effects. It owns the dependency graph, the tracking context and the
//! batch state, and it is the only place that calls user code.
//!
//! # How It Works
//!
//! 1. When a computed or effect runs, the runtime pushes a tracking frame;
//!    every signal or computed read during the run is recorded in it together
//!    with the version that was seen.
//!
//! 2. When the run finishes, the recorded reads replace the node's previous
//!    dependency set.
//!
//! 3. When a signal's value changes, the scheduler marks direct dependents
//!    dirty and everything further down as checking, and queues effects.
//!
//! 4. Unless a batch is open, the runtime then flushes: queued effects are
//!    refreshed in order. Refreshing a checking node first refreshes its
//!    computed dependencies and compares versions; it only re-runs if one of
//!    them actually changed. Computeds nobody reads stay dirty.
//!
//! # Threading
//!
//! A runtime is confined to the thread that created it (`Rc` inside).
//! Each thread has a current runtime, created on first use, which the free
//! functions (`create_signal`, `batch`, ...) operate on. [`Runtime::enter`]
//! swaps in a different one for the duration of a closure.

use std::cell::{Cell, RefCell};
use std::convert::identity;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use smallvec::SmallVec;

use super::context::TrackingContext;
use crate::config::RuntimeConfig;
use crate::error::{expect_ok, ReactiveError, Result};
use crate::graph::{
    Computation, Dependency, GraphSnapshot, NodeId, NodeKind, NodeState, Released, Scheduler, ScopeCleanup,
    ScopeId,
};

thread_local! {
    static CURRENT: RefCell<Option<Runtime>> = const { RefCell::new(None) };
}

struct RuntimeInner {
    graph: RefCell<Scheduler>,
    context: TrackingContext,
    batch_depth: Cell<usize>,
    flushing: Cell<bool>,
    config: RuntimeConfig,
    root: ScopeId,
}

/// Handle to a reactive runtime instance.
///
/// Cloning is cheap and yields a handle to the same runtime.
#[derive(Clone)]
pub struct Runtime {
    inner: Rc<RuntimeInner>,
}

impl Runtime {
    /// Create a runtime with the default configuration.
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    /// Create a runtime with the given configuration.
    pub fn with_config(config: RuntimeConfig) -> Self {
        let mut graph = Scheduler::new();
        let root = graph.add_root_scope();
        Self {
            inner: Rc::new(RuntimeInner {
                graph: RefCell::new(graph),
                context: TrackingContext::default(),
                batch_depth: Cell::new(0),
                flushing: Cell::new(false),
                config,
                root,
            }),
        }
    }

    /// Get this thread's current runtime, creating it on first use.
    pub fn current() -> Runtime {
        CURRENT.with(|current| {
            current
                .borrow_mut()
                .get_or_insert_with(Runtime::new)
                .clone()
        })
    }

    /// Make this runtime the thread's current one while `f` runs.
    ///
    /// The previous runtime is restored afterwards, also on unwind.
    pub fn enter<R>(&self, f: impl FnOnce() -> R) -> R {
        struct Restore(Option<Runtime>);

        impl Drop for Restore {
            fn drop(&mut self) {
                let previous = self.0.take();
                CURRENT.with(|current| *current.borrow_mut() = previous);
            }
        }

        let previous = CURRENT.with(|current| current.borrow_mut().replace(self.clone()));
        let _restore = Restore(previous);
        f()
    }

    /// Get the configuration this runtime was created with.
    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    /// Check whether two handles refer to the same runtime.
    pub fn ptr_eq(&self, other: &Runtime) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Run `f` with writes coalesced into a single flush at the end.
    ///
    /// Batches nest; only the outermost one flushes.
    ///
    /// # Panics
    ///
    /// Panics with a [`ReactiveError`] payload if the flush fails. Use
    /// [`try_batch`](Self::try_batch) to get the error instead.
    pub fn batch<T>(&self, f: impl FnOnce() -> T) -> T {
        expect_ok(self.try_batch(f))
    }

    /// Like [`batch`](Self::batch), returning flush errors.
    pub fn try_batch<T>(&self, f: impl FnOnce() -> T) -> Result<T> {
        self.deferred(|| Ok(f()))
    }

    /// Run `f` without recording any reads as dependencies of the running
    /// computation.
    pub fn untrack<T>(&self, f: impl FnOnce() -> T) -> T {
        let _untracked = self.inner.context.untracked();
        f()
    }

    /// Check if a computation is recording dependencies right now.
    pub fn is_tracking(&self) -> bool {
        self.inner.context.is_tracking()
    }

    /// Check if a batch is open.
    pub fn is_batching(&self) -> bool {
        self.inner.batch_depth.get() > 0
    }

    /// Get the root scope, which owns everything created outside any other
    /// scope. Disposing it tears that down but leaves the root usable.
    pub fn root_scope(&self) -> ScopeId {
        self.inner.root
    }

    /// Dispose everything owned by the root scope.
    pub fn dispose_all(&self) -> Result<()> {
        self.dispose_scope(self.inner.root)
    }

    /// Take a read-only snapshot of the graph.
    pub fn snapshot(&self) -> GraphSnapshot {
        self.inner.graph.borrow().snapshot()
    }

    /// Get the number of live nodes.
    pub fn node_count(&self) -> usize {
        self.inner.graph.borrow().node_count()
    }

    // ------------------------------------------------------------------------
    // Node management
    // ------------------------------------------------------------------------

    pub(crate) fn create_source(&self) -> NodeId {
        let id = self.inner.graph.borrow_mut().add_source();
        tracing::trace!(node = %id, "created signal");
        id
    }

    pub(crate) fn create_computation(&self, kind: NodeKind, computation: Rc<dyn Computation>) -> NodeId {
        let owner = self.current_owner();
        let id = self
            .inner
            .graph
            .borrow_mut()
            .add_derived(kind, Some(owner), computation);
        tracing::trace!(node = %id, ?kind, %owner, "created computation");
        id
    }

    /// Create a scope under `parent`, or a new root.
    pub(crate) fn create_scope(&self, parent: Option<ScopeId>) -> Result<ScopeId> {
        let mut graph = self.inner.graph.borrow_mut();
        match parent {
            Some(parent) => graph
                .add_scope(parent)
                .ok_or(ReactiveError::DisposedScope { scope: parent }),
            None => Ok(graph.add_root_scope()),
        }
    }

    /// The active scope, falling back to the runtime's root.
    pub(crate) fn current_owner(&self) -> ScopeId {
        self.inner
            .context
            .current_owner()
            .unwrap_or(self.inner.root)
    }

    /// Register `cleanup` to run when `scope` is disposed or reset.
    ///
    /// If the scope is already gone the cleanup runs right away.
    pub(crate) fn add_cleanup(&self, scope: ScopeId, cleanup: Box<dyn FnOnce()>) {
        let added = self
            .inner
            .graph
            .borrow_mut()
            .add_cleanup(scope, ScopeCleanup(cleanup));
        if let Err(ScopeCleanup(cleanup)) = added {
            tracing::debug!(%scope, "scope already disposed, running cleanup now");
            self.untrack(cleanup);
        }
    }

    /// Run `f` with new computations registered under `scope`.
    pub(crate) fn with_owner<R>(&self, scope: ScopeId, f: impl FnOnce() -> R) -> Result<R> {
        if !self.scope_is_alive(scope) {
            return Err(ReactiveError::DisposedScope { scope });
        }
        let _owner = self.inner.context.enter_owner(Some(scope));
        Ok(f())
    }

    pub(crate) fn is_alive(&self, id: NodeId) -> bool {
        self.inner.graph.borrow().contains(id)
    }

    pub(crate) fn scope_is_alive(&self, scope: ScopeId) -> bool {
        self.inner.graph.borrow().contains_scope(scope)
    }

    pub(crate) fn ensure_alive(&self, id: NodeId) -> Result<()> {
        if self.is_alive(id) {
            Ok(())
        } else {
            Err(ReactiveError::DisposedNodeAccess { node: id })
        }
    }

    pub(crate) fn version(&self, id: NodeId) -> Result<u64> {
        self.inner
            .graph
            .borrow()
            .get_node(id)
            .map(|node| node.version)
            .ok_or(ReactiveError::DisposedNodeAccess { node: id })
    }

    /// Record a read of a signal.
    pub(crate) fn track_source(&self, id: NodeId) -> Result<()> {
        let version = self.version(id)?;
        self.inner.context.track(Dependency { node: id, version });
        Ok(())
    }

    /// Bring a computed up to date and record the read.
    ///
    /// The read is recorded even if the computed failed, so that the reader
    /// is notified once the computed's inputs change again.
    pub(crate) fn track_computed(&self, id: NodeId) -> Result<()> {
        let refreshed = self.deferred(|| self.refresh(id));
        if let Ok(version) = self.version(id) {
            self.inner.context.track(Dependency { node: id, version });
        }
        refreshed
    }

    /// Propagate a change of a signal that has already been written.
    pub(crate) fn source_changed(&self, id: NodeId) -> Result<()> {
        self.inner.graph.borrow_mut().mark_changed(id);
        self.flush()
    }

    /// Run a freshly created effect for the first time.
    ///
    /// If that run fails the effect is disposed again.
    pub(crate) fn start_effect(&self, id: NodeId) -> Result<()> {
        self.deferred(|| {
            let started = self.refresh(id);
            if started.is_err() {
                if let Err(error) = self.dispose_node(id) {
                    tracing::error!(%error, "disposing a failed effect failed");
                }
            }
            started
        })
    }

    pub(crate) fn dispose_node(&self, id: NodeId) -> Result<()> {
        let released = self.inner.graph.borrow_mut().dispose_node(id);
        self.release(released)
    }

    /// Dispose `scope`. The root scope is only emptied.
    pub(crate) fn dispose_scope(&self, scope: ScopeId) -> Result<()> {
        let retain = scope == self.inner.root;
        let released = self.inner.graph.borrow_mut().dispose_scope(scope, retain);
        tracing::debug!(%scope, released = released.len(), "disposed scope");
        self.release(released)
    }

    /// Run the dispose hooks and cleanups handed back by the graph.
    ///
    /// Every one of them runs even if an earlier one panics; the first
    /// failure is returned and later ones are logged.
    fn release(&self, released: Vec<Released>) -> Result<()> {
        let _untracked = self.inner.context.untracked();
        let mut failures = Failures::default();

        for item in released {
            let outcome = match item {
                Released::Node { id, computation } => {
                    panic::catch_unwind(AssertUnwindSafe(|| computation.dispose()))
                        .map_err(|payload| ReactiveError::from_panic(id, payload))
                }
                Released::Cleanup {
                    scope,
                    cleanup: ScopeCleanup(cleanup),
                } => panic::catch_unwind(AssertUnwindSafe(cleanup))
                    .map_err(|payload| ReactiveError::from_cleanup_panic(scope, payload)),
            };
            if let Err(error) = outcome {
                failures.record(error, "additional cleanup failure during disposal");
            }
        }

        failures.into_result()
    }

    // ------------------------------------------------------------------------
    // Propagation
    // ------------------------------------------------------------------------

    /// Run `f` as a batch and flush afterwards if it was the outermost one.
    ///
    /// The error of `f` takes precedence over a flush error.
    fn deferred<R>(&self, f: impl FnOnce() -> Result<R>) -> Result<R> {
        let result = {
            let _batch = CounterGuard::enter(&self.inner.batch_depth);
            f()
        };

        match (result, self.flush()) {
            (Err(error), Err(flush_error)) => {
                tracing::error!(error = %flush_error, "flush failed after an earlier error");
                Err(error)
            }
            (result, flushed) => flushed.and(result),
        }
    }

    /// Bring a computed or effect up to date.
    fn refresh(&self, id: NodeId) -> Result<()> {
        let (state, dependencies) = {
            let graph = self.inner.graph.borrow();
            let node = graph
                .get_node(id)
                .ok_or(ReactiveError::DisposedNodeAccess { node: id })?;
            let dependencies = if node.state == NodeState::Checking {
                node.dependencies.clone()
            } else {
                SmallVec::new()
            };
            (node.state, dependencies)
        };

        match state {
            NodeState::Clean => return Ok(()),
            NodeState::Evaluating => return Err(ReactiveError::CyclicDependency { node: id }),
            NodeState::Checking => match self.dependencies_changed(&dependencies) {
                Ok(false) => {
                    if self.inner.graph.borrow_mut().settle(id) {
                        tracing::trace!(node = %id, "settled without re-running");
                        return Ok(());
                    }
                }
                Ok(true) => {}
                Err(error) => {
                    self.inner.graph.borrow_mut().fail_check(id);
                    return Err(error);
                }
            },
            NodeState::Dirty => {}
        }

        self.evaluate(id)
    }

    /// Walk dependencies in read order, refreshing computeds depth-first, and
    /// stop at the first one whose version moved.
    fn dependencies_changed(&self, dependencies: &[Dependency]) -> Result<bool> {
        for dep in dependencies {
            let kind = self.inner.graph.borrow().get_node(dep.node).map(|node| node.kind());
            match kind {
                None => return Ok(true),
                Some(NodeKind::Source) => {}
                Some(NodeKind::Lazy | NodeKind::Eager) => self.refresh(dep.node)?,
            }

            if self.version(dep.node).ok() != Some(dep.version) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Run a node's computation with fresh dependency tracking.
    fn evaluate(&self, id: NodeId) -> Result<()> {
        let (computation, scope) = self
            .inner
            .graph
            .borrow_mut()
            .begin_evaluation(id)
            .ok_or(ReactiveError::DisposedNodeAccess { node: id })?;
        tracing::trace!(node = %id, "evaluating");

        let (outcome, dependencies) = {
            let _owner = self.inner.context.enter_owner(scope);
            self.inner.context.push_observer(id);
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                // Whatever the previous run created goes away first
                let reset = match scope {
                    Some(scope) => {
                        let released = self.inner.graph.borrow_mut().dispose_scope(scope, true);
                        self.release(released)
                    }
                    None => Ok(()),
                };
                {
                    let _untracked = self.inner.context.untracked();
                    computation.cleanup();
                }
                if let Err(error) = reset {
                    error.raise();
                }
                computation.run()
            }));
            (outcome, self.inner.context.pop_observer(id))
        };

        match outcome {
            Ok(changed) => {
                let stale = self
                    .inner
                    .graph
                    .borrow_mut()
                    .finish_evaluation(id, dependencies, changed);
                tracing::trace!(node = %id, changed, stale, "evaluated");
                Ok(())
            }
            Err(payload) => {
                let error = ReactiveError::from_panic(id, payload);
                tracing::trace!(node = %id, %error, "evaluation failed");
                self.inner.graph.borrow_mut().fail_evaluation(id, dependencies);
                Err(error)
            }
        }
    }

    /// Run queued effects until none are left.
    ///
    /// Every queued effect runs even if an earlier one fails; the first error
    /// is returned and later ones are logged.
    fn flush(&self) -> Result<()> {
        if self.inner.batch_depth.get() > 0 || self.inner.flushing.get() {
            return Ok(());
        }
        if !self.inner.graph.borrow().has_pending() {
            return Ok(());
        }

        let _flushing = FlagGuard::raise(&self.inner.flushing);
        let span = tracing::trace_span!("flush");
        let _entered = span.enter();

        let limit = self.inner.config.max_flush_iterations;
        let mut failures = Failures::default();
        let mut passes = 0;

        loop {
            let pending = self.inner.graph.borrow_mut().take_pending();
            let Some(&head) = pending.first() else {
                break;
            };

            if passes >= limit {
                let error = ReactiveError::RunawayPropagation {
                    node: head,
                    iterations: passes,
                };
                tracing::warn!(%error, still_queued = pending.len(), "aborting flush");
                if let Some(earlier) = failures.0.take() {
                    tracing::error!(error = %earlier, "effect failure superseded by runaway propagation");
                }
                return Err(error);
            }

            passes += 1;
            tracing::debug!(pass = passes, effects = pending.len(), "running effects");

            for id in pending {
                if !self.is_alive(id) {
                    continue;
                }
                if let Err(error) = self.refresh(id) {
                    failures.record(error, "additional effect failure during flush");
                }
            }
        }

        failures.into_result()
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("node_count", &self.node_count())
            .field("batch_depth", &self.inner.batch_depth.get())
            .field("flushing", &self.inner.flushing.get())
            .field("config", &self.inner.config)
            .finish()
    }
}

/// Keeps the first error of a run of independent steps and logs the rest.
#[derive(Default)]
struct Failures(Option<ReactiveError>);

impl Failures {
    fn record(&mut self, error: ReactiveError, context: &'static str) {
        if self.0.is_none() {
            self.0 = Some(error);
        } else {
            tracing::error!(%error, "{context}");
        }
    }

    fn into_result(self) -> Result<()> {
        self.0.map_or(Ok(()), Err)
    }
}

/// Increments a counter for as long as it lives.
struct CounterGuard<'a>(&'a Cell<usize>);

impl<'a> CounterGuard<'a> {
    fn enter(counter: &'a Cell<usize>) -> Self {
        counter.set(counter.get() + 1);
        Self(counter)
    }
}

impl Drop for CounterGuard<'_> {
    fn drop(&mut self) {
        self.0.set(self.0.get() - 1);
    }
}

/// Holds a flag up for as long as it lives.
struct FlagGuard<'a>(&'a Cell<bool>);

impl<'a> FlagGuard<'a> {
    fn raise(flag: &'a Cell<bool>) -> Self {
        flag.set(true);
        Self(flag)
    }
}

impl Drop for FlagGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

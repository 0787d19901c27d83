//! Reactive Context
//!
//! The reactive context tracks which computation is currently running and
//! which scope new nodes should be registered under. This enables automatic
//! dependency tracking: when a signal is read, the current computation is
//! recorded as a dependent.
//!
//! # Implementation
//!
//! Each [`Runtime`](super::Runtime) owns one `TrackingContext`, so
//! independent runtimes never see each other's frames. A frame is pushed when
//! a computation starts and popped when it finishes. `untrack` pushes a frame
//! with no observer, which hides everything below it.
//!
//! Guards pop what they pushed when dropped, so the stacks stay balanced even
//! if user code panics.

use std::cell::RefCell;

use smallvec::SmallVec;

use crate::graph::{Dependency, NodeId, ScopeId};

/// An entry in the tracking stack.
#[derive(Debug)]
pub(crate) struct Frame {
    /// The computation collecting dependencies, or `None` inside `untrack`.
    pub observer: Option<NodeId>,
    /// Dependencies collected so far, in read order, without duplicates.
    pub dependencies: SmallVec<[Dependency; 4]>,
}

#[derive(Debug, Default)]
pub(crate) struct TrackingContext {
    frames: RefCell<Vec<Frame>>,
    owners: RefCell<Vec<Option<ScopeId>>>,
}

impl TrackingContext {
    /// Start collecting dependencies for `observer`.
    ///
    /// The caller must hand the frame back to [`pop_observer`](Self::pop_observer).
    pub fn push_observer(&self, observer: NodeId) {
        self.frames.borrow_mut().push(Frame {
            observer: Some(observer),
            dependencies: SmallVec::new(),
        });
    }

    /// Stop collecting for the innermost observer and return what it read.
    pub fn pop_observer(&self, observer: NodeId) -> SmallVec<[Dependency; 4]> {
        let popped = self.frames.borrow_mut().pop();
        match popped {
            Some(frame) => {
                debug_assert_eq!(
                    frame.observer,
                    Some(observer),
                    "tracking frame mismatch: expected {observer}, got {:?}",
                    frame.observer
                );
                frame.dependencies
            }
            None => SmallVec::new(),
        }
    }

    /// Hide the current observer until the guard is dropped.
    pub fn untracked(&self) -> UntrackedGuard<'_> {
        self.frames.borrow_mut().push(Frame {
            observer: None,
            dependencies: SmallVec::new(),
        });
        UntrackedGuard { context: self }
    }

    /// Check if a computation is collecting dependencies right now.
    pub fn is_tracking(&self) -> bool {
        self.current_observer().is_some()
    }

    /// Get the computation collecting dependencies, if any.
    pub fn current_observer(&self) -> Option<NodeId> {
        self.frames.borrow().last().and_then(|frame| frame.observer)
    }

    /// Record a read of `dependency` in the innermost frame.
    ///
    /// Repeated reads keep the first observed version, so a node that moved
    /// on mid-evaluation is detected afterwards.
    pub fn track(&self, dependency: Dependency) {
        let mut frames = self.frames.borrow_mut();
        let Some(frame) = frames.last_mut() else {
            return;
        };
        if frame.observer.is_none() || frame.observer == Some(dependency.node) {
            return;
        }
        if !frame.dependencies.iter().any(|d| d.node == dependency.node) {
            frame.dependencies.push(dependency);
        }
    }

    /// Register new nodes under `scope` until the guard is dropped.
    pub fn enter_owner(&self, scope: Option<ScopeId>) -> OwnerGuard<'_> {
        self.owners.borrow_mut().push(scope);
        OwnerGuard { context: self }
    }

    /// The scope new computations are registered under.
    pub fn current_owner(&self) -> Option<ScopeId> {
        self.owners.borrow().last().copied().flatten()
    }
}

/// Guard that pops an untracked frame when dropped.
pub(crate) struct UntrackedGuard<'a> {
    context: &'a TrackingContext,
}

impl Drop for UntrackedGuard<'_> {
    fn drop(&mut self) {
        let popped = self.context.frames.borrow_mut().pop();
        debug_assert!(
            matches!(popped, Some(Frame { observer: None, .. })),
            "untracked frame mismatch"
        );
    }
}

/// Guard that restores the previous owner scope when dropped.
pub(crate) struct OwnerGuard<'a> {
    context: &'a TrackingContext,
}

impl Drop for OwnerGuard<'_> {
    fn drop(&mut self) {
        self.context.owners.borrow_mut().pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dep(node: NodeId, version: u64) -> Dependency {
        Dependency { node, version }
    }

    #[test]
    fn context_tracks_observer() {
        let context = TrackingContext::default();
        let id = NodeId::new();

        assert!(!context.is_tracking());
        assert!(context.current_observer().is_none());

        context.push_observer(id);
        assert!(context.is_tracking());
        assert_eq!(context.current_observer(), Some(id));

        context.pop_observer(id);
        assert!(!context.is_tracking());
    }

    #[test]
    fn context_tracks_dependencies_once_in_read_order() {
        let context = TrackingContext::default();
        let observer = NodeId::new();
        let (a, b) = (NodeId::new(), NodeId::new());

        context.push_observer(observer);
        context.track(dep(b, 1));
        context.track(dep(a, 4));
        context.track(dep(b, 2));

        let deps = context.pop_observer(observer);
        assert_eq!(deps.as_slice(), &[dep(b, 1), dep(a, 4)]);
    }

    #[test]
    fn nested_frames() {
        let context = TrackingContext::default();
        let (outer, inner) = (NodeId::new(), NodeId::new());
        let (x, y) = (NodeId::new(), NodeId::new());

        context.push_observer(outer);
        context.track(dep(x, 0));

        context.push_observer(inner);
        context.track(dep(y, 0));
        assert_eq!(context.pop_observer(inner).as_slice(), &[dep(y, 0)]);

        // After the inner frame pops, reads go to the outer one again
        assert_eq!(context.current_observer(), Some(outer));
        assert_eq!(context.pop_observer(outer).as_slice(), &[dep(x, 0)]);
    }

    #[test]
    fn untracked_hides_the_observer() {
        let context = TrackingContext::default();
        let observer = NodeId::new();
        let hidden = NodeId::new();

        context.push_observer(observer);
        {
            let _untracked = context.untracked();
            assert!(!context.is_tracking());
            context.track(dep(hidden, 0));
        }
        assert_eq!(context.current_observer(), Some(observer));
        assert!(context.pop_observer(observer).is_empty());
    }

    #[test]
    fn owner_guard_restores_previous_owner() {
        let context = TrackingContext::default();
        let (outer, inner) = (ScopeId::new(), ScopeId::new());

        assert_eq!(context.current_owner(), None);
        let _outer = context.enter_owner(Some(outer));
        {
            let _inner = context.enter_owner(Some(inner));
            assert_eq!(context.current_owner(), Some(inner));
        }
        assert_eq!(context.current_owner(), Some(outer));
    }
}

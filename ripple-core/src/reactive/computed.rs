//! Computed Implementation
//!
//! A Computed is a derived value that caches its result and recomputes only
//! when something it read actually changed.
//!
//! # Laziness
//!
//! A computed runs for the first time when it is first read, and afterwards
//! only when it is read while stale. Marking never runs it. A computed nobody
//! reads stays dirty forever at no cost.
//!
//! # Equality
//!
//! When a recomputation produces a value equal to the cached one, the old
//! value is kept and the computed's version does not move. Readers that were
//! only checking then settle without re-running.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use super::options::{EqualsFn, Options};
use super::runtime::Runtime;
use crate::error::{expect_ok, ReactiveError, Result};
use crate::graph::{Computation, NodeId, NodeKind};

struct ComputedInner<T> {
    compute: Box<dyn Fn() -> T>,
    value: RefCell<Option<T>>,
    equals: EqualsFn<T>,
}

impl<T: 'static> Computation for ComputedInner<T> {
    fn run(&self) -> bool {
        let next = (self.compute)();
        let mut value = self.value.borrow_mut();
        let changed = match value.as_ref() {
            Some(previous) => !(self.equals)(previous, &next),
            None => true,
        };
        if changed {
            *value = Some(next);
        }
        changed
    }

    fn dispose(&self) {
        if let Ok(mut value) = self.value.try_borrow_mut() {
            value.take();
        }
    }
}

/// A cached value derived from other reactive values.
///
/// # Example
///
/// ```rust
/// use ripple_core::reactive::{Computed, Signal};
///
/// let count = Signal::new(2);
/// let doubled = Computed::new({
///     let count = count.clone();
///     move || count.get() * 2
/// });
///
/// assert_eq!(doubled.get(), 4);
/// count.set(5);
/// assert_eq!(doubled.get(), 10);
/// ```
pub struct Computed<T: 'static> {
    runtime: Runtime,
    id: NodeId,
    inner: Rc<ComputedInner<T>>,
}

impl<T: 'static> Computed<T> {
    /// Create a computed in the current runtime. Nothing runs yet.
    pub fn new(compute: impl Fn() -> T + 'static) -> Self
    where
        T: PartialEq,
    {
        Self::with_options(compute, Options::default())
    }

    /// Create a computed with a custom equality check.
    pub fn with_options(compute: impl Fn() -> T + 'static, options: Options<T>) -> Self {
        let runtime = Runtime::current();
        let inner = Rc::new(ComputedInner {
            compute: Box::new(compute),
            value: RefCell::new(None),
            equals: options.equals,
        });
        let id = runtime.create_computation(NodeKind::Lazy, inner.clone());
        Self { runtime, id, inner }
    }

    /// Get the computed's node id.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Get the current value, recomputing first if it is stale.
    ///
    /// # Panics
    ///
    /// Panics with a [`ReactiveError`] payload if the computed was disposed,
    /// is part of a cycle, or its function panicked. A failed computation is
    /// retried on the next read.
    pub fn get(&self) -> T
    where
        T: Clone,
    {
        expect_ok(self.try_get())
    }

    /// Like [`get`](Self::get), returning errors instead of panicking.
    pub fn try_get(&self) -> Result<T>
    where
        T: Clone,
    {
        self.try_with(T::clone)
    }

    /// Get the current value without recording a dependency.
    pub fn get_untracked(&self) -> T
    where
        T: Clone,
    {
        self.runtime.untrack(|| self.get())
    }

    /// Borrow the current value, recomputing first if it is stale.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        expect_ok(self.try_with(f))
    }

    /// Like [`with`](Self::with), returning errors instead of panicking.
    pub fn try_with<R>(&self, f: impl FnOnce(&T) -> R) -> Result<R> {
        self.runtime.ensure_alive(self.id)?;
        self.runtime.track_computed(self.id)?;
        let value = self.inner.value.borrow();
        match value.as_ref() {
            Some(value) => Ok(f(value)),
            None => Err(ReactiveError::DisposedNodeAccess { node: self.id }),
        }
    }

    /// Get the computed's version. It moves only when a recomputation
    /// produced a different value.
    pub fn version(&self) -> u64 {
        expect_ok(self.runtime.version(self.id))
    }

    /// Remove the computed from the graph and drop its cached value,
    /// together with everything its last run created.
    ///
    /// # Panics
    ///
    /// Panics with a [`ReactiveError`] payload if a cleanup of something it
    /// owned panicked.
    pub fn dispose(&self) {
        expect_ok(self.try_dispose())
    }

    /// Like [`dispose`](Self::dispose), returning the first cleanup failure.
    pub fn try_dispose(&self) -> Result<()> {
        self.runtime.dispose_node(self.id)
    }

    /// Check if the computed was disposed.
    pub fn is_disposed(&self) -> bool {
        !self.runtime.is_alive(self.id)
    }
}

impl<T: 'static> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Self {
            runtime: self.runtime.clone(),
            id: self.id,
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug + 'static> fmt::Debug for Computed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("Computed");
        debug.field("id", &self.id);
        match self.inner.value.try_borrow() {
            Ok(value) => debug.field("value", &*value),
            Err(_) => debug.field("value", &"<computing>"),
        };
        debug.finish()
    }
}

/// Create a computed in the current runtime.
pub fn create_computed<T: PartialEq + 'static>(compute: impl Fn() -> T + 'static) -> Computed<T> {
    Computed::new(compute)
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::reactive::Signal;

    fn counter() -> Rc<Cell<u32>> {
        Rc::new(Cell::new(0))
    }

    #[test]
    fn computed_is_lazy_and_cached() {
        let runs = counter();
        let source = Signal::new(3);
        let squared = Computed::new({
            let (source, runs) = (source.clone(), runs.clone());
            move || {
                runs.set(runs.get() + 1);
                source.get() * source.get()
            }
        });

        assert_eq!(runs.get(), 0);
        assert_eq!(squared.get(), 9);
        assert_eq!(squared.get(), 9);
        assert_eq!(runs.get(), 1);

        source.set(4);
        assert_eq!(runs.get(), 1);
        assert_eq!(squared.get(), 16);
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn equal_result_keeps_version_and_spares_readers() {
        let downstream_runs = counter();
        let source = Signal::new(2);
        let parity = Computed::new({
            let source = source.clone();
            move || source.get() % 2
        });
        let label = Computed::new({
            let (parity, runs) = (parity.clone(), downstream_runs.clone());
            move || {
                runs.set(runs.get() + 1);
                if parity.get() == 0 { "even" } else { "odd" }
            }
        });

        assert_eq!(label.get(), "even");
        source.set(4);
        assert_eq!(label.get(), "even");

        assert_eq!(parity.version(), 1);
        assert_eq!(downstream_runs.get(), 1);
    }

    #[test]
    fn dynamic_dependencies_follow_the_branch_taken() {
        let runs = counter();
        let flag = Signal::new(true);
        let a = Signal::new(1);
        let b = Signal::new(2);
        let picked = Computed::new({
            let (flag, a, b, runs) = (flag.clone(), a.clone(), b.clone(), runs.clone());
            move || {
                runs.set(runs.get() + 1);
                if flag.get() { a.get() } else { b.get() }
            }
        });

        assert_eq!(picked.get(), 1);
        b.set(20);
        assert_eq!(picked.get(), 1);
        assert_eq!(runs.get(), 1);

        flag.set(false);
        assert_eq!(picked.get(), 20);
        a.set(10);
        assert_eq!(picked.get(), 20);
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn failing_computation_is_retried_on_next_read() {
        let source = Signal::new(0);
        let checked = Computed::new({
            let source = source.clone();
            move || {
                let value = source.get();
                assert!(value >= 0, "negative input");
                value
            }
        });

        source.set(-1);
        let error = checked.try_get().unwrap_err();
        assert!(matches!(error, ReactiveError::Computation { node, ref message }
            if node == checked.id() && message.contains("negative input")));

        source.set(5);
        assert_eq!(checked.try_get(), Ok(5));
    }

    #[test]
    fn disposed_computed_fails_fast() {
        let computed = Computed::new(|| 1);
        assert_eq!(computed.get(), 1);

        computed.dispose();
        assert!(computed.is_disposed());
        assert_eq!(
            computed.try_get(),
            Err(ReactiveError::DisposedNodeAccess { node: computed.id() })
        );
    }
}

//! Effect Implementation
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies change.
//!
//! # How Effects Work
//!
//! 1. When created, the effect runs its function immediately to establish
//!    initial dependencies.
//!
//! 2. When any dependency changes, the effect is queued and runs once when the
//!    current batch ends, after the computeds it reads have settled.
//!
//! 3. Before re-running, the effect's previous cleanup runs and everything
//!    the previous run created is disposed.
//!
//! # Differences from Computed
//!
//! - Computeds return a value; effects do not.
//! - Computeds are lazy (compute on access); effects are eager (run when deps change).
//! - Computeds cache results; effects just run their side effect.
//!
//! # Cleanup
//!
//! The effect function may return a [`Cleanup`]. It is called before the
//! effect re-runs and when the effect is disposed, and never twice.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use super::runtime::Runtime;
use crate::error::{expect_ok, Result};
use crate::graph::{Computation, NodeId, NodeKind};

/// A function to run before an effect re-runs or is disposed.
pub struct Cleanup(Box<dyn FnOnce()>);

impl Cleanup {
    pub fn new(f: impl FnOnce() + 'static) -> Self {
        Self(Box::new(f))
    }

    /// Run the cleanup now.
    pub fn run(self) {
        (self.0)()
    }
}

impl fmt::Debug for Cleanup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Cleanup")
    }
}

/// Values an effect function may return.
pub trait IntoCleanup {
    fn into_cleanup(self) -> Option<Cleanup>;
}

impl IntoCleanup for () {
    fn into_cleanup(self) -> Option<Cleanup> {
        None
    }
}

impl IntoCleanup for Cleanup {
    fn into_cleanup(self) -> Option<Cleanup> {
        Some(self)
    }
}

impl IntoCleanup for Option<Cleanup> {
    fn into_cleanup(self) -> Option<Cleanup> {
        self
    }
}

type EffectFn = Box<dyn FnMut() -> Option<Cleanup>>;

struct EffectInner {
    run: RefCell<EffectFn>,
    cleanup: RefCell<Option<Cleanup>>,
    disposed: Cell<bool>,
    run_count: Cell<usize>,
}

impl Computation for EffectInner {
    fn run(&self) -> bool {
        let cleanup = {
            let mut run = self.run.borrow_mut();
            (*run)()
        };
        self.run_count.set(self.run_count.get() + 1);

        // Disposed during its own run
        if self.disposed.get() {
            if let Some(cleanup) = cleanup {
                cleanup.run();
            }
        } else {
            *self.cleanup.borrow_mut() = cleanup;
        }
        true
    }

    fn cleanup(&self) {
        let cleanup = self.cleanup.borrow_mut().take();
        if let Some(cleanup) = cleanup {
            cleanup.run();
        }
    }

    fn dispose(&self) {
        if self.disposed.replace(true) {
            return;
        }
        // Drop captured state unless the function is still on the stack
        if let Ok(mut run) = self.run.try_borrow_mut() {
            *run = Box::new(|| None);
        }
        self.cleanup();
    }
}

/// A side-effecting computation that runs when dependencies change.
///
/// Dropping the handle does not stop the effect; it lives until it is
/// disposed, directly or through its scope.
///
/// # Example
///
/// ```rust
/// use std::cell::Cell;
/// use std::rc::Rc;
/// use ripple_core::reactive::{Effect, Signal};
///
/// let count = Signal::new(0);
/// let seen = Rc::new(Cell::new(0));
///
/// let effect = Effect::new({
///     let (count, seen) = (count.clone(), seen.clone());
///     move || seen.set(count.get())
/// });
///
/// count.set(5);
/// assert_eq!(seen.get(), 5);
/// effect.dispose();
/// ```
#[derive(Clone)]
pub struct Effect {
    runtime: Runtime,
    id: NodeId,
    inner: Rc<EffectInner>,
}

impl Effect {
    /// Create an effect in the current runtime and run it once.
    ///
    /// # Panics
    ///
    /// Panics with a [`ReactiveError`](crate::ReactiveError) payload if the
    /// first run fails.
    pub fn new<R: IntoCleanup>(f: impl FnMut() -> R + 'static) -> Self {
        expect_ok(Self::try_new(f))
    }

    /// Like [`new`](Self::new), returning the error of the first run.
    ///
    /// An effect whose first run failed is disposed again. If the first run
    /// succeeded but an effect it triggered failed, the effect stays alive
    /// under its scope.
    pub fn try_new<R: IntoCleanup>(mut f: impl FnMut() -> R + 'static) -> Result<Self> {
        let runtime = Runtime::current();
        let inner = Rc::new(EffectInner {
            run: RefCell::new(Box::new(move || f().into_cleanup())),
            cleanup: RefCell::new(None),
            disposed: Cell::new(false),
            run_count: Cell::new(0),
        });
        let id = runtime.create_computation(NodeKind::Eager, inner.clone());
        runtime.start_effect(id)?;
        Ok(Self { runtime, id, inner })
    }

    /// Run `f` once, untracked, as an effect owned by the active scope.
    ///
    /// Nothing `f` reads is tracked, so it never runs again. It still owns
    /// what it creates and registers cleanups like any effect run.
    ///
    /// ```rust
    /// use ripple_core::reactive::{Effect, Signal};
    ///
    /// let count = Signal::new(0);
    /// let once = Effect::once({
    ///     let count = count.clone();
    ///     move || println!("started at {}", count.get())
    /// });
    /// count.set(1);
    /// assert_eq!(once.run_count(), 1);
    /// ```
    pub fn once(f: impl FnOnce() + 'static) -> Self {
        let runtime = Runtime::current();
        let mut f = Some(f);
        Effect::new(move || {
            if let Some(f) = f.take() {
                runtime.untrack(f);
            }
        })
    }

    /// Get the effect's node id.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Get how many times the effect function has run.
    pub fn run_count(&self) -> usize {
        self.inner.run_count.get()
    }

    /// Stop the effect and run its last cleanup. Disposing twice is a no-op.
    ///
    /// # Panics
    ///
    /// Panics with a [`ReactiveError`](crate::ReactiveError) payload if a
    /// cleanup panicked. Every other cleanup still ran.
    pub fn dispose(&self) {
        expect_ok(self.try_dispose())
    }

    /// Like [`dispose`](Self::dispose), returning the first cleanup failure.
    pub fn try_dispose(&self) -> Result<()> {
        self.runtime.dispose_node(self.id)
    }

    /// Check if the effect was disposed.
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.get() || !self.runtime.is_alive(self.id)
    }
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.id)
            .field("run_count", &self.run_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// Create an effect in the current runtime.
pub fn create_effect<R: IntoCleanup>(f: impl FnMut() -> R + 'static) -> Effect {
    Effect::new(f)
}

/// Call `callback` with the new and previous value whenever `source`
/// produces a different value.
///
/// Only reads made by `source` are tracked. The callback also runs once for
/// the initial value, with no previous value.
///
/// ```rust
/// use ripple_core::reactive::{watch, Signal};
///
/// let count = Signal::new(1);
/// let _watcher = watch(
///     {
///         let count = count.clone();
///         move || count.get()
///     },
///     |value, previous| println!("{previous:?} -> {value}"),
/// );
/// count.set(2);
/// ```
pub fn watch<T, S, F>(source: S, mut callback: F) -> Effect
where
    T: PartialEq + 'static,
    S: Fn() -> T + 'static,
    F: FnMut(&T, Option<&T>) + 'static,
{
    let runtime = Runtime::current();
    let mut previous: Option<T> = None;

    Effect::new(move || {
        let value = source();
        if previous.as_ref() == Some(&value) {
            return;
        }
        runtime.untrack(|| callback(&value, previous.as_ref()));
        previous = Some(value);
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReactiveError;
    use crate::reactive::Signal;

    fn log() -> Rc<RefCell<Vec<String>>> {
        Rc::new(RefCell::new(Vec::new()))
    }

    #[test]
    fn effect_runs_immediately_and_on_change() {
        let source = Signal::new(1);
        let seen = log();

        let effect = Effect::new({
            let (source, seen) = (source.clone(), seen.clone());
            move || seen.borrow_mut().push(source.get().to_string())
        });

        source.set(2);
        source.set(2);
        assert_eq!(*seen.borrow(), ["1", "2"]);
        assert_eq!(effect.run_count(), 2);
    }

    #[test]
    fn cleanup_runs_before_rerun_and_on_dispose() {
        let source = Signal::new(0);
        let events = log();

        let effect = Effect::new({
            let (source, events) = (source.clone(), events.clone());
            move || {
                let value = source.get();
                events.borrow_mut().push(format!("run {value}"));
                let events = events.clone();
                Cleanup::new(move || events.borrow_mut().push(format!("cleanup {value}")))
            }
        });

        source.set(1);
        effect.dispose();
        effect.dispose();
        source.set(2);

        assert_eq!(
            *events.borrow(),
            ["run 0", "cleanup 0", "run 1", "cleanup 1"]
        );
        assert!(effect.is_disposed());
    }

    #[test]
    fn effect_disposing_itself_runs_its_new_cleanup() {
        let source = Signal::new(0);
        let cleanups = Rc::new(Cell::new(0));
        let slot: Rc<RefCell<Option<Effect>>> = Rc::new(RefCell::new(None));

        let effect = Effect::new({
            let (source, cleanups, slot) = (source.clone(), cleanups.clone(), slot.clone());
            move || {
                if source.get() > 0 {
                    if let Some(effect) = slot.borrow().as_ref() {
                        effect.dispose();
                    }
                }
                let cleanups = cleanups.clone();
                Some(Cleanup::new(move || cleanups.set(cleanups.get() + 1)))
            }
        });
        *slot.borrow_mut() = Some(effect.clone());

        source.set(1);
        assert!(effect.is_disposed());
        assert_eq!(cleanups.get(), 2);

        source.set(2);
        assert_eq!(effect.run_count(), 2);
    }

    #[test]
    fn failed_first_run_disposes_the_effect() {
        let runtime = Runtime::new();
        runtime.enter(|| {
            let result = Effect::try_new::<()>(|| panic!("boom"));
            match result {
                Err(ReactiveError::Computation { message, .. }) => assert_eq!(message, "boom"),
                other => panic!("unexpected result: {other:?}"),
            }
            assert_eq!(runtime.node_count(), 0);
        });
    }

    #[test]
    fn once_runs_a_single_time_and_owns_its_children() {
        let runtime = Runtime::new();
        runtime.enter(|| {
            let source = Signal::new(0);
            let inner_runs = Rc::new(Cell::new(0));

            let once = Effect::once({
                let (source, inner_runs) = (source.clone(), inner_runs.clone());
                move || {
                    source.get();
                    Effect::new(move || {
                        source.get();
                        inner_runs.set(inner_runs.get() + 1);
                    });
                }
            });

            source.set(1);
            assert_eq!(once.run_count(), 1);
            assert_eq!(inner_runs.get(), 2);

            // The nested effect goes away with its owner
            once.dispose();
            source.set(2);
            assert_eq!(inner_runs.get(), 2);
        });
    }

    #[test]
    fn dispose_drops_state_even_if_the_cleanup_panics() {
        let runtime = Runtime::new();
        runtime.enter(|| {
            let captured = Rc::new(());
            let effect = Effect::new({
                let captured = captured.clone();
                move || {
                    let _alive = Rc::clone(&captured);
                    Cleanup::new(|| panic!("cleanup failed"))
                }
            });

            assert_eq!(
                effect.try_dispose(),
                Err(ReactiveError::Computation {
                    node: effect.id(),
                    message: "cleanup failed".to_owned(),
                })
            );
            assert!(effect.is_disposed());
            assert_eq!(Rc::strong_count(&captured), 1);
            assert_eq!(effect.try_dispose(), Ok(()));
        });
    }

    #[test]
    fn watch_reports_previous_values() {
        let source = Signal::new(1);
        let seen = log();

        let _watcher = watch(
            {
                let source = source.clone();
                move || source.get() / 10
            },
            {
                let seen = seen.clone();
                move |value: &i32, previous: Option<&i32>| {
                    seen.borrow_mut().push(format!("{previous:?} -> {value}"))
                }
            },
        );

        source.set(5);
        source.set(25);

        assert_eq!(*seen.borrow(), ["None -> 0", "Some(0) -> 2"]);
    }

    #[test]
    fn watch_callback_is_untracked() {
        let source = Signal::new(0);
        let other = Signal::new(0);
        let calls = Rc::new(Cell::new(0));

        let _watcher = watch(
            {
                let source = source.clone();
                move || source.get()
            },
            {
                let (other, calls) = (other.clone(), calls.clone());
                move |_: &i32, _: Option<&i32>| {
                    other.get();
                    calls.set(calls.get() + 1);
                }
            },
        );

        other.set(1);
        assert_eq!(calls.get(), 1);
    }
}

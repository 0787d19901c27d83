//! Signal Implementation
//!
//! A Signal is the fundamental reactive primitive. It holds a value and
//! a version that moves whenever the value changes.
//!
//! # How Signals Work
//!
//! 1. When a signal is read within a computed or effect, the read is recorded
//!    as a dependency together with the signal's current version.
//!
//! 2. When a write produces a value that is not equal to the old one, the
//!    version is bumped and dependents are marked.
//!
//! 3. Writes equal to the current value do nothing at all.
//!
//! # Ownership
//!
//! Signals are not owned by scopes. A signal lives until [`Signal::dispose`]
//! is called or its runtime goes away; handles are cheap clones of each other.

use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::rc::Rc;

use super::options::{EqualsFn, Options};
use super::runtime::Runtime;
use crate::error::{expect_ok, ReactiveError, Result};
use crate::graph::NodeId;

struct SignalInner<T> {
    value: RefCell<T>,
    equals: EqualsFn<T>,
}

/// A reactive signal holding a value of type `T`.
///
/// # Example
///
/// ```rust
/// use ripple_core::reactive::Signal;
///
/// let count = Signal::new(0);
/// count.set(5);
/// count.update(|n| n + 1);
/// assert_eq!(count.get(), 6);
/// ```
pub struct Signal<T: 'static> {
    runtime: Runtime,
    id: NodeId,
    inner: Rc<SignalInner<T>>,
}

impl<T: 'static> Signal<T> {
    /// Create a new signal in the current runtime.
    pub fn new(value: T) -> Self
    where
        T: PartialEq,
    {
        Self::with_options(value, Options::default())
    }

    /// Create a new signal with a custom equality check.
    pub fn with_options(value: T, options: Options<T>) -> Self {
        let runtime = Runtime::current();
        let id = runtime.create_source();
        Self {
            runtime,
            id,
            inner: Rc::new(SignalInner {
                value: RefCell::new(value),
                equals: options.equals,
            }),
        }
    }

    /// Get the signal's node id.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Get the runtime the signal belongs to.
    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    /// Get the current value, recording a dependency if called from a
    /// computed or effect.
    ///
    /// # Panics
    ///
    /// Panics with [`ReactiveError::DisposedNodeAccess`](crate::ReactiveError)
    /// if the signal was disposed.
    pub fn get(&self) -> T
    where
        T: Clone,
    {
        expect_ok(self.try_get())
    }

    /// Like [`get`](Self::get), returning an error for a disposed signal.
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
        expect_ok(self.runtime.ensure_alive(self.id));
        expect_ok(self.read()).clone()
    }

    /// Borrow the current value, recording a dependency.
    ///
    /// The value stays borrowed while `f` runs. Writing this signal from
    /// inside `f` fails with
    /// [`ReactiveError::BorrowConflict`](crate::ReactiveError); with `set`
    /// that means a panic.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        expect_ok(self.try_with(f))
    }

    /// Like [`with`](Self::with), returning an error for a disposed signal.
    pub fn try_with<R>(&self, f: impl FnOnce(&T) -> R) -> Result<R> {
        self.runtime.track_source(self.id)?;
        Ok(f(&*self.read()?))
    }

    /// Replace the value and propagate if it changed.
    ///
    /// # Panics
    ///
    /// Panics if the signal was disposed, or if an effect run by the
    /// resulting flush fails.
    pub fn set(&self, value: T) {
        expect_ok(self.try_set(value));
    }

    /// Like [`set`](Self::set), returning errors instead of panicking.
    ///
    /// A failure of an effect is reported after the value has been stored.
    pub fn try_set(&self, value: T) -> Result<()> {
        self.runtime.ensure_alive(self.id)?;
        {
            let mut current = self.write()?;
            if (self.inner.equals)(&*current, &value) {
                return Ok(());
            }
            *current = value;
        }
        self.runtime.source_changed(self.id)
    }

    /// Compute a new value from the current one and set it.
    pub fn update(&self, f: impl FnOnce(&T) -> T) {
        expect_ok(self.try_update(f));
    }

    /// Like [`update`](Self::update), returning errors instead of panicking.
    pub fn try_update(&self, f: impl FnOnce(&T) -> T) -> Result<()> {
        self.runtime.ensure_alive(self.id)?;
        let next = f(&*self.read()?);
        self.try_set(next)
    }

    /// Mutate the value in place.
    ///
    /// The equality check cannot see the old value here, so this always
    /// counts as a change.
    pub fn modify(&self, f: impl FnOnce(&mut T)) {
        expect_ok(self.try_modify(f));
    }

    /// Like [`modify`](Self::modify), returning errors instead of panicking.
    pub fn try_modify(&self, f: impl FnOnce(&mut T)) -> Result<()> {
        self.runtime.ensure_alive(self.id)?;
        f(&mut *self.write()?);
        self.runtime.source_changed(self.id)
    }

    fn read(&self) -> Result<Ref<'_, T>> {
        self.inner
            .value
            .try_borrow()
            .map_err(|_| ReactiveError::BorrowConflict { node: self.id })
    }

    fn write(&self) -> Result<RefMut<'_, T>> {
        self.inner
            .value
            .try_borrow_mut()
            .map_err(|_| ReactiveError::BorrowConflict { node: self.id })
    }

    /// Get the signal's version. It increases by one per change.
    pub fn version(&self) -> u64 {
        expect_ok(self.runtime.version(self.id))
    }

    /// Remove the signal from the graph.
    ///
    /// Dependents keep their last values and re-run (and fail) only if
    /// something else makes them read it again. Disposing twice is a no-op.
    pub fn dispose(&self) {
        expect_ok(self.runtime.dispose_node(self.id))
    }

    /// Check if the signal was disposed.
    pub fn is_disposed(&self) -> bool {
        !self.runtime.is_alive(self.id)
    }

    /// Split into a read-only and a write-only handle.
    pub fn split(&self) -> (ReadSignal<T>, WriteSignal<T>) {
        (
            ReadSignal {
                signal: self.clone(),
            },
            WriteSignal {
                signal: self.clone(),
            },
        )
    }
}

impl<T: 'static> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            runtime: self.runtime.clone(),
            id: self.id,
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug + 'static> fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("Signal");
        debug.field("id", &self.id);
        match self.inner.value.try_borrow() {
            Ok(value) => debug.field("value", &*value),
            Err(_) => debug.field("value", &"<borrowed>"),
        };
        debug.finish()
    }
}

/// Read half of a [`Signal`].
pub struct ReadSignal<T: 'static> {
    signal: Signal<T>,
}

impl<T: 'static> ReadSignal<T> {
    pub fn id(&self) -> NodeId {
        self.signal.id
    }

    pub fn get(&self) -> T
    where
        T: Clone,
    {
        self.signal.get()
    }

    pub fn try_get(&self) -> Result<T>
    where
        T: Clone,
    {
        self.signal.try_get()
    }

    pub fn get_untracked(&self) -> T
    where
        T: Clone,
    {
        self.signal.get_untracked()
    }

    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.signal.with(f)
    }

    pub fn version(&self) -> u64 {
        self.signal.version()
    }
}

impl<T: 'static> Clone for ReadSignal<T> {
    fn clone(&self) -> Self {
        Self {
            signal: self.signal.clone(),
        }
    }
}

impl<T: fmt::Debug + 'static> fmt::Debug for ReadSignal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ReadSignal").field(&self.signal).finish()
    }
}

/// Write half of a [`Signal`].
pub struct WriteSignal<T: 'static> {
    signal: Signal<T>,
}

impl<T: 'static> WriteSignal<T> {
    pub fn id(&self) -> NodeId {
        self.signal.id
    }

    pub fn set(&self, value: T) {
        self.signal.set(value);
    }

    pub fn try_set(&self, value: T) -> Result<()> {
        self.signal.try_set(value)
    }

    pub fn update(&self, f: impl FnOnce(&T) -> T) {
        self.signal.update(f);
    }

    pub fn modify(&self, f: impl FnOnce(&mut T)) {
        self.signal.modify(f);
    }
}

impl<T: 'static> Clone for WriteSignal<T> {
    fn clone(&self) -> Self {
        Self {
            signal: self.signal.clone(),
        }
    }
}

impl<T: 'static> fmt::Debug for WriteSignal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriteSignal").field("id", &self.signal.id).finish()
    }
}

/// Create a signal in the current runtime.
pub fn create_signal<T: PartialEq + 'static>(value: T) -> Signal<T> {
    Signal::new(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_get_set() {
        let signal = Signal::new(42);
        assert_eq!(signal.get(), 42);

        signal.set(100);
        assert_eq!(signal.get(), 100);
    }

    #[test]
    fn signal_update() {
        let signal = Signal::new(10);
        signal.update(|x| x * 2);
        assert_eq!(signal.get(), 20);
    }

    #[test]
    fn equal_write_keeps_the_version() {
        let signal = Signal::new(String::from("a"));
        assert_eq!(signal.version(), 0);

        signal.set(String::from("a"));
        assert_eq!(signal.version(), 0);

        signal.set(String::from("b"));
        assert_eq!(signal.version(), 1);
    }

    #[test]
    fn custom_equality_decides_what_changes() {
        let signal = Signal::with_options(3_i32, Options::with_equals(|a: &i32, b: &i32| a % 2 == b % 2));

        signal.set(5);
        assert_eq!(signal.get(), 3);

        signal.set(4);
        assert_eq!(signal.get(), 4);
    }

    #[test]
    fn modify_always_counts_as_change() {
        let signal = Signal::new(vec![1, 2]);
        signal.modify(|v| v.push(3));
        signal.modify(|_| {});

        assert_eq!(signal.with(Vec::len), 3);
        assert_eq!(signal.version(), 2);
    }

    #[test]
    fn split_handles_share_the_value() {
        let (read, write) = Signal::new(1).split();
        write.set(2);
        assert_eq!(read.get(), 2);
        assert_eq!(read.id(), write.id());
    }

    #[test]
    fn disposed_signal_fails_fast() {
        let signal = Signal::new(1);
        signal.dispose();
        signal.dispose();

        assert!(signal.is_disposed());
        assert_eq!(
            signal.try_get(),
            Err(ReactiveError::DisposedNodeAccess { node: signal.id() })
        );
        assert_eq!(
            signal.try_set(2),
            Err(ReactiveError::DisposedNodeAccess { node: signal.id() })
        );
    }

    #[test]
    fn writing_inside_with_is_a_borrow_conflict() {
        let signal = Signal::new(1);

        let result = signal.with(|_| signal.try_set(2));
        assert_eq!(result, Err(ReactiveError::BorrowConflict { node: signal.id() }));

        let result = signal.try_modify(|_| assert!(signal.try_get().is_err()));
        assert_eq!(result, Ok(()));
        assert_eq!(signal.get(), 1);
        assert_eq!(signal.version(), 1);
    }
}

//! Ownership scopes.
//!
//! A scope owns every computed and effect created while it is active,
//! including nested scopes, and the cleanups registered with [`on_cleanup`].
//! Disposing it tears all of them down: child scopes first, then owned nodes
//! newest first, then its cleanups newest first. Signals are not owned.
//!
//! Each runtime has a root scope that owns whatever is created outside any
//! other scope. A computed or effect run is itself a scope, reset before
//! every re-run.

use std::fmt;

use super::runtime::Runtime;
use crate::error::{expect_ok, Result};
use crate::graph::ScopeId;

/// Handle to an ownership scope.
///
/// ```rust
/// use ripple_core::reactive::{Effect, Scope, Signal};
///
/// let count = Signal::new(0);
/// let scope = Scope::new();
///
/// scope.run(|| {
///     let count = count.clone();
///     Effect::new(move || println!("count = {}", count.get()));
/// });
///
/// // Stops the effect
/// scope.dispose();
/// count.set(1);
/// ```
#[derive(Clone)]
pub struct Scope {
    runtime: Runtime,
    id: ScopeId,
}

impl Scope {
    /// Create a scope under the active one.
    ///
    /// # Panics
    ///
    /// Panics if the active scope was disposed.
    pub fn new() -> Self {
        expect_ok(Self::try_new())
    }

    /// Like [`new`](Self::new), returning an error if the active scope was
    /// disposed.
    pub fn try_new() -> Result<Self> {
        let runtime = Runtime::current();
        let parent = runtime.current_owner();
        let id = runtime.create_scope(Some(parent))?;
        Ok(Self { runtime, id })
    }

    /// Create a root scope, even if another scope is active.
    ///
    /// It is not disposed with the runtime's root scope.
    pub fn detached() -> Self {
        let runtime = Runtime::current();
        let id = expect_ok(runtime.create_scope(None));
        Self { runtime, id }
    }

    /// Get the current runtime's root scope.
    pub fn root() -> Self {
        let runtime = Runtime::current();
        let id = runtime.root_scope();
        Self { runtime, id }
    }

    /// Get the active scope. Outside of any other scope this is the root.
    pub fn current() -> Self {
        let runtime = Runtime::current();
        let id = runtime.current_owner();
        Self { runtime, id }
    }

    pub fn id(&self) -> ScopeId {
        self.id
    }

    /// Run `f` with this scope active, in the scope's runtime.
    ///
    /// # Panics
    ///
    /// Panics with [`ReactiveError::DisposedScope`](crate::ReactiveError) if
    /// the scope was disposed.
    pub fn run<R>(&self, f: impl FnOnce() -> R) -> R {
        expect_ok(self.try_run(f))
    }

    /// Like [`run`](Self::run), returning an error if the scope was disposed.
    pub fn try_run<R>(&self, f: impl FnOnce() -> R) -> Result<R> {
        self.runtime.enter(|| self.runtime.with_owner(self.id, f))
    }

    /// Register `f` to run when this scope is disposed, or before the
    /// computation it belongs to re-runs. Runs `f` right away if the scope
    /// is already disposed.
    pub fn on_cleanup(&self, f: impl FnOnce() + 'static) {
        self.runtime.add_cleanup(self.id, Box::new(f));
    }

    /// Dispose the scope and everything it owns. Disposing twice is a no-op.
    ///
    /// The root scope is emptied but stays usable.
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
        self.runtime.dispose_scope(self.id)
    }

    pub fn is_disposed(&self) -> bool {
        !self.runtime.scope_is_alive(self.id)
    }
}

impl Default for Scope {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("id", &self.id)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// Create a scope under the active one.
pub fn create_scope() -> Scope {
    Scope::new()
}

/// Run `f` when the active scope goes away.
///
/// Inside a computed or effect that is before the next run or on disposal;
/// elsewhere it is when the active [`Scope`] is disposed.
///
/// ```rust
/// use ripple_core::reactive::{on_cleanup, Effect, Signal};
///
/// let count = Signal::new(0);
/// let _effect = Effect::new({
///     let count = count.clone();
///     move || {
///         let value = count.get();
///         on_cleanup(move || println!("leaving {value}"));
///     }
/// });
/// count.set(1);
/// ```
pub fn on_cleanup(f: impl FnOnce() + 'static) {
    Scope::current().on_cleanup(f)
}

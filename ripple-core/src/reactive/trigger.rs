//! Triggers
//!
//! A trigger is a signal without a value: computations subscribe with
//! [`Trigger::track`] and are re-run by [`Trigger::notify`]. It is useful
//! when the state lives outside the reactive graph and only the fact that it
//! changed needs to propagate.

use std::fmt;

use super::runtime::Runtime;
use crate::error::{expect_ok, Result};
use crate::graph::NodeId;

/// A valueless dependency that can be notified by hand.
///
/// ```rust
/// use std::cell::RefCell;
/// use std::rc::Rc;
/// use ripple_core::reactive::{Effect, Trigger};
///
/// let items = Rc::new(RefCell::new(Vec::new()));
/// let changed = Trigger::new();
///
/// let _effect = Effect::new({
///     let (items, changed) = (items.clone(), changed.clone());
///     move || {
///         changed.track();
///         println!("{} items", items.borrow().len());
///     }
/// });
///
/// items.borrow_mut().push(1);
/// changed.notify();
/// ```
#[derive(Clone)]
pub struct Trigger {
    runtime: Runtime,
    id: NodeId,
}

impl Trigger {
    /// Create a trigger in the current runtime.
    pub fn new() -> Self {
        let runtime = Runtime::current();
        let id = runtime.create_source();
        Self { runtime, id }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Subscribe the running computation, if any.
    ///
    /// # Panics
    ///
    /// Panics with [`ReactiveError::DisposedNodeAccess`](crate::ReactiveError)
    /// if the trigger was disposed.
    pub fn track(&self) {
        expect_ok(self.try_track())
    }

    /// Like [`track`](Self::track), returning an error for a disposed trigger.
    pub fn try_track(&self) -> Result<()> {
        self.runtime.track_source(self.id)
    }

    /// Mark every subscriber as changed.
    ///
    /// # Panics
    ///
    /// Panics if the trigger was disposed, or if an effect run by the
    /// resulting flush fails.
    pub fn notify(&self) {
        expect_ok(self.try_notify())
    }

    /// Like [`notify`](Self::notify), returning errors instead of panicking.
    pub fn try_notify(&self) -> Result<()> {
        self.runtime.ensure_alive(self.id)?;
        self.runtime.source_changed(self.id)
    }

    /// Remove the trigger from the graph. Disposing twice is a no-op.
    pub fn dispose(&self) {
        expect_ok(self.runtime.dispose_node(self.id))
    }

    pub fn is_disposed(&self) -> bool {
        !self.runtime.is_alive(self.id)
    }
}

impl Default for Trigger {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Trigger").field("id", &self.id).finish()
    }
}

/// Create a trigger in the current runtime.
pub fn create_trigger() -> Trigger {
    Trigger::new()
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use super::*;
    use crate::error::ReactiveError;
    use crate::reactive::{batch, Computed, Effect};

    #[test]
    fn notify_reruns_tracking_effects() {
        let trigger = Trigger::new();
        let runs = Rc::new(Cell::new(0));

        let _effect = Effect::new({
            let (trigger, runs) = (trigger.clone(), runs.clone());
            move || {
                trigger.track();
                runs.set(runs.get() + 1);
            }
        });

        trigger.notify();
        trigger.notify();
        assert_eq!(runs.get(), 3);

        // Coalesced like any other write
        batch(|| {
            trigger.notify();
            trigger.notify();
        });
        assert_eq!(runs.get(), 4);
    }

    #[test]
    fn notify_invalidates_computeds() {
        let external = Rc::new(Cell::new(1));
        let trigger = create_trigger();
        let doubled = Computed::new({
            let (external, trigger) = (external.clone(), trigger.clone());
            move || {
                trigger.track();
                external.get() * 2
            }
        });
        assert_eq!(doubled.get(), 2);

        external.set(5);
        assert_eq!(doubled.get(), 2);
        trigger.notify();
        assert_eq!(doubled.get(), 10);
    }

    #[test]
    fn disposed_trigger_fails_fast() {
        let trigger = Trigger::new();
        trigger.dispose();
        trigger.dispose();

        assert!(trigger.is_disposed());
        assert_eq!(
            trigger.try_notify(),
            Err(ReactiveError::DisposedNodeAccess { node: trigger.id() })
        );
        assert_eq!(
            trigger.try_track(),
            Err(ReactiveError::DisposedNodeAccess { node: trigger.id() })
        );
    }
}

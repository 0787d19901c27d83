//! Reactive Primitives
//!
//! This module implements the core reactive system: signals, computeds,
//! effects and the scopes that own them.
//!
//! # Concepts
//!
//! ## Signals
//!
//! A Signal is a container for mutable state. When a signal's value is read
//! within a computed or effect, the read is recorded as a dependency. When the
//! signal's value changes, dependents are marked stale.
//!
//! ## Computeds
//!
//! A Computed is a derived value that caches its result. It re-evaluates only
//! when read while one of its dependencies has actually changed.
//!
//! ## Effects
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies change, once per batch, after the computeds it reads.
//!
//! ## Scopes
//!
//! A Scope owns the computeds and effects created inside it, and cleanups
//! registered with `on_cleanup`, and disposes them together. Anything created
//! outside a scope belongs to the runtime's root scope.
//!
//! ## Triggers
//!
//! A Trigger is a dependency without a value, notified by hand.
//!
//! # Implementation Notes
//!
//! Each thread has a current [`Runtime`] holding the graph and the tracking
//! stack. When a signal is read, the runtime checks for a running computation
//! and, if there is one, records the read together with the signal's version.

mod batch;
mod computed;
mod context;
mod effect;
mod options;
mod runtime;
mod scope;
mod signal;
mod trigger;

pub use batch::{batch, try_batch, untrack};
pub use computed::{create_computed, Computed};
pub use effect::{create_effect, watch, Cleanup, Effect, IntoCleanup};
pub use options::Options;
pub use runtime::Runtime;
pub use scope::{create_scope, on_cleanup, Scope};
pub use signal::{create_signal, ReadSignal, Signal, WriteSignal};
pub use trigger::{create_trigger, Trigger};

//! Ripple Core
//!
//! This crate provides a fine-grained reactive runtime for single-threaded
//! applications. It implements:
//!
//! - Reactive primitives (signals, computeds, effects)
//! - Push-pull propagation: writes mark, reads recompute
//! - Batching with a deterministic effect order
//! - Ownership scopes for bulk disposal
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: User-facing primitives and the runtime that drives them
//! - `graph`: Dependency graph, ownership tree and graph snapshots
//! - `error`: The error type shared by all fallible operations
//! - `config`: Runtime configuration
//!
//! # Example
//!
//! ```rust
//! use ripple_core::reactive::{Computed, Effect, Signal};
//!
//! // Create a signal
//! let count = Signal::new(0);
//!
//! // Create a derived value
//! let doubled = Computed::new({
//!     let count = count.clone();
//!     move || count.get() * 2
//! });
//!
//! // Create an effect
//! let _effect = Effect::new({
//!     let (count, doubled) = (count.clone(), doubled.clone());
//!     move || println!("Count: {}, Doubled: {}", count.get(), doubled.get())
//! });
//!
//! // Update the signal
//! count.set(5);
//! // Effect automatically runs, prints: "Count: 5, Doubled: 10"
//! ```

pub mod config;
pub mod error;
pub mod graph;
pub mod reactive;

pub use config::RuntimeConfig;
pub use error::{ReactiveError, Result};

//! Error Types
//!
//! Every failure the runtime can report. Nothing is swallowed inside the
//! core: errors go to whoever forced the evaluation or flush, and the
//! infallible convenience methods re-raise them as panics carrying the
//! [`ReactiveError`] itself as payload.

use std::any::Any;

use thiserror::Error;

use crate::graph::{NodeId, ScopeId};

/// Errors raised by the reactive runtime.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReactiveError {
    /// A computed was read while it was already evaluating.
    #[error("cyclic dependency: {node} was read during its own evaluation")]
    CyclicDependency { node: NodeId },

    /// A signal, computed or effect was used after disposal.
    #[error("{node} has been disposed")]
    DisposedNodeAccess { node: NodeId },

    /// Something tried to create nodes in a scope that has been disposed.
    #[error("{scope} has been disposed")]
    DisposedScope { scope: ScopeId },

    /// The user function of a computed or effect panicked.
    #[error("computation of {node} failed: {message}")]
    Computation { node: NodeId, message: String },

    /// A cleanup registered on a scope panicked.
    #[error("cleanup registered on {scope} failed: {message}")]
    Cleanup { scope: ScopeId, message: String },

    /// A signal was written while its value was borrowed, e.g. from inside
    /// its own `with`.
    #[error("{node} was written while its value was borrowed")]
    BorrowConflict { node: NodeId },

    /// Effects kept re-triggering each other past the configured bound.
    #[error("runaway propagation: {node} still dirty after {iterations} flush passes")]
    RunawayPropagation { node: NodeId, iterations: usize },
}

/// Result type used throughout the runtime.
pub type Result<T> = std::result::Result<T, ReactiveError>;

impl ReactiveError {
    /// Convert a panic caught while running `node` into an error.
    ///
    /// A payload that is already a `ReactiveError` came from a nested read
    /// and is passed through unchanged.
    pub(crate) fn from_panic(node: NodeId, payload: Box<dyn Any + Send>) -> Self {
        match panic_message(payload) {
            Ok(message) => ReactiveError::Computation { node, message },
            Err(error) => error,
        }
    }

    /// Convert a panic caught while running a cleanup registered on `scope`.
    pub(crate) fn from_cleanup_panic(scope: ScopeId, payload: Box<dyn Any + Send>) -> Self {
        match panic_message(payload) {
            Ok(message) => ReactiveError::Cleanup { scope, message },
            Err(error) => error,
        }
    }

    /// Re-raise this error as a panic.
    ///
    /// The payload is the error itself, so an enclosing computation can
    /// recover it intact.
    pub(crate) fn raise(self) -> ! {
        tracing::debug!(error = %self, "raising reactive error");
        std::panic::panic_any(self)
    }
}

/// Extract the message of a panic, or the error it carried.
fn panic_message(payload: Box<dyn Any + Send>) -> std::result::Result<String, ReactiveError> {
    let payload = match payload.downcast::<ReactiveError>() {
        Ok(error) => return Err(*error),
        Err(payload) => payload,
    };

    Ok(if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_owned()
    })
}

/// Unwrap a runtime result, re-raising the error as a panic.
pub(crate) fn expect_ok<T>(result: Result<T>) -> T {
    match result {
        Ok(value) => value,
        Err(error) => error.raise(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_panics_become_computation_errors() {
        let node = NodeId::new();
        let payload = std::panic::catch_unwind(|| panic!("boom {}", 1)).unwrap_err();

        assert_eq!(
            ReactiveError::from_panic(node, payload),
            ReactiveError::Computation {
                node,
                message: "boom 1".to_owned(),
            }
        );
    }

    #[test]
    fn reactive_error_payloads_pass_through() {
        let inner = NodeId::new();
        let outer = NodeId::new();
        let payload = std::panic::catch_unwind(|| {
            ReactiveError::CyclicDependency { node: inner }.raise()
        })
        .unwrap_err();

        assert_eq!(
            ReactiveError::from_panic(outer, payload),
            ReactiveError::CyclicDependency { node: inner }
        );
    }

    #[test]
    fn cleanup_panics_name_the_scope() {
        let scope = ScopeId::new();
        let payload = std::panic::catch_unwind(|| panic!("cleanup")).unwrap_err();

        assert_eq!(
            ReactiveError::from_cleanup_panic(scope, payload),
            ReactiveError::Cleanup {
                scope,
                message: "cleanup".to_owned(),
            }
        );
    }

    #[test]
    fn errors_name_the_node() {
        let node = NodeId::new();
        let message = ReactiveError::DisposedNodeAccess { node }.to_string();
        assert!(message.contains(&node.to_string()));
    }
}

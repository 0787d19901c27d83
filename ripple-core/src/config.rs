//! Runtime Configuration
//!
//! Host applications usually embed this in their own configuration file,
//! hence the serde derives. Missing fields fall back to the defaults.

use serde::{Deserialize, Serialize};

/// Flush passes allowed before propagation is declared runaway.
pub const DEFAULT_MAX_FLUSH_ITERATIONS: usize = 1000;

/// Tunables for a [`Runtime`](crate::reactive::Runtime).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// How many times one flush may re-run the effect queue before it gives
    /// up with [`ReactiveError::RunawayPropagation`](crate::ReactiveError).
    ///
    /// Each pass runs every effect dirtied by the previous pass. An effect
    /// that writes a signal it depends on needs one extra pass per write.
    pub max_flush_iterations: usize,
}

impl RuntimeConfig {
    /// Set the flush pass bound.
    pub fn with_max_flush_iterations(mut self, max_flush_iterations: usize) -> Self {
        self.max_flush_iterations = max_flush_iterations;
        self
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_flush_iterations: DEFAULT_MAX_FLUSH_ITERATIONS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_use_defaults() {
        let config: RuntimeConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, RuntimeConfig::default());
        assert_eq!(config.max_flush_iterations, 1000);
    }

    #[test]
    fn fields_can_be_overridden() {
        let config: RuntimeConfig =
            serde_json::from_str(r#"{ "max_flush_iterations": 16 }"#).unwrap();
        assert_eq!(config, RuntimeConfig::default().with_max_flush_iterations(16));
    }
}

//! Reactive Instance Configuration
//!
//! Settings that shape how a [`Reactive`](crate::reactive::Reactive) instance
//! schedules its automatic flushes. Configuration is plain data and can be
//! deserialized from JSON so hosts can keep it next to the rest of their
//! settings.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// How writes made outside an explicit batch get flushed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AutoFlush {
    /// Spawn one flush task per tick on the ambient Tokio runtime.
    ///
    /// Falls back to [`AutoFlush::Manual`] when no runtime is running or
    /// the runtime is multi-threaded.
    #[default]
    Tokio,

    /// Leave pending work until `flush()` or `to_be_clean()` is called.
    Manual,
}

/// Configuration for a reactive instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReactiveConfig {
    /// Label used in log output.
    pub name: Option<String>,

    /// Deferred flush strategy.
    pub auto_flush: AutoFlush,

    /// Upper bound on reaction runs within a single flush.
    ///
    /// A reaction that keeps re-triggering itself would otherwise spin
    /// forever. When the bound is hit the flush stops and the remaining
    /// reactions stay pending.
    pub max_flush_iterations: usize,
}

impl Default for ReactiveConfig {
    fn default() -> Self {
        Self {
            name: None,
            auto_flush: AutoFlush::Tokio,
            max_flush_iterations: 100_000,
        }
    }
}

impl ReactiveConfig {
    /// Parse a configuration from a JSON document.
    ///
    /// Missing fields take their default values.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Builder-style setter for the instance label.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Builder-style setter for the auto-flush strategy.
    pub fn with_auto_flush(mut self, auto_flush: AutoFlush) -> Self {
        self.auto_flush = auto_flush;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.max_flush_iterations == 0 {
            return Err(Error::Config(
                "max_flush_iterations must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Name used in log output.
    pub(crate) fn label(&self) -> &str {
        self.name.as_deref().unwrap_or("reactive")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_use_tokio_auto_flush() {
        let config = ReactiveConfig::default();
        assert_eq!(config.auto_flush, AutoFlush::Tokio);
        assert_eq!(config.label(), "reactive");
    }

    #[test]
    fn parses_partial_json() {
        let config = ReactiveConfig::from_json_str(r#"{"name": "ui", "auto_flush": "manual"}"#)
            .unwrap();
        assert_eq!(config.name.as_deref(), Some("ui"));
        assert_eq!(config.auto_flush, AutoFlush::Manual);
        assert_eq!(
            config.max_flush_iterations,
            ReactiveConfig::default().max_flush_iterations
        );
    }

    #[test]
    fn rejects_zero_iteration_budget() {
        let err = ReactiveConfig::from_json_str(r#"{"max_flush_iterations": 0}"#).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}

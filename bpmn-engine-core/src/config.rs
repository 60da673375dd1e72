use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Partition configuration.
///
/// Loaded from an optional YAML file, then overridden field by field from
/// `BPMN_ENGINE_*` environment variables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub partition_id: u32,
    /// Bound of the queue feeding a spawned partition.
    pub command_queue_capacity: usize,
    pub due_date_check_interval_ms: u64,
    /// Commands applied per drain before the partition yields.
    pub max_commands_per_drain: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            partition_id: 1,
            command_queue_capacity: 1_024,
            due_date_check_interval_ms: 100,
            max_commands_per_drain: 10_000,
        }
    }
}

impl EngineConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).context("invalid engine configuration")
    }

    /// Read `path` if given (defaults otherwise) and apply environment
    /// overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => {
                let yaml = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read {}", path.display()))?;
                Self::from_yaml(&yaml)?
            }
            None => Self::default(),
        };
        Ok(config.with_overrides(|name| std::env::var(name).ok()))
    }

    /// Apply overrides from `lookup` (environment variable name → value).
    /// Unparseable values are ignored.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        fn parsed<T: std::str::FromStr>(
            lookup: &impl Fn(&str) -> Option<String>,
            name: &str,
        ) -> Option<T> {
            lookup(name).and_then(|s| s.trim().parse().ok())
        }

        if let Some(v) = parsed(&lookup, "BPMN_ENGINE_PARTITION_ID") {
            self.partition_id = v;
        }
        if let Some(v) = parsed(&lookup, "BPMN_ENGINE_COMMAND_QUEUE_CAPACITY") {
            self.command_queue_capacity = v;
        }
        if let Some(v) = parsed(&lookup, "BPMN_ENGINE_DUE_DATE_CHECK_INTERVAL_MS") {
            self.due_date_check_interval_ms = v;
        }
        if let Some(v) = parsed(&lookup, "BPMN_ENGINE_MAX_COMMANDS_PER_DRAIN") {
            self.max_commands_per_drain = v;
        }
        self
    }

    pub fn due_date_check_interval(&self) -> Duration {
        Duration::from_millis(self.due_date_check_interval_ms.max(1))
    }
}

//! Configuration of the demonstration pipeline run by the `aster` binary.

use std::collections::BTreeMap;
use std::path::Path;

use aster_core::TaskOptions;
use serde::{Deserialize, Serialize};

use crate::{ConfigError, TaskConfig};

/// A source → router → sinks pipeline and the flags of its tasks.
///
/// # Example
///
/// ```rust
/// use aster_config::PipelineConfig;
///
/// let config = PipelineConfig::from_toml_str(r#"
///     name = "demo"
///     elements = 16
///     frames = 4
///
///     [defaults]
///     stats = true
///
///     [tasks.route]
///     stats = true
///     autoalloc = false
/// "#).unwrap();
/// config.validate().unwrap();
/// assert!(!config.task_options("route").autoalloc);
/// assert!(config.task_options("source").autoalloc);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    /// Module name.
    pub name: String,
    /// Frames packed in each socket buffer.
    pub frames: usize,
    /// Elements per socket buffer, all frames included.
    pub elements: usize,
    /// Number of source → router → sink passes.
    pub passes: usize,
    /// Router threshold: inputs whose mean is above it take route 0.
    pub threshold: f64,
    /// Flags applied to every task without an override.
    pub defaults: TaskConfig,
    /// Per-task overrides, keyed by task name.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub tasks: BTreeMap<String, TaskConfig>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            name: "aster".to_string(),
            frames: 1,
            elements: 8,
            passes: 1000,
            threshold: 0.0,
            defaults: TaskConfig::default(),
            tasks: BTreeMap::new(),
        }
    }
}

impl PipelineConfig {
    /// Load a configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;
        Self::from_toml_str(&content)
    }

    /// Parse a configuration from a TOML string.
    pub fn from_toml_str(toml_str: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Save the configuration to a TOML file, creating parent directories.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::create_dir(parent, e))?;
        }
        let content = self.to_toml_string()?;
        std::fs::write(path, content).map_err(|e| ConfigError::write_file(path, e))
    }

    /// Convert the configuration to a TOML string.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Checks that the pipeline can be built and run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.frames == 0 {
            return Err(ConfigError::invalid("frames", "must be at least 1"));
        }
        if self.elements == 0 {
            return Err(ConfigError::invalid("elements", "must be at least 1"));
        }
        if self.elements % self.frames != 0 {
            return Err(ConfigError::invalid(
                "elements",
                format!(
                    "{} elements cannot be split into {} equal frames",
                    self.elements, self.frames
                ),
            ));
        }
        if self.passes == 0 {
            return Err(ConfigError::invalid("passes", "must be at least 1"));
        }
        if !self.threshold.is_finite() {
            return Err(ConfigError::invalid("threshold", "must be a finite number"));
        }
        self.defaults.validate("defaults")?;
        for (name, task) in &self.tasks {
            task.validate(&format!("tasks.{name}"))?;
        }
        Ok(())
    }

    /// Returns the flags of task `name`: its override if any, the defaults otherwise.
    pub fn task_options(&self, name: &str) -> TaskOptions {
        self.tasks.get(name).unwrap_or(&self.defaults).to_options()
    }

    /// Returns the number of elements in one frame.
    pub fn frame_len(&self) -> usize {
        self.elements / self.frames.max(1)
    }
}

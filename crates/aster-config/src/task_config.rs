//! Serialized runtime flags of a task.

use aster_core::{DebugOptions, TaskOptions};
use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Highest float precision worth printing: 17 significant digits round-trip an `f64`.
pub const MAX_DEBUG_PRECISION: usize = 17;

/// Runtime flags of one task, as written in a configuration file.
///
/// Every field is optional in TOML and defaults to the value of
/// [`TaskOptions::default`].
///
/// ```rust
/// use aster_config::TaskConfig;
///
/// let config: TaskConfig = toml::from_str("stats = true\ndebug_limit = 4").unwrap();
/// let options = config.to_options();
/// assert!(options.stats && options.autoalloc);
/// assert_eq!(options.debug_options.limit, Some(4));
/// ```
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TaskConfig {
    /// Allocate input staging buffers and always copy inputs.
    pub autoalloc: bool,
    /// Collect timing statistics.
    pub stats: bool,
    /// Skip validation and tracing.
    pub fast: bool,
    /// Trace socket contents on each call.
    pub debug: bool,
    /// Trace in hexadecimal.
    pub debug_hex: bool,
    /// Elements shown per frame; absent means all.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug_limit: Option<usize>,
    /// Decimals shown for floats.
    pub debug_precision: usize,
    /// Frames shown per socket; absent means all.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug_frame_max: Option<usize>,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self::from(TaskOptions::default())
    }
}

impl TaskConfig {
    /// Converts into the flags [`Task::apply_options`](aster_core::Task::apply_options) takes.
    pub fn to_options(&self) -> TaskOptions {
        TaskOptions::from(*self)
    }

    /// Checks value ranges; `field` prefixes reported field names.
    pub fn validate(&self, field: &str) -> Result<(), ConfigError> {
        if self.debug_precision > MAX_DEBUG_PRECISION {
            return Err(ConfigError::invalid(
                format!("{field}.debug_precision"),
                format!(
                    "{} exceeds the maximum of {MAX_DEBUG_PRECISION}",
                    self.debug_precision
                ),
            ));
        }
        Ok(())
    }
}

impl From<TaskOptions> for TaskConfig {
    fn from(options: TaskOptions) -> Self {
        Self {
            autoalloc: options.autoalloc,
            stats: options.stats,
            fast: options.fast,
            debug: options.debug,
            debug_hex: options.debug_options.hex,
            debug_limit: options.debug_options.limit,
            debug_precision: options.debug_options.precision,
            debug_frame_max: options.debug_options.frame_max,
        }
    }
}

impl From<TaskConfig> for TaskOptions {
    fn from(config: TaskConfig) -> Self {
        TaskOptions {
            autoalloc: config.autoalloc,
            stats: config.stats,
            fast: config.fast,
            debug: config.debug,
            debug_options: DebugOptions {
                hex: config.debug_hex,
                limit: config.debug_limit,
                precision: config.debug_precision,
                frame_max: config.debug_frame_max,
            },
        }
    }
}

//! Configuration for aster pipelines.
//!
//! Task flags ([`TaskConfig`]) and the demonstration pipeline
//! ([`PipelineConfig`]) are stored as TOML:
//!
//! ```toml
//! name = "demo"
//! frames = 2
//! elements = 16
//! passes = 500
//! threshold = 0.25
//!
//! [defaults]
//! stats = true
//!
//! [tasks.route]
//! stats = true
//! autoalloc = false
//! ```

mod error;
mod pipeline;
mod task_config;

pub use error::ConfigError;
pub use pipeline::PipelineConfig;
pub use task_config::{MAX_DEBUG_PRECISION, TaskConfig};

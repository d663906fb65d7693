//! Integration tests for aster-config: files on disk and option application.

use std::collections::BTreeMap;

use aster_config::{ConfigError, PipelineConfig, TaskConfig};
use aster_core::{DataType, Module};
use tempfile::TempDir;

fn sample() -> PipelineConfig {
    let mut tasks = BTreeMap::new();
    tasks.insert(
        "route".to_string(),
        TaskConfig {
            autoalloc: false,
            stats: true,
            ..TaskConfig::default()
        },
    );
    tasks.insert(
        "sink0".to_string(),
        TaskConfig {
            debug: true,
            debug_hex: true,
            debug_limit: Some(4),
            debug_frame_max: Some(1),
            ..TaskConfig::default()
        },
    );
    PipelineConfig {
        name: "roundtrip".to_string(),
        frames: 2,
        elements: 16,
        passes: 25,
        threshold: 0.25,
        defaults: TaskConfig {
            stats: true,
            ..TaskConfig::default()
        },
        tasks,
    }
}

#[test]
fn save_and_load_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("pipeline.toml");
    let config = sample();

    config.save(&path).unwrap();
    assert!(path.exists());
    let loaded = PipelineConfig::load(&path).unwrap();
    assert_eq!(loaded, config);
    loaded.validate().unwrap();
}

#[test]
fn load_missing_file_reports_path() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("missing.toml");
    let err = PipelineConfig::load(&path).unwrap_err();
    assert!(matches!(err, ConfigError::ReadFile { .. }));
    assert!(err.to_string().contains("missing.toml"));
}

#[test]
fn load_malformed_file_is_parse_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bad.toml");
    std::fs::write(&path, "elements = [").unwrap();
    assert!(matches!(
        PipelineConfig::load(&path),
        Err(ConfigError::TomlParse(_))
    ));
}

#[test]
fn toml_text_lists_overrides_as_tables() {
    let text = sample().to_toml_string().unwrap();
    assert!(text.contains("[defaults]"), "{text}");
    assert!(text.contains("[tasks.route]"), "{text}");
    assert!(text.contains("debug_limit = 4"), "{text}");
}

#[test]
fn resolved_options_apply_to_a_task() {
    let config = sample();
    let module = Module::with_frames(&config.name, config.frames);
    let mut b = module.task_builder("sink0");
    b.create_socket_in("in", config.elements, DataType::F32).unwrap();
    b.set_options(config.task_options("sink0"));
    let task = b.build();

    assert!(task.is_debug());
    assert!(task.is_debug_hex());
    assert!(!task.is_stats());
    assert_eq!(task.options().debug_options.limit, Some(4));
    assert_eq!(task.n_frames(), 2);
}

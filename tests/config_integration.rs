//! Integration tests for configuration loading
//!
//! Tests that verify config loading from files and environment variables.

use gyre::config::AppConfig;
use serial_test::serial;
use std::fs;
use std::path::PathBuf;

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("gyre-config-{}-{}", name, std::process::id()));
    fs::create_dir_all(&dir).unwrap();
    dir
}

#[test]
#[serial]
fn test_default_file_loading() {
    std::env::remove_var("GYRE_SIMULATION__FRAMES");

    let config = AppConfig::load().unwrap();
    assert_eq!(config.physics.max_sub_steps, 10);
    assert_eq!(config.physics.gravity, [0.0, -9.81, 0.0]);
    assert_eq!(config.simulation.max_frame_time, 0.25);
}

#[test]
#[serial]
fn test_env_override() {
    std::env::set_var("GYRE_SIMULATION__FRAMES", "12");
    std::env::set_var("GYRE_DEBUG__LOG_LEVEL", "trace");
    let config = AppConfig::load();
    std::env::remove_var("GYRE_SIMULATION__FRAMES");
    std::env::remove_var("GYRE_DEBUG__LOG_LEVEL");

    let config = config.unwrap();
    assert_eq!(config.simulation.frames, 12);
    assert_eq!(config.debug.log_level, "trace");
}

#[test]
#[serial]
fn test_user_file_overrides_default() {
    let dir = scratch_dir("user");
    fs::write(
        dir.join("default.toml"),
        "[physics]\nmax_sub_steps = 10\nfixed_time_step = 0.01\n",
    )
    .unwrap();
    fs::write(dir.join("user.toml"), "[physics]\nmax_sub_steps = 3\n").unwrap();

    let config = AppConfig::load_from(&dir).unwrap();
    fs::remove_dir_all(&dir).unwrap();

    assert_eq!(config.physics.max_sub_steps, 3);
    assert_eq!(config.physics.fixed_time_step, 0.01);
    // Untouched sections keep their defaults
    assert_eq!(config.debug.log_level, "info");
}

#[test]
#[serial]
fn test_missing_directory_uses_defaults() {
    let config = AppConfig::load_from("does/not/exist").unwrap();
    assert_eq!(config.simulation.frames, 240);
    assert!(config.scene.path.is_none());
}

#[test]
#[serial]
fn test_invalid_value_is_an_error() {
    let dir = scratch_dir("invalid");
    fs::write(dir.join("default.toml"), "[physics]\nmax_sub_steps = \"many\"\n").unwrap();

    let result = AppConfig::load_from(&dir);
    fs::remove_dir_all(&dir).unwrap();

    assert!(result.is_err());
}

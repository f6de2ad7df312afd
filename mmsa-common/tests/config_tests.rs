//! Tests for policy file resolution, environment selection and TOML write-back
//!
//! Note: Uses serial_test crate to prevent ENV variable race conditions.
//! Tests that manipulate MMSA_FUSION_CONFIG, MMSA_ENV or RUST_LOG are marked
//! with #[serial].

use mmsa_common::config::{
    resolve_environment, write_toml_config, ConfigOrigin, ConfigPathResolver, CONFIG_ENV_VAR,
    ENVIRONMENT_ENV_VAR,
};
use mmsa_common::logging::LoggingConfig;
use serde::{Deserialize, Serialize};
use serial_test::serial;
use std::env;
use std::path::PathBuf;
use tempfile::TempDir;

#[test]
#[serial]
fn test_cli_argument_takes_precedence() {
    env::set_var(CONFIG_ENV_VAR, "/tmp/mmsa-from-env.toml");

    let resolver = ConfigPathResolver::new(Some(PathBuf::from("/tmp/mmsa-from-cli.toml")));
    let (path, origin) = resolver.resolve();

    assert_eq!(path, PathBuf::from("/tmp/mmsa-from-cli.toml"));
    assert_eq!(origin, ConfigOrigin::CommandLine);

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_env_var_used_without_cli_argument() {
    env::set_var(CONFIG_ENV_VAR, "/tmp/mmsa-from-env.toml");

    let (path, origin) = ConfigPathResolver::new(None).resolve();

    assert_eq!(path, PathBuf::from("/tmp/mmsa-from-env.toml"));
    assert_eq!(origin, ConfigOrigin::Environment);

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_blank_env_var_is_ignored() {
    env::set_var(CONFIG_ENV_VAR, "   ");

    let (_, origin) = ConfigPathResolver::new(None).resolve();
    assert_ne!(origin, ConfigOrigin::Environment);

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_environment_name_resolution() {
    env::remove_var(ENVIRONMENT_ENV_VAR);
    assert_eq!(resolve_environment(None), None);

    env::set_var(ENVIRONMENT_ENV_VAR, "staging");
    assert_eq!(resolve_environment(None), Some("staging".to_string()));
    assert_eq!(
        resolve_environment(Some("production")),
        Some("production".to_string())
    );

    env::set_var(ENVIRONMENT_ENV_VAR, "");
    assert_eq!(resolve_environment(None), None);

    env::remove_var(ENVIRONMENT_ENV_VAR);
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct Sample {
    name: String,
    weight: f64,
}

#[test]
fn test_atomic_write_roundtrip_and_no_temp_left() {
    let temp_dir = TempDir::new().unwrap();
    let target = temp_dir.path().join("nested").join("fusion.toml");

    let sample = Sample {
        name: "text".to_string(),
        weight: 0.5,
    };
    write_toml_config(&sample, &target).unwrap();

    assert!(target.exists());
    assert!(!temp_dir.path().join("nested").join("fusion.toml.tmp").exists());

    let parsed: Sample = toml::from_str(&std::fs::read_to_string(&target).unwrap()).unwrap();
    assert_eq!(parsed, sample);
}

#[test]
fn test_atomic_write_replaces_existing_file() {
    let temp_dir = TempDir::new().unwrap();
    let target = temp_dir.path().join("fusion.toml");
    std::fs::write(&target, "name = \"old\"\nweight = 0.1\n").unwrap();

    let sample = Sample {
        name: "new".to_string(),
        weight: 0.9,
    };
    write_toml_config(&sample, &target).unwrap();

    let content = std::fs::read_to_string(&target).unwrap();
    assert!(content.contains("new"));
    assert!(!content.contains("old"));
}

#[test]
#[serial]
fn test_logging_config_rejects_bad_level() {
    env::remove_var("RUST_LOG");

    let good = LoggingConfig::default();
    assert_eq!(good.level, "info");
    assert!(good.env_filter().is_ok());

    let bad = LoggingConfig {
        level: "mmsa=loudest".to_string(),
        ansi: false,
    };
    assert!(bad.env_filter().is_err());
}

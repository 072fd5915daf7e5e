//! Tests for bootstrap configuration and graceful degradation
//!
//! Tests that manipulate SONGCHECK_ROOT_FOLDER are marked with #[serial]
//! so they never race on the process environment.

use serde::{Deserialize, Serialize};
use serial_test::serial;
use songcheck_common::config::{
    load_toml_config, write_toml_config, CompiledDefaults, LoggingConfig, RootFolderInitializer,
    RootFolderResolver, ROOT_FOLDER_ENV,
};
use std::env;
use std::path::PathBuf;
use tempfile::TempDir;

#[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
struct SampleConfig {
    #[serde(default)]
    root_folder: Option<PathBuf>,
    #[serde(default)]
    logging: LoggingConfig,
}

#[test]
fn test_compiled_defaults_for_current_platform() {
    let defaults = CompiledDefaults::for_current_platform();

    assert!(!defaults.root_folder.as_os_str().is_empty());
    assert_eq!(defaults.log_level, "info");

    #[cfg(target_os = "linux")]
    {
        let path_str = defaults.root_folder.to_string_lossy();
        assert!(path_str.contains("songcheck"));
    }
}

#[test]
#[serial]
fn test_resolver_with_no_overrides_uses_default() {
    env::remove_var(ROOT_FOLDER_ENV);

    let root_folder = RootFolderResolver::new("test-module").resolve();

    assert_eq!(root_folder, CompiledDefaults::for_current_platform().root_folder);
}

#[test]
#[serial]
fn test_resolver_env_beats_toml() {
    env::set_var(ROOT_FOLDER_ENV, "/tmp/songcheck-env-root");

    let root_folder = RootFolderResolver::new("test-module")
        .with_toml_root(Some(PathBuf::from("/tmp/songcheck-toml-root")))
        .resolve();

    env::remove_var(ROOT_FOLDER_ENV);
    assert_eq!(root_folder, PathBuf::from("/tmp/songcheck-env-root"));
}

#[test]
#[serial]
fn test_resolver_cli_beats_env() {
    env::set_var(ROOT_FOLDER_ENV, "/tmp/songcheck-env-root");

    let root_folder = RootFolderResolver::new("test-module")
        .with_cli_arg(Some(PathBuf::from("/tmp/songcheck-cli-root")))
        .resolve();

    env::remove_var(ROOT_FOLDER_ENV);
    assert_eq!(root_folder, PathBuf::from("/tmp/songcheck-cli-root"));
}

#[test]
#[serial]
fn test_resolver_uses_toml_when_env_absent() {
    env::remove_var(ROOT_FOLDER_ENV);

    let root_folder = RootFolderResolver::new("test-module")
        .with_toml_root(Some(PathBuf::from("/tmp/songcheck-toml-root")))
        .resolve();

    assert_eq!(root_folder, PathBuf::from("/tmp/songcheck-toml-root"));
}

#[test]
fn test_initializer_creates_missing_directory() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path().join("a").join("b");

    let initializer = RootFolderInitializer::new(root.clone());
    initializer.ensure_directory_exists().unwrap();

    assert!(root.is_dir());
    assert_eq!(initializer.child("scratch"), root.join("scratch"));
}

#[test]
fn test_missing_toml_returns_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let config: SampleConfig = load_toml_config(&temp_dir.path().join("absent.toml")).unwrap();
    assert_eq!(config, SampleConfig::default());
}

#[test]
fn test_malformed_toml_is_config_error() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("broken.toml");
    std::fs::write(&path, "root_folder = [unterminated").unwrap();

    let result: songcheck_common::Result<SampleConfig> = load_toml_config(&path);
    assert!(matches!(result, Err(songcheck_common::Error::Config(_))));
}

#[test]
fn test_write_then_load_preserves_fields() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("songcheck.toml");
    let config = SampleConfig {
        root_folder: Some(PathBuf::from("/srv/songcheck")),
        logging: LoggingConfig {
            level: "debug".to_string(),
            json: true,
        },
    };

    write_toml_config(&config, &path).unwrap();
    let loaded: SampleConfig = load_toml_config(&path).unwrap();

    assert_eq!(loaded, config);
    assert!(!temp_dir.path().join("songcheck.toml.tmp").exists());
}

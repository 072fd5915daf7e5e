//! Bootstrap configuration tests for songcheck-ingest
//!
//! Tests that manipulate SONGCHECK_ROOT_FOLDER are marked with #[serial]

use serial_test::serial;
use std::path::PathBuf;
use tempfile::TempDir;

use songcheck_common::config::ROOT_FOLDER_ENV;
use songcheck_ingest::config::SeparationFormat;
use songcheck_ingest::IngestConfig;

#[test]
fn test_missing_file_yields_defaults() {
    let dir = TempDir::new().unwrap();
    let config = IngestConfig::load(&dir.path().join("absent.toml")).unwrap();

    assert_eq!(config.pipeline.speed_factor, 0.85);
    assert_eq!(config.tools.separation_model, "htdemucs");
    assert_eq!(config.tools.separation_format, SeparationFormat::Mp3);
}

#[test]
fn test_load_full_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("songcheck-ingest.toml");
    std::fs::write(
        &path,
        r#"
root_folder = "/srv/songcheck"

[logging]
level = "debug"

[pipeline]
speed_factor = 0.8
match_threshold = 0.7
max_concurrent_pipelines = 4

[pipeline.deadlines]
separation_secs = 900

[tools]
transcriber_command = ["whisper-cli", "--model", "base.en"]
separation_device = "cuda"
"#,
    )
    .unwrap();

    let config = IngestConfig::load(&path).unwrap();

    assert_eq!(config.root_folder, Some(PathBuf::from("/srv/songcheck")));
    assert_eq!(config.pipeline.speed_factor, 0.8);
    assert_eq!(config.pipeline.max_concurrent_pipelines, 4);
    assert_eq!(config.pipeline.deadlines.separation_secs, 900);
    assert_eq!(config.pipeline.deadlines.tempo_secs, 300);
    assert_eq!(config.tools.separation_device, "cuda");
    assert_eq!(config.tools.transcriber_command[0], "whisper-cli");
}

#[test]
fn test_invalid_file_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bad.toml");
    std::fs::write(&path, "[pipeline]\nmax_workers = 0\n").unwrap();

    assert!(IngestConfig::load(&path).is_err());
}

#[test]
#[serial]
fn test_env_root_beats_toml_root() {
    let config = IngestConfig {
        root_folder: Some(PathBuf::from("/from/toml")),
        ..Default::default()
    };

    std::env::set_var(ROOT_FOLDER_ENV, "/from/env");
    let paths = config.resolve_paths(None);
    std::env::remove_var(ROOT_FOLDER_ENV);

    assert_eq!(paths.root_folder, PathBuf::from("/from/env"));
    assert_eq!(paths.scratch_root, PathBuf::from("/from/env/scratch"));
    assert_eq!(paths.genre_model_path, PathBuf::from("/from/env/genre_model.json"));
}

#[test]
#[serial]
fn test_cli_root_beats_env() {
    std::env::set_var(ROOT_FOLDER_ENV, "/from/env");
    let paths = IngestConfig::default().resolve_paths(Some(PathBuf::from("/from/cli")));
    std::env::remove_var(ROOT_FOLDER_ENV);

    assert_eq!(paths.root_folder, PathBuf::from("/from/cli"));
    assert_eq!(paths.cache_dir, PathBuf::from("/from/cli/cache"));
}

//! Configuration loading and precedence tests

use flotilla_config::{ConfigError, ConfigLoader};
use rstest::rstest;
use serial_test::serial;
use std::env;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn write_project_config(dir: &Path, content: &str) {
    fs::write(dir.join("flotilla.toml"), content).unwrap();
}

fn loader_with_home(home: &TempDir) -> ConfigLoader {
    ConfigLoader::with_global_path(home.path().join("config.toml"))
}

// ============================================================================
// Skip list formats
// ============================================================================

#[rstest]
#[case::csv("skip_dirs = \"site-packages, dist-packages, build\"")]
#[case::csv_multiline("skip_dirs = \"\"\"site-packages,\n    dist-packages,\n    build\"\"\"")]
#[case::array("skip_dirs = [\"site-packages\", \"dist-packages\", \"build\"]")]
#[serial]
fn test_skip_dirs_formats(#[case] line: &str) {
    let home = TempDir::new().unwrap();
    let project = TempDir::new().unwrap();
    write_project_config(project.path(), &format!("[flotilla]\n{}\n", line));

    let config = loader_with_home(&home)
        .load_from_directory(project.path())
        .unwrap();

    assert_eq!(
        config.skip_dirs(),
        vec!["site-packages", "dist-packages", "build"]
    );
}

// ============================================================================
// Precedence
// ============================================================================

#[test]
#[serial]
fn test_env_skip_dirs_beat_project_file() {
    let home = TempDir::new().unwrap();
    let project = TempDir::new().unwrap();
    write_project_config(project.path(), "[flotilla]\nskip_dirs = \"build\"\n");

    env::set_var("FLOTILLA_SKIP_DIRS", "contrib,docs");
    let config = loader_with_home(&home)
        .load_from_directory(project.path())
        .unwrap();
    env::remove_var("FLOTILLA_SKIP_DIRS");

    assert_eq!(config.skip_dirs(), vec!["contrib", "docs"]);
}

#[test]
#[serial]
fn test_nested_project_file_wins_over_outer() {
    let home = TempDir::new().unwrap();
    let outer = TempDir::new().unwrap();
    write_project_config(outer.path(), "[flotilla]\nnum_procs = 2\n");

    let inner = outer.path().join("inner");
    fs::create_dir(&inner).unwrap();
    write_project_config(&inner, "[flotilla]\nnum_procs = 9\n");

    let config = loader_with_home(&home).load_from_directory(&inner).unwrap();
    assert_eq!(config.num_procs(), Some(9));
    assert_eq!(config.project_root(), Some(inner.as_path()));
}

// ============================================================================
// Errors
// ============================================================================

#[test]
#[serial]
fn test_invalid_toml_reports_file() {
    let home = TempDir::new().unwrap();
    let project = TempDir::new().unwrap();
    write_project_config(project.path(), "[flotilla\nnum_procs = 2\n");

    let err = loader_with_home(&home)
        .load_from_directory(project.path())
        .unwrap_err();

    match err {
        ConfigError::TomlParseError { file, .. } => {
            assert!(file.ends_with("flotilla.toml"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
#[serial]
fn test_missing_explicit_file() {
    let home = TempDir::new().unwrap();
    let project = TempDir::new().unwrap();

    let err = loader_with_home(&home)
        .load_from_file(&project.path().join("nope.toml"))
        .unwrap_err();
    assert!(matches!(err, ConfigError::NotFound(_)));
}

#[test]
#[serial]
fn test_unknown_section_rejected() {
    let home = TempDir::new().unwrap();
    let project = TempDir::new().unwrap();
    write_project_config(project.path(), "[testing]\nnum_procs = 2\n");

    let result = loader_with_home(&home).load_from_directory(project.path());
    assert!(result.is_err());
}

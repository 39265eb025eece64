//! In-process runs through the command layer

use clap::Parser;
use flotilla_cli::commands::run::run;
use flotilla_cli::{Args, RunOutcome};
use flotilla_core::{ensure, Group, Member, Module, ModuleLoader, Registry, TestError};
use pretty_assertions::assert_eq;
use serial_test::serial;
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

fn registry() -> Arc<dyn ModuleLoader> {
    Arc::new(
        Registry::new()
            .with(
                Module::new("demo.test_math")
                    .test("test_add", |_| ensure(1 + 1 == 2, "math is broken"))
                    .test("test_sub", |_| ensure(3 - 1 == 2, "math is broken"))
                    .function(Member::new("test_later", |_| Ok(())).skip("not yet"))
                    .group(Group::new("Broken").test("test_div", |_| Err(TestError::fail("division by zero")))),
            )
            .with(Module::new("demo.test_words").test("test_upper", |_| {
                ensure("abc".to_uppercase() == "ABC", "uppercase failed")
            })),
    )
}

fn args(extra: &[&str]) -> Args {
    let mut argv = vec!["flotilla", "-n", "1", "--noreport", "--no-color"];
    argv.extend_from_slice(extra);
    Args::try_parse_from(argv).unwrap()
}

#[test]
#[serial]
fn test_counts_unexpected_failures() {
    let outcome = run(&args(&["demo.test_math", "demo.test_words"]), registry()).unwrap();
    assert_eq!(
        outcome,
        RunOutcome {
            total: 5,
            unexpected_failures: 1
        }
    );
    assert!(!outcome.success());
}

#[test]
#[serial]
fn test_single_member() {
    let outcome = run(&args(&["demo.test_math:test_add"]), registry()).unwrap();
    assert_eq!(outcome.total, 1);
    assert!(outcome.success());
}

#[test]
#[serial]
fn test_glob_narrows_members() {
    let outcome = run(&args(&["-g", "test_s*", "demo.test_math"]), registry()).unwrap();
    assert_eq!(outcome.total, 1);
}

#[test]
#[serial]
fn test_unknown_member_fails_once() {
    let outcome = run(
        &args(&["demo.test_math:test_nope", "demo.test_math:test_nope"]),
        registry(),
    )
    .unwrap();
    assert_eq!(
        outcome,
        RunOutcome {
            total: 1,
            unexpected_failures: 1
        }
    );
}

#[test]
#[serial]
fn test_dry_run_passes_everything() {
    let outcome = run(&args(&["--dryrun", "demo.test_math"]), registry()).unwrap();
    assert_eq!(outcome.unexpected_failures, 0);
    assert_eq!(outcome.total, 4);
}

#[test]
#[serial]
fn test_report_file_and_testfile() {
    let tmp = TempDir::new().unwrap();
    let report = tmp.path().join("report.out");
    let list = tmp.path().join("tests.in");
    fs::write(&list, "# words only\ndemo.test_words:test_upper\n").unwrap();

    let argv = [
        "flotilla",
        "-n",
        "1",
        "--no-color",
        "-o",
        report.to_str().unwrap(),
        "-t",
        list.to_str().unwrap(),
    ];
    let outcome = run(&Args::try_parse_from(argv).unwrap(), registry()).unwrap();
    assert_eq!(outcome.total, 1);

    let text = fs::read_to_string(&report).unwrap();
    assert!(text.starts_with("demo.test_words:test_upper ... OK"), "{}", text);
    assert!(text.contains("Ran 1 test: 1 passed, 0 failed, 0 skipped"), "{}", text);
}

#[test]
#[serial]
fn test_missing_testfile_is_an_error() {
    let err = run(&args(&["-t", "/nonexistent/flotilla/tests.in"]), registry()).unwrap_err();
    assert!(format!("{:#}", err).contains("can't read test file"));
}

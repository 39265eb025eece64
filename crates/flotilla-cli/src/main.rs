//! `flotilla-selftest`: the harness exercising itself
//!
//! Runs the demonstration suite under `selftest/`. The sources there are both
//! compiled into this binary and discovered on disk.

use std::process::ExitCode;

#[path = "../selftest/mod.rs"]
mod selftest;

fn main() -> ExitCode {
    flotilla_cli::run(selftest::registry())
}

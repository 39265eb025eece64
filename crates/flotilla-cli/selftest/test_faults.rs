//! Deliberate failures, crashes and hangs
//!
//! Each test misbehaves only when faults are enabled.

use super::faults_enabled;
use flotilla_core::{Group, Member, Module, TestError};
use std::time::Duration;

pub fn module() -> Module {
    Module::new("selftest.test_faults")
        .test("test_fails", |_| {
            if faults_enabled() {
                return Err(TestError::fail("deliberate failure"));
            }
            Ok(())
        })
        .test("test_panics", |_| {
            if faults_enabled() {
                panic!("deliberate panic");
            }
            Ok(())
        })
        .test("test_aborts", |_| {
            if faults_enabled() {
                std::process::abort();
            }
            Ok(())
        })
        .test("test_hangs", |_| {
            if faults_enabled() {
                std::thread::sleep(Duration::from_secs(30));
            }
            Ok(())
        })
        .function(
            Member::new("test_unexpected_success", |_| {
                if faults_enabled() {
                    return Ok(());
                }
                Err(TestError::fail("fails as expected"))
            })
            .expected_failure(),
        )
        .group(Group::new("RankFault").nprocs(2).test("test_rank_one_fails", |ctx| {
            if faults_enabled() && ctx.rank() == 1 {
                return Err(TestError::fail("rank 1 disagrees"));
            }
            Ok(())
        }))
}

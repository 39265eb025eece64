//! Plain outcomes: pass, skip, expected failure, captured output

use flotilla_core::{ensure, Group, Member, Module, TestError};
use std::io::Write;

pub fn module() -> Module {
    Module::new("selftest.test_basics")
        .test("test_passes", |_| Ok(()))
        .test("test_output_is_captured", |ctx| {
            writeln!(ctx, "chatter that only shows up with --nocapture")?;
            Ok(())
        })
        .function(Member::new("test_marked_skip", |_| Err(TestError::fail("never runs"))).skip("marked skip"))
        .test("test_runtime_skip", |_| Err(TestError::skip("feature not enabled")))
        .function(
            Member::new("test_known_bug", |_| Err(TestError::fail("rounding is still off"))).expected_failure(),
        )
        .test("helper_is_not_a_test", |_| Err(TestError::fail("helpers are never collected")))
        .group(
            Group::new("Arithmetic")
                .setup(|ctx| {
                    ctx.state().insert("base", 40_i64);
                    Ok(())
                })
                .test("test_add", |ctx| {
                    let base = ctx.state().get::<i64>("base").copied().unwrap_or_default();
                    ensure(base + 2 == 42, format!("{} + 2 != 42", base))
                })
                .test("test_checked_overflow", |_| {
                    ensure(i64::MAX.checked_add(1).is_none(), "overflow went unnoticed")
                }),
        )
        .group(Group::new("Disabled").skip("whole group disabled").test("test_never", |_| Ok(())))
}

//! Shared fixtures: module, group and instance scopes, and inheritance

use super::log_event;
use flotilla_core::{ensure, Group, Module};
use std::sync::Arc;

pub fn module() -> Module {
    let base = Arc::new(
        Group::new("Base")
            .setup_group(|ctx| {
                log_event("base setup");
                ctx.group_state().insert("calls", 0_u32);
                Ok(())
            })
            .teardown_group(|_| {
                log_event("base teardown");
                Ok(())
            })
            .test("test_inherited", |ctx| {
                let calls = ctx.group_state().get_mut::<u32>("calls");
                ensure(calls.is_some(), "group state missing")?;
                if let Some(calls) = calls {
                    *calls += 1;
                }
                Ok(())
            }),
    );

    Module::new("selftest.test_fixtures")
        .setup(|ctx| {
            log_event("module setup");
            ctx.module_state().insert("connection", String::from("db://selftest"));
            Ok(())
        })
        .teardown(|ctx| {
            log_event("module teardown");
            ensure(ctx.module_state().contains("connection"), "module state lost before teardown")
        })
        .test("test_first", |ctx| {
            let conn = ctx.module_state().get::<String>("connection").cloned();
            ensure(conn.as_deref() == Some("db://selftest"), "module setup didn't run first")
        })
        .test("test_second", |ctx| {
            ensure(ctx.module_state().contains("connection"), "module state not shared")
        })
        .test("test_third", |ctx| {
            ensure(ctx.module_state().contains("connection"), "module state not shared")
        })
        .group(
            Group::new("Session")
                .setup_group(|ctx| {
                    log_event("session setup");
                    ctx.group_state().insert("token", 7_u64);
                    Ok(())
                })
                .teardown_group(|_| {
                    log_event("session teardown");
                    Ok(())
                })
                .setup(|ctx| {
                    let token = ctx.group_state().get::<u64>("token").copied();
                    ctx.state().insert("token", token);
                    Ok(())
                })
                .test("test_token", |ctx| {
                    let token = ctx.state().get::<Option<u64>>("token").copied().flatten();
                    ensure(token == Some(7), "instance setup didn't see the group state")
                })
                .test("test_token_again", |ctx| {
                    ensure(ctx.group_state().contains("token"), "group state not shared")
                }),
        )
        .shared_group(Arc::clone(&base))
        .group(
            Group::new("Derived")
                .extends(base)
                .test("test_own", |ctx| {
                    ensure(ctx.group_state().contains("calls"), "inherited group setup didn't run")
                }),
        )
}

//! Multi-process groups and forced isolation

use flotilla_core::{ensure, Group, Module};

pub fn module() -> Module {
    Module::new("selftest.test_distributed")
        .group(
            Group::new("Collective")
                .nprocs(3)
                .test("test_world_size", |ctx| {
                    ensure(ctx.world_size() == 3, format!("world size is {}", ctx.world_size()))
                })
                .test("test_rank_in_range", |ctx| {
                    ensure(ctx.rank() < ctx.world_size(), format!("rank {} out of range", ctx.rank()))
                }),
        )
        .group(
            Group::new("Sandboxed")
                .isolated(true)
                .test("test_runs_in_child", |ctx| {
                    ensure(ctx.world_size() == 1, "isolated tests run as a single rank")
                }),
        )
}

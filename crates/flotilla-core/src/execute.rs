//! Unit execution
//!
//! The [`Executor`] turns a pending unit into a finished one. It picks the
//! run kind (in-process, isolated child, distributed ranks), and for
//! in-process runs drives the fixture protocol:
//!
//! 1. module setup (first unit of the module)
//! 2. group skip check
//! 3. group setup (first unit of the group)
//! 4. instance setup
//! 5. the member itself
//! 6. instance teardown
//! 7. group teardown (last unit of the group)
//! 8. module teardown (last unit of the module)
//!
//! A failed setup cancels its own teardown. Outer teardowns still run. The
//! failure is remembered for the rest of its scope: later units of the same
//! module or group end with the setup's status and message without running.

use crate::capture::{payload_message, PanicCapture};
use crate::error::{HarnessResult, ResolutionResult};
use crate::instrument::{Instrumentation, NoInstrumentation};
use crate::options::{ExecOptions, RendezvousHandle};
use crate::registry::{FixtureScope, FixtureState, OutputSink, RankInfo, TestContext, TestError, TestFn};
use crate::rendezvous::RendezvousServer;
use crate::resolver::{ResolvedModule, Resolver, Target};
use crate::strategy::{distributed, isolated};
use crate::telemetry;
use crate::unit::{RunKind, Status, TestUnit};
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// Module and group fixture state owned by one process
#[derive(Debug, Default)]
pub struct FixtureStore {
    modules: HashMap<String, FixtureState>,
    groups: HashMap<String, FixtureState>,
    broken_modules: HashMap<String, BrokenScope>,
    broken_groups: HashMap<String, BrokenScope>,
}

/// Outcome of a module or group setup that did not succeed
#[derive(Debug, Clone)]
struct BrokenScope {
    status: Status,
    message: String,
}

impl FixtureStore {
    pub fn live_scopes(&self) -> usize {
        self.modules.len() + self.groups.len()
    }
}

/// Where an executor itself runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ExecutorRole {
    /// Coordinator or pool worker; may spawn children
    Parent,
    /// Isolated child or distributed rank; always runs in-process
    Child(RankInfo),
}

/// Runs units, one at a time
pub struct Executor {
    resolver: Arc<Resolver>,
    options: ExecOptions,
    fixtures: FixtureStore,
    instrumentation: Box<dyn Instrumentation>,
    role: ExecutorRole,
    local_rendezvous: Option<RendezvousServer>,
    units_run: usize,
}

impl Executor {
    pub fn new(resolver: Arc<Resolver>, options: ExecOptions) -> Self {
        Self {
            resolver,
            options,
            fixtures: FixtureStore::default(),
            instrumentation: Box::new(NoInstrumentation),
            role: ExecutorRole::Parent,
            local_rendezvous: None,
            units_run: 0,
        }
    }

    pub fn with_instrumentation(mut self, instrumentation: Box<dyn Instrumentation>) -> Self {
        self.instrumentation = instrumentation;
        self
    }

    pub(crate) fn with_role(mut self, role: ExecutorRole) -> Self {
        self.role = role;
        self
    }

    pub fn options(&self) -> &ExecOptions {
        &self.options
    }

    pub fn resolver(&self) -> &Arc<Resolver> {
        &self.resolver
    }

    pub fn fixtures(&self) -> &FixtureStore {
        &self.fixtures
    }

    /// Units this executor has run in-process
    pub fn units_run(&self) -> usize {
        self.units_run
    }

    /// Run a unit to completion
    ///
    /// Never panics and never returns a pending unit; anything that goes
    /// wrong becomes a `FAIL` result. Units that already carry a status are
    /// returned untouched.
    pub fn run(&mut self, unit: TestUnit) -> TestUnit {
        if unit.is_done() {
            return unit;
        }
        let spec = unit.spec().to_string();
        match panic::catch_unwind(AssertUnwindSafe(|| self.dispatch(unit))) {
            Ok(done) => done,
            Err(payload) => TestUnit::failed(
                spec,
                format!("internal error while running test: {}", payload_message(payload.as_ref())),
            ),
        }
    }

    /// Flush instrumentation once all work is done
    pub fn finish(&mut self) {
        if self.units_run > 0 {
            self.instrumentation.save();
        }
    }

    fn dispatch(&mut self, mut unit: TestUnit) -> TestUnit {
        unit.set_nocapture(self.options.nocapture);
        let resolved = match self.prepare(&mut unit) {
            Ok(resolved) => resolved,
            Err(e) => {
                unit.conclude_failed(e.to_string());
                return unit;
            }
        };

        match self.run_kind(&unit) {
            RunKind::InProcess => self.run_in_process(unit, &resolved),
            kind => match self.rendezvous() {
                Ok(handle) => {
                    if kind == RunKind::Distributed {
                        distributed::run_distributed(unit, &self.options, self.resolver.settings(), &handle)
                    } else {
                        isolated::run_isolated(unit, &self.options, self.resolver.settings(), &handle)
                    }
                }
                Err(e) => {
                    unit.conclude_failed(format!("can't start rendezvous server: {}", e));
                    unit
                }
            },
        }
    }

    /// Resolve the unit's specifier and record its identity and attributes
    fn prepare(&self, unit: &mut TestUnit) -> ResolutionResult<ResolvedModule> {
        let resolved = self.resolver.resolve_member(unit.spec())?;
        if let Some((group, member)) = resolved.member_names() {
            unit.set_identity(&resolved.name, group, member, resolved.test_dir());
        }
        let (nprocs, isolated) = match &resolved.target {
            Target::GroupMember { group, .. } => (group.nprocs_value(), group.is_isolated()),
            _ => (0, false),
        };
        unit.set_attributes(nprocs, isolated);
        Ok(resolved)
    }

    fn run_kind(&self, unit: &TestUnit) -> RunKind {
        if self.role != ExecutorRole::Parent {
            return RunKind::InProcess;
        }
        if unit.nprocs() > 0 && !self.options.nompi {
            RunKind::Distributed
        } else if self.options.isolated || unit.isolated() {
            RunKind::Isolated
        } else {
            RunKind::InProcess
        }
    }

    /// The configured rendezvous server, or one owned by this executor
    fn rendezvous(&mut self) -> HarnessResult<RendezvousHandle> {
        if let Some(handle) = &self.options.rendezvous {
            return Ok(handle.clone());
        }
        let server = match self.local_rendezvous.take() {
            Some(server) => server,
            None => RendezvousServer::start()?,
        };
        let handle = server.handle().clone();
        self.local_rendezvous = Some(server);
        Ok(handle)
    }

    fn run_in_process(&mut self, mut unit: TestUnit, resolved: &ResolvedModule) -> TestUnit {
        let (group, member) = match &resolved.target {
            Target::GroupMember { group, member } => (Some(Arc::clone(group)), member.clone()),
            Target::Function(member) => (None, member.clone()),
            Target::Module | Target::Group(_) => {
                unit.conclude_failed(format!("ERROR: test function not specified in '{}'", unit.spec()));
                return unit;
            }
        };
        let module = &resolved.module;
        let marks = unit.marks();

        let module_setup = marks.first_in_module.then(|| module.setup_hook().cloned()).flatten();
        let mut module_teardown = marks.last_in_module.then(|| module.teardown_hook().cloned()).flatten();
        let (mut group_setup, mut group_teardown, instance_setup, instance_teardown) = match &group {
            Some(g) => (
                marks.first_in_group.then(|| g.setup_hook().cloned()).flatten(),
                marks.last_in_group.then(|| g.teardown_hook().cloned()).flatten(),
                g.instance_setup_hook().cloned(),
                g.instance_teardown_hook().cloned(),
            ),
            None => (None, None, None, None),
        };

        let module_key = resolved.name.clone();
        let group_key = group.as_ref().map(|g| format!("{}:{}", resolved.name, g.name()));
        if marks.first_in_module {
            self.fixtures.modules.remove(&module_key);
            self.fixtures.broken_modules.remove(&module_key);
        }
        if marks.first_in_group {
            if let Some(key) = &group_key {
                self.fixtures.groups.remove(key);
                self.fixtures.broken_groups.remove(key);
            }
        }
        let module_broken = self.fixtures.broken_modules.get(&module_key).cloned();
        let group_broken = group_key
            .as_ref()
            .and_then(|key| self.fixtures.broken_groups.get(key))
            .cloned();

        let spec = unit.spec().to_string();
        let rank = match self.role {
            ExecutorRole::Child(rank) => rank,
            ExecutorRole::Parent => RankInfo::default(),
        };
        let mut scratch_group = FixtureState::default();
        let mut instance = FixtureState::default();
        let mut output = OutputSink::new(self.options.nocapture);
        let mut errors = String::new();

        self.instrumentation.start();
        unit.begin();
        let capture = PanicCapture::begin();

        let module_state = self.fixtures.modules.entry(module_key.clone()).or_default();
        let group_state = match &group_key {
            Some(key) => self.fixtures.groups.entry(key.clone()).or_default(),
            None => &mut scratch_group,
        };
        let mut steps = Steps {
            spec: &spec,
            module_state,
            group_state,
            instance: &mut instance,
            output: &mut output,
            errors: &mut errors,
            rank,
            capture: &capture,
        };

        let mut status = Status::Ok;
        let mut expected_fail = false;
        let mut done = false;
        let mut module_failure = None;
        let mut group_failure = None;

        if let Some(broken) = &module_broken {
            steps.note(&broken.message);
            status = broken.status;
            done = true;
            module_teardown = None;
            group_setup = None;
            group_teardown = None;
        } else if let Some(setup) = &module_setup {
            let result = steps.call(setup);
            if result != Status::Ok {
                status = result;
                done = true;
                module_teardown = None;
                group_setup = None;
                group_teardown = None;
                module_failure = Some(BrokenScope {
                    status: result,
                    message: steps.errors.to_string(),
                });
            }
        }

        if !done {
            if let Some(reason) = group.as_deref().and_then(FixtureScope::skip_reason) {
                steps.note(reason);
                status = Status::Skip;
                done = true;
                group_setup = None;
                group_teardown = None;
            }
        }

        if !done {
            if let Some(broken) = &group_broken {
                steps.note(&broken.message);
                status = broken.status;
                done = true;
                group_teardown = None;
            } else if let Some(setup) = group_setup.take() {
                let result = steps.call(&setup);
                if result != Status::Ok {
                    status = result;
                    done = true;
                    group_teardown = None;
                    group_failure = Some(BrokenScope {
                        status: result,
                        message: steps.errors.to_string(),
                    });
                }
            }
        }

        if !done {
            let mut instance_ok = true;
            if let Some(setup) = &instance_setup {
                let result = steps.call(setup);
                if result != Status::Ok {
                    status = result;
                    instance_ok = false;
                }
            }

            if instance_ok {
                if let Some(reason) = member.skip_reason() {
                    steps.note(reason);
                    status = Status::Skip;
                } else {
                    let result = steps.call(member.func());
                    status = match (member.is_expected_failure(), result) {
                        (true, Status::Fail) => {
                            expected_fail = true;
                            Status::Ok
                        }
                        (true, Status::Ok) => {
                            steps.note("unexpected success");
                            Status::Fail
                        }
                        (_, result) => result,
                    };
                }

                if let Some(teardown) = &instance_teardown {
                    if steps.call(teardown) == Status::Fail {
                        status = Status::Fail;
                        expected_fail = false;
                    }
                }
            }
        }

        // a skip raised by a teardown is ignored
        if let Some(teardown) = group_teardown.take() {
            if steps.call(&teardown) == Status::Fail {
                status = Status::Fail;
                expected_fail = false;
            }
        }
        if let Some(teardown) = module_teardown.take() {
            if steps.call(&teardown) == Status::Fail {
                status = Status::Fail;
                expected_fail = false;
            }
        }
        drop(steps);
        drop(capture);

        self.instrumentation.stop();
        if let Some(failure) = module_failure {
            self.fixtures.broken_modules.insert(module_key.clone(), failure);
        }
        if let (Some(failure), Some(key)) = (group_failure, &group_key) {
            self.fixtures.broken_groups.insert(key.clone(), failure);
        }
        if marks.last_in_module {
            self.fixtures.modules.remove(&module_key);
            self.fixtures.broken_modules.remove(&module_key);
        }
        if marks.last_in_group {
            if let Some(key) = &group_key {
                self.fixtures.groups.remove(key);
                self.fixtures.broken_groups.remove(key);
            }
        }

        unit.set_expected_fail(expected_fail);
        unit.set_telemetry(telemetry::memory_usage_mb(), telemetry::load_average());
        unit.set_run_kind(RunKind::InProcess);
        unit.conclude(status, errors, output.into_text());
        self.units_run += 1;

        tracing::debug!(spec = %unit.spec(), status = %status, "unit finished");
        unit
    }
}

/// Environment for calling fixture hooks and test bodies
struct Steps<'a> {
    spec: &'a str,
    module_state: &'a mut FixtureState,
    group_state: &'a mut FixtureState,
    instance: &'a mut FixtureState,
    output: &'a mut OutputSink,
    errors: &'a mut String,
    rank: RankInfo,
    capture: &'a PanicCapture,
}

impl Steps<'_> {
    /// Run one hook, mapping its outcome to a status and recording messages
    fn call(&mut self, hook: &TestFn) -> Status {
        let mut ctx = TestContext::new(
            self.spec,
            &mut *self.module_state,
            &mut *self.group_state,
            &mut *self.instance,
            &mut *self.output,
            self.rank,
        );
        match panic::catch_unwind(AssertUnwindSafe(|| hook(&mut ctx))) {
            Ok(Ok(())) => Status::Ok,
            Ok(Err(TestError::Skip(reason))) => {
                self.note(&reason);
                Status::Skip
            }
            Ok(Err(TestError::Fail(msg))) => {
                self.note(&msg);
                Status::Fail
            }
            Err(payload) => {
                let report = self.capture.take_report(payload.as_ref());
                self.note(&report);
                Status::Fail
            }
        }
    }

    fn note(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        if !self.errors.is_empty() && !self.errors.ends_with('\n') {
            self.errors.push('\n');
        }
        self.errors.push_str(text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instrument::CallCounter;
    use crate::registry::{ensure, Group, Member, Module, Outcome, Registry};
    use crate::resolver::ResolverSettings;
    use crate::unit::FixtureMarks;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    fn pass(_: &mut TestContext<'_>) -> Outcome {
        Ok(())
    }

    fn executor(registry: Registry) -> Executor {
        let settings = ResolverSettings {
            search_path: Vec::new(),
            ..Default::default()
        };
        let resolver = Resolver::new(Arc::new(registry), settings).unwrap();
        Executor::new(Arc::new(resolver), ExecOptions::default())
    }

    fn unit(spec: &str, marks: FixtureMarks) -> TestUnit {
        let mut unit = TestUnit::new(spec);
        *unit.marks_mut() = marks;
        unit
    }

    fn journal() -> (Arc<Mutex<Vec<String>>>, impl Fn(&'static str) -> TestFn) {
        let log: Arc<Mutex<Vec<String>>> = Arc::default();
        let sink = Arc::clone(&log);
        let recorder = move |name: &'static str| -> TestFn {
            let sink = Arc::clone(&sink);
            Arc::new(move |_: &mut TestContext<'_>| {
                sink.lock().push(name.to_string());
                Ok(())
            })
        };
        (log, recorder)
    }

    #[test]
    fn test_passing_function_captures_output() {
        let mut exec = executor(Registry::new().with(Module::new("m").test("test_hi", |ctx| {
            let spec = ctx.spec().to_string();
            writeln!(ctx, "hello from {}", spec)?;
            Ok(())
        })));

        let done = exec.run(TestUnit::new("m:test_hi"));
        assert_eq!(done.status(), Some(Status::Ok));
        assert_eq!(done.output(), "hello from m:test_hi\n");
        assert_eq!(done.module(), Some("m"));
        assert_eq!(done.member(), Some("test_hi"));
        assert!(done.start_time().is_some() && done.end_time().is_some());
    }

    #[test]
    fn test_panic_becomes_failure_with_location() {
        let mut exec = executor(Registry::new().with(Module::new("m").test("test_boom", |_| {
            let v: Vec<u8> = Vec::new();
            assert_eq!(v.len(), 1, "vector should not be empty");
            Ok(())
        })));

        let done = exec.run(TestUnit::new("m:test_boom"));
        assert_eq!(done.status(), Some(Status::Fail));
        assert!(done.err_msg().contains("vector should not be empty"), "{}", done.err_msg());
        assert!(done.err_msg().contains("execute.rs"), "{}", done.err_msg());
    }

    #[test]
    fn test_resolution_failure_is_a_result() {
        let mut exec = executor(Registry::new().with(Module::new("m").group(Group::new("G"))));

        let done = exec.run(TestUnit::new("m:G"));
        assert_eq!(done.status(), Some(Status::Fail));
        assert!(done.err_msg().contains("test function not specified"));

        let done = exec.run(TestUnit::new("nowhere:test_x"));
        assert_eq!(done.status(), Some(Status::Fail));
        assert!(done.err_msg().contains("nowhere"));
    }

    #[test]
    fn test_fixture_order_for_a_group_run() {
        let (log, rec) = journal();
        let module = Module::new("m")
            .setup({
                let f = rec("module_setup");
                move |ctx| f(ctx)
            })
            .teardown({
                let f = rec("module_teardown");
                move |ctx| f(ctx)
            })
            .group(
                Group::new("G")
                    .setup_group({
                        let f = rec("group_setup");
                        move |ctx| f(ctx)
                    })
                    .teardown_group({
                        let f = rec("group_teardown");
                        move |ctx| f(ctx)
                    })
                    .setup({
                        let f = rec("setup");
                        move |ctx| f(ctx)
                    })
                    .teardown({
                        let f = rec("teardown");
                        move |ctx| f(ctx)
                    })
                    .test("test_a", {
                        let f = rec("test_a");
                        move |ctx| f(ctx)
                    })
                    .test("test_b", {
                        let f = rec("test_b");
                        move |ctx| f(ctx)
                    }),
            );
        let mut exec = executor(Registry::new().with(module));

        let first = FixtureMarks {
            first_in_module: true,
            first_in_group: true,
            ..Default::default()
        };
        let last = FixtureMarks {
            last_in_module: true,
            last_in_group: true,
            ..Default::default()
        };
        assert_eq!(exec.run(unit("m:G.test_a", first)).status(), Some(Status::Ok));
        assert_eq!(exec.fixtures().live_scopes(), 2);
        assert_eq!(exec.run(unit("m:G.test_b", last)).status(), Some(Status::Ok));
        assert_eq!(exec.fixtures().live_scopes(), 0);

        assert_eq!(
            *log.lock(),
            vec![
                "module_setup",
                "group_setup",
                "setup",
                "test_a",
                "teardown",
                "setup",
                "test_b",
                "teardown",
                "group_teardown",
                "module_teardown",
            ]
        );
    }

    #[test]
    fn test_state_flows_from_fixtures_to_members() {
        let module = Module::new("m")
            .setup(|ctx| {
                ctx.module_state().insert("db", vec![1, 2, 3]);
                Ok(())
            })
            .group(
                Group::new("G")
                    .setup_group(|ctx| {
                        ctx.group_state().insert("factor", 10);
                        Ok(())
                    })
                    .setup(|ctx| {
                        ctx.state().insert("scratch", String::from("fresh"));
                        Ok(())
                    })
                    .test("test_sum", |ctx| {
                        let sum: i32 = ctx.module_state().get::<Vec<i32>>("db").unwrap().iter().sum();
                        let factor = *ctx.group_state().get::<i32>("factor").unwrap();
                        ensure(sum * factor == 60, "sum times factor")?;
                        ensure(ctx.state().get::<String>("scratch").is_some(), "instance state")
                    }),
            );
        let mut exec = executor(Registry::new().with(module));

        let done = exec.run(unit("m:G.test_sum", FixtureMarks::all()));
        assert_eq!(done.status(), Some(Status::Ok), "{}", done.err_msg());
    }

    #[test]
    fn test_failed_module_setup_cancels_module_teardown() {
        let (log, rec) = journal();
        let module = Module::new("m")
            .setup(|_| Err(TestError::fail("no database")))
            .teardown({
                let f = rec("module_teardown");
                move |ctx| f(ctx)
            })
            .test("test_x", {
                let f = rec("test_x");
                move |ctx| f(ctx)
            });
        let mut exec = executor(Registry::new().with(module));

        let done = exec.run(unit("m:test_x", FixtureMarks::all()));
        assert_eq!(done.status(), Some(Status::Fail));
        assert_eq!(done.err_msg(), "no database");
        assert!(log.lock().is_empty());
    }

    #[test]
    fn test_failed_group_setup_still_runs_module_teardown() {
        let (log, rec) = journal();
        let module = Module::new("m")
            .teardown({
                let f = rec("module_teardown");
                move |ctx| f(ctx)
            })
            .group(
                Group::new("G")
                    .setup_group(|_| Err(TestError::fail("group setup broke")))
                    .teardown_group({
                        let f = rec("group_teardown");
                        move |ctx| f(ctx)
                    })
                    .test("test_a", pass),
            );
        let mut exec = executor(Registry::new().with(module));

        let done = exec.run(unit("m:G.test_a", FixtureMarks::all()));
        assert_eq!(done.status(), Some(Status::Fail));
        assert_eq!(*log.lock(), vec!["module_teardown"]);
    }

    fn marks(first: bool, last: bool) -> FixtureMarks {
        FixtureMarks {
            first_in_module: first,
            last_in_module: last,
            first_in_group: first,
            last_in_group: last,
        }
    }

    #[test]
    fn test_failed_module_setup_fails_the_whole_module() {
        let (log, rec) = journal();
        let mut module = Module::new("m")
            .setup(|_| Err(TestError::fail("module setup broke")))
            .teardown({
                let f = rec("module_teardown");
                move |ctx| f(ctx)
            });
        for name in ["test_1", "test_2", "test_3"] {
            let f = rec(name);
            module = module.test(name, move |ctx| f(ctx));
        }
        let mut exec = executor(Registry::new().with(module));

        let results = [
            exec.run(unit("m:test_1", marks(true, false))),
            exec.run(unit("m:test_2", marks(false, false))),
            exec.run(unit("m:test_3", marks(false, true))),
        ];
        for done in &results {
            assert_eq!(done.status(), Some(Status::Fail), "{}", done.spec());
            assert_eq!(done.err_msg(), "module setup broke");
        }
        assert!(log.lock().is_empty(), "{:?}", log.lock());
        assert_eq!(exec.fixtures().live_scopes(), 0);

        // a fresh pass over the module tries its setup again
        let again = exec.run(unit("m:test_1", FixtureMarks::all()));
        assert_eq!(again.err_msg(), "module setup broke");
    }

    #[test]
    fn test_skipped_group_setup_skips_every_member() {
        let (log, rec) = journal();
        let module = Module::new("m").group(
            Group::new("G")
                .setup_group(|_| Err(TestError::skip("no device")))
                .teardown_group({
                    let f = rec("group_teardown");
                    move |ctx| f(ctx)
                })
                .setup({
                    let f = rec("setup");
                    move |ctx| f(ctx)
                })
                .test("test_a", {
                    let f = rec("test_a");
                    move |ctx| f(ctx)
                })
                .test("test_b", {
                    let f = rec("test_b");
                    move |ctx| f(ctx)
                }),
        );
        let mut exec = executor(Registry::new().with(module));

        let a = exec.run(unit("m:G.test_a", marks(true, false)));
        let b = exec.run(unit("m:G.test_b", marks(false, true)));
        assert_eq!((a.status(), b.status()), (Some(Status::Skip), Some(Status::Skip)));
        assert_eq!(b.err_msg(), "no device");
        assert!(log.lock().is_empty(), "{:?}", log.lock());
    }

    #[test]
    fn test_group_skip_cancels_group_fixtures() {
        let (log, rec) = journal();
        let module = Module::new("m").group(
            Group::new("G")
                .skip("needs hardware")
                .setup_group({
                    let f = rec("group_setup");
                    move |ctx| f(ctx)
                })
                .test("test_a", pass),
        );
        let mut exec = executor(Registry::new().with(module));

        let done = exec.run(unit("m:G.test_a", FixtureMarks::all()));
        assert_eq!(done.status(), Some(Status::Skip));
        assert_eq!(done.err_msg(), "needs hardware");
        assert!(log.lock().is_empty());
    }

    #[test]
    fn test_member_skip_and_runtime_skip() {
        let module = Module::new("m")
            .function(Member::new("test_marked", pass).skip("not today"))
            .test("test_runtime", |_| Err(TestError::skip("no network")));
        let mut exec = executor(Registry::new().with(module));

        let marked = exec.run(TestUnit::new("m:test_marked"));
        assert_eq!(marked.status(), Some(Status::Skip));
        assert_eq!(marked.err_msg(), "not today");

        let runtime = exec.run(TestUnit::new("m:test_runtime"));
        assert_eq!(runtime.status(), Some(Status::Skip));
        assert_eq!(runtime.err_msg(), "no network");
    }

    #[test]
    fn test_expected_failure_outcomes() {
        let module = Module::new("m")
            .function(Member::new("test_known_bug", |_| Err(TestError::fail("still broken"))).expected_failure())
            .function(Member::new("test_fixed_bug", pass).expected_failure());
        let mut exec = executor(Registry::new().with(module));

        let known = exec.run(TestUnit::new("m:test_known_bug"));
        assert_eq!(known.status(), Some(Status::Ok));
        assert!(known.expected_fail());

        let fixed = exec.run(TestUnit::new("m:test_fixed_bug"));
        assert_eq!(fixed.status(), Some(Status::Fail));
        assert!(!fixed.expected_fail());
        assert!(fixed.is_unexpected_failure());
        assert!(fixed.err_msg().contains("unexpected success"));
    }

    #[test]
    fn test_teardown_failure_dominates_and_teardown_skip_is_ignored() {
        let module = Module::new("m")
            .group(
                Group::new("Bad")
                    .teardown(|_| Err(TestError::fail("leaked handle")))
                    .test("test_a", pass),
            )
            .group(
                Group::new("Skippy")
                    .teardown(|_| Err(TestError::skip("ignored")))
                    .test("test_a", pass),
            );
        let mut exec = executor(Registry::new().with(module));

        let bad = exec.run(TestUnit::new("m:Bad.test_a"));
        assert_eq!(bad.status(), Some(Status::Fail));
        assert!(bad.err_msg().contains("leaked handle"));

        let skippy = exec.run(TestUnit::new("m:Skippy.test_a"));
        assert_eq!(skippy.status(), Some(Status::Ok));
    }

    #[test]
    fn test_failed_instance_setup_skips_member_and_teardown() {
        let (log, rec) = journal();
        let module = Module::new("m").group(
            Group::new("G")
                .setup(|_| Err(TestError::fail("setup broke")))
                .teardown({
                    let f = rec("teardown");
                    move |ctx| f(ctx)
                })
                .test("test_a", {
                    let f = rec("test_a");
                    move |ctx| f(ctx)
                }),
        );
        let mut exec = executor(Registry::new().with(module));

        let done = exec.run(TestUnit::new("m:G.test_a"));
        assert_eq!(done.status(), Some(Status::Fail));
        assert!(log.lock().is_empty());
    }

    #[test]
    fn test_instrumentation_calls() {
        let counter = CallCounter::new();
        let mut exec = executor(Registry::new().with(Module::new("m").test("test_a", pass)))
            .with_instrumentation(Box::new(counter.clone()));

        exec.run(TestUnit::new("m:test_a"));
        exec.run(TestUnit::new("m:test_a"));
        exec.finish();
        assert_eq!(counter.counts(), [2, 2, 1]);
    }

    #[test]
    fn test_finished_unit_is_passed_through() {
        let mut exec = executor(Registry::new());
        let done = TestUnit::failed("m:test_a", "earlier");
        assert_eq!(exec.run(done.clone()), done);
    }

    #[test]
    fn test_nompi_runs_distributed_group_in_process() {
        let module = Module::new("m").group(
            Group::new("Par")
                .nprocs(3)
                .test("test_rank", |ctx| ensure(ctx.rank() == 0 && ctx.world_size() == 1, "single rank")),
        );
        let settings = ResolverSettings {
            search_path: Vec::new(),
            ..Default::default()
        };
        let resolver = Resolver::new(Arc::new(Registry::new().with(module)), settings).unwrap();
        let options = ExecOptions {
            nompi: true,
            ..Default::default()
        };
        let mut exec = Executor::new(Arc::new(resolver), options);

        let done = exec.run(TestUnit::new("m:Par.test_rank"));
        assert_eq!(done.status(), Some(Status::Ok), "{}", done.err_msg());
        assert_eq!(done.nprocs(), 3);
        assert_eq!(done.run_kind(), RunKind::InProcess);
    }
}

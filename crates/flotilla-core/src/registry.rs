//! Native test sources
//!
//! A test binary registers its modules up front. Each [`Module`] owns ordered
//! test [`Group`]s and free test functions, and may carry module fixtures.
//! Groups carry group fixtures (`setup_group`/`teardown_group`), per-member
//! hooks (`setup`/`teardown`) and run attributes (`skip`, `nprocs`,
//! `isolated`). A group may extend another group and inherits its members,
//! hooks and attributes.

use crate::error::{ResolutionError, ResolutionResult};
use crate::resolver::{ModuleLoader, ResolutionContext};
use indexmap::IndexMap;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::io::{self, Write};
use std::sync::Arc;

/// What a test body, fixture or hook returns
pub type Outcome = Result<(), TestError>;

/// A test body, fixture or hook
pub type TestFn = Arc<dyn Fn(&mut TestContext<'_>) -> Outcome + Send + Sync>;

/// Why a step did not succeed
#[derive(Debug, Clone, PartialEq)]
pub enum TestError {
    /// Assertion failure or error
    Fail(String),
    /// The step asked to be skipped
    Skip(String),
}

impl TestError {
    pub fn fail(msg: impl Into<String>) -> Self {
        TestError::Fail(msg.into())
    }

    pub fn skip(reason: impl Into<String>) -> Self {
        TestError::Skip(reason.into())
    }
}

impl fmt::Display for TestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestError::Fail(msg) => write!(f, "{}", msg),
            TestError::Skip(reason) => write!(f, "skipped: {}", reason),
        }
    }
}

// Lets `?` work on any error inside a test body.
impl<E> From<E> for TestError
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn from(err: E) -> Self {
        TestError::Fail(err.to_string())
    }
}

/// Fail the current step unless `cond` holds
pub fn ensure(cond: bool, msg: impl Into<String>) -> Outcome {
    if cond {
        Ok(())
    } else {
        Err(TestError::Fail(msg.into()))
    }
}

/// Typed key/value state shared between fixtures and test bodies
#[derive(Default)]
pub struct FixtureState {
    values: HashMap<String, Box<dyn Any + Send>>,
}

impl FixtureState {
    pub fn insert<T: Any + Send>(&mut self, key: impl Into<String>, value: T) {
        self.values.insert(key.into(), Box::new(value));
    }

    /// Borrow a value; `None` if missing or of another type
    pub fn get<T: Any>(&self, key: &str) -> Option<&T> {
        self.values.get(key).and_then(|v| v.downcast_ref::<T>())
    }

    pub fn get_mut<T: Any>(&mut self, key: &str) -> Option<&mut T> {
        self.values.get_mut(key).and_then(|v| v.downcast_mut::<T>())
    }

    pub fn remove(&mut self, key: &str) -> bool {
        self.values.remove(key).is_some()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Debug for FixtureState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.values.keys()).finish()
    }
}

/// Position of this process in a distributed run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RankInfo {
    pub rank: usize,
    pub size: usize,
}

impl Default for RankInfo {
    fn default() -> Self {
        Self { rank: 0, size: 1 }
    }
}

/// Where test output goes
pub(crate) enum OutputSink {
    Captured(Vec<u8>),
    Passthrough,
}

impl OutputSink {
    pub(crate) fn new(nocapture: bool) -> Self {
        if nocapture {
            OutputSink::Passthrough
        } else {
            OutputSink::Captured(Vec::new())
        }
    }

    pub(crate) fn into_text(self) -> String {
        match self {
            OutputSink::Captured(buf) => String::from_utf8_lossy(&buf).into_owned(),
            OutputSink::Passthrough => String::new(),
        }
    }
}

impl Write for OutputSink {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        match self {
            OutputSink::Captured(buf) => buf.write(data),
            OutputSink::Passthrough => io::stdout().write(data),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            OutputSink::Captured(_) => Ok(()),
            OutputSink::Passthrough => io::stdout().flush(),
        }
    }
}

/// Handed to every test body and fixture
///
/// Writing to the context is the test's standard output: it is captured into
/// the result unless the run uses `nocapture`.
pub struct TestContext<'a> {
    spec: &'a str,
    module_state: &'a mut FixtureState,
    group_state: &'a mut FixtureState,
    state: &'a mut FixtureState,
    output: &'a mut OutputSink,
    rank: RankInfo,
}

impl<'a> TestContext<'a> {
    pub(crate) fn new(
        spec: &'a str,
        module_state: &'a mut FixtureState,
        group_state: &'a mut FixtureState,
        state: &'a mut FixtureState,
        output: &'a mut OutputSink,
        rank: RankInfo,
    ) -> Self {
        Self {
            spec,
            module_state,
            group_state,
            state,
            output,
            rank,
        }
    }

    /// Specifier of the unit being run
    pub fn spec(&self) -> &str {
        self.spec
    }

    /// State that lives from module setup to module teardown
    pub fn module_state(&mut self) -> &mut FixtureState {
        &mut *self.module_state
    }

    /// State that lives from group setup to group teardown
    pub fn group_state(&mut self) -> &mut FixtureState {
        &mut *self.group_state
    }

    /// State for this member only (instance `setup` to `teardown`)
    pub fn state(&mut self) -> &mut FixtureState {
        &mut *self.state
    }

    pub fn rank(&self) -> usize {
        self.rank.rank
    }

    pub fn world_size(&self) -> usize {
        self.rank.size
    }
}

impl Write for TestContext<'_> {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.output.write(data)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.output.flush()
    }
}

fn hook<F>(f: F) -> TestFn
where
    F: Fn(&mut TestContext<'_>) -> Outcome + Send + Sync + 'static,
{
    Arc::new(f)
}

/// A single test
#[derive(Clone)]
pub struct Member {
    name: String,
    func: TestFn,
    skip: Option<String>,
    expected_failure: bool,
}

impl Member {
    pub fn new<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&mut TestContext<'_>) -> Outcome + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            func: hook(f),
            skip: None,
            expected_failure: false,
        }
    }

    /// Always skip this member
    pub fn skip(mut self, reason: impl Into<String>) -> Self {
        self.skip = Some(reason.into());
        self
    }

    /// A failure counts as success; a success counts as failure
    pub fn expected_failure(mut self) -> Self {
        self.expected_failure = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn skip_reason(&self) -> Option<&str> {
        self.skip.as_deref()
    }

    pub fn is_expected_failure(&self) -> bool {
        self.expected_failure
    }

    pub(crate) fn func(&self) -> &TestFn {
        &self.func
    }
}

impl fmt::Debug for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Member")
            .field("name", &self.name)
            .field("skip", &self.skip)
            .field("expected_failure", &self.expected_failure)
            .finish()
    }
}

/// Anything that can own a setup/teardown pair
pub trait FixtureScope {
    fn scope_name(&self) -> &str;

    fn setup_hook(&self) -> Option<&TestFn>;

    fn teardown_hook(&self) -> Option<&TestFn>;

    fn skip_reason(&self) -> Option<&str> {
        None
    }

    fn has_setup(&self) -> bool {
        self.setup_hook().is_some()
    }

    fn has_teardown(&self) -> bool {
        self.teardown_hook().is_some()
    }

    /// Units sharing this scope must run in one process, in order
    fn has_fixture(&self) -> bool {
        self.has_setup() || self.has_teardown()
    }
}

/// A named collection of test members with shared fixtures
#[derive(Clone, Default)]
pub struct Group {
    name: String,
    parent: Option<Arc<Group>>,
    members: Vec<Member>,
    setup_group: Option<TestFn>,
    teardown_group: Option<TestFn>,
    setup: Option<TestFn>,
    teardown: Option<TestFn>,
    skip: Option<String>,
    nprocs: Option<usize>,
    isolated: Option<bool>,
}

impl Group {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Inherit members, hooks and attributes from `parent`
    pub fn extends(mut self, parent: Arc<Group>) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Add a test member
    pub fn test<F>(self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&mut TestContext<'_>) -> Outcome + Send + Sync + 'static,
    {
        self.member(Member::new(name, f))
    }

    /// Add a prepared member (with skip/expected-failure markers)
    pub fn member(mut self, member: Member) -> Self {
        self.members.push(member);
        self
    }

    pub fn setup_group<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut TestContext<'_>) -> Outcome + Send + Sync + 'static,
    {
        self.setup_group = Some(hook(f));
        self
    }

    pub fn teardown_group<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut TestContext<'_>) -> Outcome + Send + Sync + 'static,
    {
        self.teardown_group = Some(hook(f));
        self
    }

    /// Runs before every member
    pub fn setup<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut TestContext<'_>) -> Outcome + Send + Sync + 'static,
    {
        self.setup = Some(hook(f));
        self
    }

    /// Runs after every member whose setup succeeded
    pub fn teardown<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut TestContext<'_>) -> Outcome + Send + Sync + 'static,
    {
        self.teardown = Some(hook(f));
        self
    }

    /// Skip every member of the group
    pub fn skip(mut self, reason: impl Into<String>) -> Self {
        self.skip = Some(reason.into());
        self
    }

    /// Run each member across `n` cooperating processes
    pub fn nprocs(mut self, n: usize) -> Self {
        self.nprocs = Some(n);
        self
    }

    /// Run each member in its own process
    pub fn isolated(mut self, isolated: bool) -> Self {
        self.isolated = Some(isolated);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// This group followed by its ancestors, nearest first
    fn lineage(&self) -> impl Iterator<Item = &Group> {
        std::iter::successors(Some(self), |g| g.parent.as_deref())
    }

    fn nearest<T>(&self, pick: impl Fn(&Group) -> Option<&T>) -> Option<&T> {
        self.lineage().find_map(pick)
    }

    /// All members, inherited ones first; a redefined name keeps its first position
    pub fn members(&self) -> Vec<&Member> {
        let chain: Vec<&Group> = self.lineage().collect();
        let mut merged: IndexMap<&str, &Member> = IndexMap::new();
        for group in chain.iter().rev() {
            for member in &group.members {
                merged.insert(member.name(), member);
            }
        }
        merged.into_values().collect()
    }

    /// Look up a member, own definitions first
    pub fn get_member(&self, name: &str) -> Option<&Member> {
        self.lineage()
            .find_map(|g| g.members.iter().find(|m| m.name == name))
    }

    pub fn instance_setup_hook(&self) -> Option<&TestFn> {
        self.nearest(|g| g.setup.as_ref())
    }

    pub fn instance_teardown_hook(&self) -> Option<&TestFn> {
        self.nearest(|g| g.teardown.as_ref())
    }

    /// Processes each member runs on; 0 means a normal run
    pub fn nprocs_value(&self) -> usize {
        self.nearest(|g| g.nprocs.as_ref()).copied().unwrap_or(0)
    }

    pub fn is_isolated(&self) -> bool {
        self.nearest(|g| g.isolated.as_ref()).copied().unwrap_or(false)
    }
}

impl FixtureScope for Group {
    fn scope_name(&self) -> &str {
        &self.name
    }

    fn setup_hook(&self) -> Option<&TestFn> {
        self.nearest(|g| g.setup_group.as_ref())
    }

    fn teardown_hook(&self) -> Option<&TestFn> {
        self.nearest(|g| g.teardown_group.as_ref())
    }

    fn skip_reason(&self) -> Option<&str> {
        self.nearest(|g| g.skip.as_ref()).map(String::as_str)
    }
}

impl fmt::Debug for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Group")
            .field("name", &self.name)
            .field("parent", &self.parent.as_ref().map(|p| p.name()))
            .field("members", &self.members)
            .field("skip", &self.skip)
            .field("nprocs", &self.nprocs)
            .field("isolated", &self.isolated)
            .finish()
    }
}

/// A top-level item of a module
#[derive(Debug, Clone)]
pub enum Item {
    Group(Arc<Group>),
    Function(Member),
}

impl Item {
    pub fn name(&self) -> &str {
        match self {
            Item::Group(g) => g.name(),
            Item::Function(f) => f.name(),
        }
    }
}

/// A test module, addressed by its dotted name
#[derive(Clone, Default)]
pub struct Module {
    name: String,
    items: Vec<Item>,
    setup: Option<TestFn>,
    teardown: Option<TestFn>,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Module setup, run once before the first unit of the module
    pub fn setup<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut TestContext<'_>) -> Outcome + Send + Sync + 'static,
    {
        self.setup = Some(hook(f));
        self
    }

    /// Module teardown, run once after the last unit of the module
    pub fn teardown<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut TestContext<'_>) -> Outcome + Send + Sync + 'static,
    {
        self.teardown = Some(hook(f));
        self
    }

    pub fn group(self, group: Group) -> Self {
        self.shared_group(Arc::new(group))
    }

    /// Add a group that other groups may also extend
    pub fn shared_group(mut self, group: Arc<Group>) -> Self {
        self.items.push(Item::Group(group));
        self
    }

    /// Add a free test function
    pub fn test<F>(self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&mut TestContext<'_>) -> Outcome + Send + Sync + 'static,
    {
        self.function(Member::new(name, f))
    }

    pub fn function(mut self, member: Member) -> Self {
        self.items.push(Item::Function(member));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Items in registration order
    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn lookup(&self, name: &str) -> Option<&Item> {
        self.items.iter().find(|item| item.name() == name)
    }
}

impl FixtureScope for Module {
    fn scope_name(&self) -> &str {
        &self.name
    }

    fn setup_hook(&self) -> Option<&TestFn> {
        self.setup.as_ref()
    }

    fn teardown_hook(&self) -> Option<&TestFn> {
        self.teardown.as_ref()
    }
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Module")
            .field("name", &self.name)
            .field("items", &self.items)
            .field("setup", &self.setup.is_some())
            .field("teardown", &self.teardown.is_some())
            .finish()
    }
}

/// The set of modules linked into a test binary
#[derive(Debug, Clone, Default)]
pub struct Registry {
    modules: IndexMap<String, Arc<Module>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a module (builder style)
    pub fn with(mut self, module: Module) -> Self {
        self.add(module);
        self
    }

    /// Register a module; a later module with the same name replaces the earlier one
    pub fn add(&mut self, module: Module) -> &mut Self {
        self.modules
            .insert(module.name().to_string(), Arc::new(module));
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<Module>> {
        self.modules.get(name).cloned()
    }

    pub fn module_names(&self) -> impl Iterator<Item = &str> {
        self.modules.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

impl ModuleLoader for Registry {
    fn import(&self, name: &str, ctx: &ResolutionContext) -> ResolutionResult<Arc<Module>> {
        self.get(name).ok_or_else(|| {
            ResolutionError::import(
                name,
                format!(
                    "no module named '{}' is registered (searched {})",
                    name,
                    ctx.describe()
                ),
            )
        })
    }
}

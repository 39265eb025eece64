//! Test discovery
//!
//! Expands starting points (directories, module files, dotted module names
//! and specifiers) into tasks. Units whose module or group has a shared
//! fixture are held back and released at the end of the input as one task
//! per fixture scope, so that setup and teardown run once, in the process
//! that runs every member. Everything else streams out as it's found.

use crate::error::HarnessResult;
use crate::pattern::NameMatcher;
use crate::registry::{FixtureScope, Group, Item, Module};
use crate::resolver::{Resolution, ResolvedModule, Resolver, Target};
use crate::specifier;
use crate::unit::{FixtureMarks, Task, TestUnit};
use indexmap::IndexMap;
use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

/// Name filter supplied by the caller
pub type NamePredicate = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Default glob for discoverable module files
pub const DEFAULT_MODULE_PATTERN: &str = "test*.rs";

/// Expands starting points into tasks
#[derive(Clone)]
pub struct Discoverer {
    resolver: Arc<Resolver>,
    skip_dir: NamePredicate,
    is_test: NamePredicate,
    module_pattern: NameMatcher,
}

impl Discoverer {
    /// Walks every directory and accepts the resolver's member names
    pub fn new(resolver: Arc<Resolver>) -> HarnessResult<Self> {
        let names = Arc::clone(&resolver);
        Ok(Self {
            resolver,
            skip_dir: Arc::new(|_| false),
            is_test: Arc::new(move |name| names.is_test_name(name)),
            module_pattern: NameMatcher::single(DEFAULT_MODULE_PATTERN)?,
        })
    }

    /// Directories whose name matches are not walked
    pub fn skip_dirs(mut self, predicate: NamePredicate) -> Self {
        self.skip_dir = predicate;
        self
    }

    /// Members whose name doesn't match are not collected
    pub fn member_filter(mut self, predicate: NamePredicate) -> Self {
        self.is_test = predicate;
        self
    }

    /// File name glob for modules found while walking directories
    pub fn module_pattern(mut self, glob: &str) -> HarnessResult<Self> {
        self.module_pattern = NameMatcher::single(glob)?;
        Ok(self)
    }

    pub fn resolver(&self) -> &Arc<Resolver> {
        &self.resolver
    }

    /// Lazily expand `starts` into tasks
    pub fn discover<I>(&self, starts: I) -> Discovery<I::IntoIter>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        Discovery {
            discoverer: self.clone(),
            starts: starts.into_iter(),
            walker: None,
            ready: VecDeque::new(),
            seen: HashSet::new(),
            module_groups: IndexMap::new(),
            class_groups: IndexMap::new(),
            flushed: false,
        }
    }

    fn walk(&self, dir: &Path) -> Box<dyn Iterator<Item = PathBuf> + Send> {
        let skip_dir = Arc::clone(&self.skip_dir);
        let module_pattern = self.module_pattern.clone();
        let resolver = Arc::clone(&self.resolver);
        let extension = self.resolver.settings().extension.clone();

        let files = WalkDir::new(dir)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(move |entry| {
                !entry.file_type().is_dir() || !skip_dir(&entry.file_name().to_string_lossy())
            })
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    tracing::warn!(error = %e, "skipping unreadable path during discovery");
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file())
            .map(walkdir::DirEntry::into_path)
            .filter(move |path| {
                let has_extension = path.extension().is_some_and(|e| e == extension.as_str());
                let name = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
                has_extension && !resolver.is_package_marker(path) && module_pattern.matches(&name)
            });
        Box::new(files)
    }
}

/// A unit held back for a module fixture, with its group cluster
struct Held {
    cluster: String,
    unit: TestUnit,
}

/// Lazy, single-pass stream of discovered tasks
pub struct Discovery<I> {
    discoverer: Discoverer,
    starts: I,
    walker: Option<Box<dyn Iterator<Item = PathBuf> + Send>>,
    ready: VecDeque<Task>,
    seen: HashSet<String>,
    module_groups: IndexMap<String, Vec<Held>>,
    class_groups: IndexMap<String, Vec<TestUnit>>,
    flushed: bool,
}

impl<I> Discovery<I>
where
    I: Iterator,
    I::Item: AsRef<str>,
{
    fn expand_start(&mut self, start: &str) {
        let start = start.trim();
        if start.is_empty() {
            return;
        }
        let path = Path::new(start);
        if path.is_dir() {
            self.walker = Some(self.discoverer.walk(path));
            return;
        }
        self.expand_spec(start);
    }

    fn expand_spec(&mut self, spec: &str) {
        match self.discoverer.resolver.resolve(spec) {
            Ok(Resolution::Package { dir, .. }) => {
                self.walker = Some(self.discoverer.walk(&dir));
            }
            Ok(Resolution::Module(resolved)) => self.expand_module(&resolved),
            Err(e) => {
                if self.seen.insert(spec.to_string()) {
                    tracing::debug!(spec, error = %e, "discovery failure");
                    self.ready.push_back(Task::Single(TestUnit::failed(spec, e.to_string())));
                }
            }
        }
    }

    fn expand_module(&mut self, resolved: &ResolvedModule) {
        let is_test = Arc::clone(&self.discoverer.is_test);
        match &resolved.target {
            Target::Module => {
                for item in resolved.module.items() {
                    match item {
                        Item::Group(group) => {
                            for member in group.members() {
                                if is_test(member.name()) {
                                    self.add(resolved, Some(group), member.name());
                                }
                            }
                        }
                        Item::Function(function) => {
                            if is_test(function.name()) {
                                self.add(resolved, None, function.name());
                            }
                        }
                    }
                }
            }
            Target::Group(group) => {
                for member in group.members() {
                    if is_test(member.name()) {
                        self.add(resolved, Some(group), member.name());
                    }
                }
            }
            Target::GroupMember { group, member } => self.add(resolved, Some(group), member.name()),
            Target::Function(member) => self.add(resolved, None, member.name()),
        }
    }

    fn add(&mut self, resolved: &ResolvedModule, group: Option<&Arc<Group>>, member: &str) {
        let group_name = group.map(|g| g.name());
        let key = specifier::join(&resolved.name, group_name, member);
        if !self.seen.insert(key.clone()) {
            return;
        }

        let mut unit = TestUnit::new(key);
        unit.set_identity(&resolved.name, group_name, member, resolved.test_dir());
        if let Some(group) = group {
            unit.set_attributes(group.nprocs_value(), group.is_isolated());
        }

        let module: &Module = &resolved.module;
        if module.has_fixture() {
            self.module_groups.entry(resolved.name.clone()).or_default().push(Held {
                cluster: group_name.unwrap_or_default().to_string(),
                unit,
            });
        } else if let Some(group) = group.filter(|g| g.has_fixture()) {
            let scope = format!("{}:{}", resolved.name, group.name());
            self.class_groups.entry(scope).or_default().push(unit);
        } else {
            self.ready.push_back(Task::Single(unit));
        }
    }

    /// Release held units: module groups first, then group-only fixtures
    fn flush(&mut self) {
        for (_, held) in self.module_groups.drain(..) {
            let units = cluster(held);
            self.ready.push_back(Task::Group(mark_module_group(units)));
        }
        for (_, units) in self.class_groups.drain(..) {
            self.ready.push_back(Task::Group(mark_class_group(units)));
        }
    }
}

/// Order units so members of the same group are adjacent, keeping first appearance order
fn cluster(held: Vec<Held>) -> Vec<(String, TestUnit)> {
    let mut clusters: IndexMap<String, Vec<TestUnit>> = IndexMap::new();
    for Held { cluster, unit } in held {
        clusters.entry(cluster).or_default().push(unit);
    }
    clusters
        .into_iter()
        .flat_map(|(name, units)| units.into_iter().map(move |u| (name.clone(), u)))
        .collect()
}

fn mark_module_group(units: Vec<(String, TestUnit)>) -> Vec<TestUnit> {
    let count = units.len();
    let mut marked = Vec::with_capacity(count);
    for (index, (cluster, mut unit)) in units.iter().cloned().enumerate() {
        let prev_same = index > 0 && units[index - 1].0 == cluster;
        let next_same = index + 1 < count && units[index + 1].0 == cluster;
        *unit.marks_mut() = FixtureMarks {
            first_in_module: index == 0,
            last_in_module: index + 1 == count,
            first_in_group: !prev_same,
            last_in_group: !next_same,
        };
        marked.push(unit);
    }
    marked
}

fn mark_class_group(mut units: Vec<TestUnit>) -> Vec<TestUnit> {
    let count = units.len();
    for (index, unit) in units.iter_mut().enumerate() {
        *unit.marks_mut() = FixtureMarks {
            first_in_module: true,
            last_in_module: true,
            first_in_group: index == 0,
            last_in_group: index + 1 == count,
        };
    }
    units
}

impl<I> Iterator for Discovery<I>
where
    I: Iterator,
    I::Item: AsRef<str>,
{
    type Item = Task;

    fn next(&mut self) -> Option<Task> {
        loop {
            if let Some(task) = self.ready.pop_front() {
                return Some(task);
            }

            if let Some(walker) = self.walker.as_mut() {
                match walker.next() {
                    Some(file) => {
                        self.expand_spec(&file.to_string_lossy());
                        continue;
                    }
                    None => self.walker = None,
                }
            }

            match self.starts.next() {
                Some(start) => self.expand_start(start.as_ref()),
                None if !self.flushed => {
                    self.flushed = true;
                    self.flush();
                }
                None => return None,
            }
        }
    }
}

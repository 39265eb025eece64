//! Specifier resolution
//!
//! Maps a specifier to a module (by dotted name or by file path), and then to
//! a group, a group member or a free test function inside it. File paths are
//! turned into dotted names by walking up through package directories, the
//! ones holding a package marker file.

use crate::error::{HarnessResult, ResolutionError, ResolutionResult};
use crate::pattern::NameMatcher;
use crate::registry::{Group, Item, Member, Module};
use crate::specifier::Specifier;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Package marker file name
pub const PACKAGE_MARKER: &str = "mod.rs";

/// Test module file extension
pub const MODULE_EXTENSION: &str = "rs";

/// Produces modules by dotted name
pub trait ModuleLoader: Send + Sync {
    fn import(&self, name: &str, ctx: &ResolutionContext) -> ResolutionResult<Arc<Module>>;
}

/// Module search path in effect for one resolution
///
/// Built per call; it never leaks into later resolutions.
#[derive(Debug, Clone, Default)]
pub struct ResolutionContext {
    search_path: Vec<PathBuf>,
}

impl ResolutionContext {
    pub fn new(search_path: Vec<PathBuf>) -> Self {
        Self { search_path }
    }

    /// The base path with `dir` searched first
    pub fn with_test_dir(base: &[PathBuf], dir: &Path) -> Self {
        let mut search_path = Vec::with_capacity(base.len() + 1);
        search_path.push(dir.to_path_buf());
        search_path.extend(base.iter().filter(|p| p.as_path() != dir).cloned());
        Self { search_path }
    }

    pub fn search_path(&self) -> &[PathBuf] {
        &self.search_path
    }

    /// Human-readable search path for error messages
    pub fn describe(&self) -> String {
        if self.search_path.is_empty() {
            return "no directories".to_string();
        }
        self.search_path
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Resolution settings that travel to worker processes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolverSettings {
    /// Directories searched for dotted module names
    pub search_path: Vec<PathBuf>,

    /// File that marks a directory as a package
    pub package_marker: String,

    /// Module file extension (without the dot)
    pub extension: String,

    /// Member name globs
    pub test_globs: Vec<String>,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            search_path: vec![PathBuf::from(".")],
            package_marker: PACKAGE_MARKER.to_string(),
            extension: MODULE_EXTENSION.to_string(),
            test_globs: vec!["test*".to_string()],
        }
    }
}

/// Where a module part points
#[derive(Debug, Clone, PartialEq)]
pub enum ModuleRef {
    /// A module with its dotted name and its source file, when one was found
    Module { name: String, file: Option<PathBuf> },
    /// A package directory; discovery walks it
    Package { name: String, dir: PathBuf },
}

/// What a specifier selects inside a module
#[derive(Debug, Clone)]
pub enum Target {
    Module,
    Group(Arc<Group>),
    GroupMember { group: Arc<Group>, member: Member },
    Function(Member),
}

/// A fully resolved specifier
#[derive(Debug, Clone)]
pub struct ResolvedModule {
    pub name: String,
    pub file: Option<PathBuf>,
    pub module: Arc<Module>,
    pub target: Target,
}

impl ResolvedModule {
    /// Directory holding the module source
    pub fn test_dir(&self) -> Option<PathBuf> {
        self.file
            .as_deref()
            .and_then(Path::parent)
            .map(Path::to_path_buf)
    }

    /// Group and member names for a runnable target
    pub fn member_names(&self) -> Option<(Option<&str>, &str)> {
        match &self.target {
            Target::GroupMember { group, member } => Some((Some(group.name()), member.name())),
            Target::Function(member) => Some((None, member.name())),
            Target::Module | Target::Group(_) => None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Resolution {
    Package { name: String, dir: PathBuf },
    Module(ResolvedModule),
}

/// Resolves specifiers through a [`ModuleLoader`]
#[derive(Clone)]
pub struct Resolver {
    loader: Arc<dyn ModuleLoader>,
    settings: ResolverSettings,
    members: NameMatcher,
}

impl Resolver {
    pub fn new(loader: Arc<dyn ModuleLoader>, settings: ResolverSettings) -> HarnessResult<Self> {
        let members = NameMatcher::new(&settings.test_globs)?;
        Ok(Self {
            loader,
            settings,
            members,
        })
    }

    pub fn settings(&self) -> &ResolverSettings {
        &self.settings
    }

    pub fn loader(&self) -> Arc<dyn ModuleLoader> {
        Arc::clone(&self.loader)
    }

    /// Does a member name follow the test naming convention?
    pub fn is_test_name(&self, name: &str) -> bool {
        self.members.matches(name)
    }

    pub fn is_package_marker(&self, path: &Path) -> bool {
        path.file_name()
            .is_some_and(|n| n == self.settings.package_marker.as_str())
    }

    /// Dotted module name for a source file
    ///
    /// The file stem is prefixed by every enclosing directory holding a
    /// package marker. A package marker itself names its directory.
    pub fn module_name_for_path(&self, path: &Path) -> ResolutionResult<String> {
        let path = absolute(path)
            .map_err(|e| ResolutionError::bad_path(path, e))?;

        let mut parts: Vec<String> = Vec::new();
        if !self.is_package_marker(&path) {
            let stem = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .ok_or_else(|| ResolutionError::bad_path(&path, "not a module file"))?;
            parts.push(stem);
        }

        let mut dir = path.parent();
        while let Some(current) = dir {
            if !current.join(&self.settings.package_marker).is_file() {
                break;
            }
            match current.file_name() {
                Some(name) => parts.push(name.to_string_lossy().into_owned()),
                None => break,
            }
            dir = current.parent();
        }

        if parts.is_empty() {
            return Err(ResolutionError::bad_path(&path, "can't determine module name"));
        }
        parts.reverse();
        Ok(parts.join("."))
    }

    /// Find the source of a dotted module on the search path
    pub fn find_module_file(&self, name: &str, ctx: &ResolutionContext) -> Option<PathBuf> {
        let rel: PathBuf = name.split('.').collect();
        ctx.search_path().iter().find_map(|base| {
            let file = base.join(&rel).with_extension(&self.settings.extension);
            if file.is_file() {
                return Some(file);
            }
            let marker = base.join(&rel).join(&self.settings.package_marker);
            marker.is_file().then_some(marker)
        })
    }

    /// Classify the module part of a specifier
    pub fn locate(&self, spec: &Specifier) -> ResolutionResult<ModuleRef> {
        if spec.is_path(&self.settings.extension) {
            let path = PathBuf::from(spec.module());
            if !path.is_file() {
                return Err(ResolutionError::bad_path(&path, "no such file"));
            }
            let name = self.module_name_for_path(&path)?;
            if self.is_package_marker(&path) {
                let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
                return Ok(ModuleRef::Package { name, dir });
            }
            return Ok(ModuleRef::Module {
                name,
                file: Some(path),
            });
        }

        let name = spec.module().to_string();
        let ctx = ResolutionContext::new(self.settings.search_path.clone());
        match self.find_module_file(&name, &ctx) {
            Some(file) if self.is_package_marker(&file) => {
                let dir = file.parent().map(Path::to_path_buf).unwrap_or_default();
                Ok(ModuleRef::Package { name, dir })
            }
            file => Ok(ModuleRef::Module { name, file }),
        }
    }

    /// Import a module with its own directory searched first
    pub fn import(&self, name: &str, file: Option<&Path>) -> ResolutionResult<Arc<Module>> {
        let ctx = match file.and_then(Path::parent) {
            Some(dir) => ResolutionContext::with_test_dir(&self.settings.search_path, dir),
            None => ResolutionContext::new(self.settings.search_path.clone()),
        };
        self.loader.import(name, &ctx)
    }

    /// Resolve a specifier string
    pub fn resolve(&self, spec: &str) -> ResolutionResult<Resolution> {
        let spec = Specifier::parse(spec)?;

        let (name, file) = match self.locate(&spec)? {
            ModuleRef::Package { name, dir } => {
                if let Some(rest) = spec.rest() {
                    return Err(ResolutionError::not_found(name, rest));
                }
                return Ok(Resolution::Package { name, dir });
            }
            ModuleRef::Module { name, file } => (name, file),
        };

        let module = self.import(&name, file.as_deref())?;
        let target = self.select(&name, &module, &spec)?;

        Ok(Resolution::Module(ResolvedModule {
            name,
            file,
            module,
            target,
        }))
    }

    /// Resolve a specifier that must name exactly one test
    pub fn resolve_member(&self, spec: &str) -> ResolutionResult<ResolvedModule> {
        match self.resolve(spec)? {
            Resolution::Module(resolved) if resolved.member_names().is_some() => Ok(resolved),
            _ => Err(ResolutionError::MemberNotSpecified {
                spec: spec.trim().to_string(),
            }),
        }
    }

    fn select(&self, module_name: &str, module: &Module, spec: &Specifier) -> ResolutionResult<Target> {
        let Some((object, tail)) = spec.object() else {
            return Ok(Target::Module);
        };

        match module.lookup(object) {
            Some(Item::Group(group)) => match tail {
                None => Ok(Target::Group(Arc::clone(group))),
                Some(member) => match group.get_member(member) {
                    Some(found) => Ok(Target::GroupMember {
                        group: Arc::clone(group),
                        member: found.clone(),
                    }),
                    None => Err(ResolutionError::MemberNotFound {
                        module: module_name.to_string(),
                        group: group.name().to_string(),
                        member: member.to_string(),
                    }),
                },
            },
            Some(Item::Function(function)) if tail.is_none() => {
                if self.is_test_name(function.name()) {
                    Ok(Target::Function(function.clone()))
                } else {
                    Err(ResolutionError::NotATest {
                        module: module_name.to_string(),
                        name: function.name().to_string(),
                    })
                }
            }
            // a dotted rest after a function names a function that doesn't exist
            Some(Item::Function(_)) | None => {
                let rest = spec.rest().unwrap_or(object);
                Err(ResolutionError::not_found(module_name, rest))
            }
        }
    }
}

impl fmt::Debug for Resolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

/// Absolute form of `path` without requiring the file to exist
fn absolute(path: &Path) -> std::io::Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    Ok(std::env::current_dir()?.join(path))
}

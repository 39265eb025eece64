//! Flotilla test discovery and execution engine
//!
//! Provides the machinery behind a flotilla harness binary:
//! - Test registration (modules, fixture groups, members)
//! - Specifier resolution and directory discovery
//! - Fixture-aware unit execution with panic capture
//! - Serial, pooled, isolated and distributed execution strategies
//! - The rendezvous channel and wire protocol used between processes
//!
//! A harness binary registers its test modules, hands the registry to
//! [`child::run_child_role`] first (the binary is re-executed for workers,
//! isolated children and ranks), then discovers and executes tasks.

pub mod capture;
pub mod child;
pub mod discovery;
pub mod error;
pub mod execute;
pub mod instrument;
pub mod options;
pub mod pattern;
pub mod registry;
pub mod rendezvous;
pub mod resolver;
pub mod specifier;
pub mod strategy;
pub mod telemetry;
pub mod unit;
pub mod wire;

// Re-export main types
pub use child::{current_role, run_child_role, ChildRole};
pub use discovery::{Discoverer, Discovery, NamePredicate};
pub use error::{HarnessError, HarnessResult, ResolutionError, ResolutionResult};
pub use execute::Executor;
pub use instrument::{CallCounter, Instrumentation, NoInstrumentation};
pub use options::{ExecOptions, RendezvousHandle, WorkerConfig};
pub use pattern::NameMatcher;
pub use registry::{
    ensure, FixtureScope, FixtureState, Group, Item, Member, Module, Outcome, Registry, TestContext, TestError,
};
pub use rendezvous::{RendezvousClient, RendezvousServer};
pub use resolver::{ModuleLoader, Resolution, ResolutionContext, Resolver, ResolverSettings};
pub use specifier::Specifier;
pub use strategy::{execute, UnitStream};
pub use unit::{FixtureMarks, RunKind, Status, Task, TestUnit};

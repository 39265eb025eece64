//! Execution strategies
//!
//! Each strategy turns a stream of pending tasks into a stream of finished
//! units. Serial and pooled runs are picked by [`execute`]; isolated and
//! distributed runs are chosen per unit by the executor.

pub mod distributed;
pub mod isolated;
pub mod pool;
pub(crate) mod process;
pub mod serial;

pub use distributed::{reduce, run_distributed};
pub use isolated::run_isolated;
pub use pool::{PoolRun, PoolState, ProcessLauncher, ThreadLauncher, WorkerLauncher, WorkerProcess, WorkerStartup};
pub use serial::SerialRun;

use crate::error::HarnessResult;
use crate::execute::Executor;
use crate::options::{ExecOptions, WorkerConfig};
use crate::resolver::Resolver;
use crate::unit::{Task, TestUnit};
use std::sync::Arc;

/// Finished units, in completion order
pub type UnitStream<'a> = Box<dyn Iterator<Item = TestUnit> + 'a>;

/// Run `tasks` serially or on a pool of worker processes
///
/// One process runs everything in the calling process. More than one starts
/// a pool that re-executes the current binary as workers.
pub fn execute<'a, I>(tasks: I, resolver: Arc<Resolver>, options: ExecOptions) -> HarnessResult<UnitStream<'a>>
where
    I: Iterator<Item = Task> + 'a,
{
    if options.num_procs <= 1 {
        let executor = Executor::new(resolver, options);
        return Ok(Box::new(SerialRun::new(tasks, executor)));
    }

    let config = WorkerConfig {
        resolver: resolver.settings().clone(),
        options,
    };
    let launcher = ProcessLauncher::current_exe()?;
    Ok(Box::new(PoolRun::start(tasks, config, Box::new(launcher))?))
}

//! One child process per unit
//!
//! The child runs the unit with every enclosing fixture, puts the finished
//! unit on a rendezvous queue and exits with the status code. The parent
//! only trusts the queue when the exit code is one of the status codes.

use super::process::{collect, drain_stderr, spawn_role, timeout_message, wait_with_timeout, with_stderr, RESULT_GRACE};
use crate::child::ChildRole;
use crate::error::{HarnessError, HarnessResult};
use crate::execute::{Executor, ExecutorRole};
use crate::options::{ExecOptions, RendezvousHandle, WorkerConfig};
use crate::registry::RankInfo;
use crate::rendezvous::{unique_queue, RendezvousClient};
use crate::resolver::{ModuleLoader, Resolver, ResolverSettings};
use crate::unit::{FixtureMarks, RunKind, Status, TestUnit};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Sent to an isolated child through its environment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct IsolatedPayload {
    pub unit: TestUnit,
    pub config: WorkerConfig,
    pub queue: String,
}

/// Run one unit in a fresh child process
pub fn run_isolated(
    mut unit: TestUnit,
    options: &ExecOptions,
    settings: &ResolverSettings,
    rendezvous: &RendezvousHandle,
) -> TestUnit {
    unit.set_run_kind(RunKind::Isolated);
    unit.begin();
    let queue = unique_queue("isolated");

    let mut child_unit = unit.clone();
    *child_unit.marks_mut() = FixtureMarks::all();
    let payload = IsolatedPayload {
        unit: child_unit,
        config: WorkerConfig {
            options: ExecOptions {
                rendezvous: Some(rendezvous.clone()),
                ..options.clone()
            },
            resolver: settings.clone(),
        },
        queue: queue.clone(),
    };
    let payload = match serde_json::to_string(&payload) {
        Ok(payload) => payload,
        Err(e) => {
            unit.conclude_failed(format!("can't encode isolated payload: {}", e));
            return unit;
        }
    };

    let mut child = match spawn_role(ChildRole::Isolated, &payload, options.nocapture) {
        Ok(child) => child,
        Err(e) => {
            unit.conclude_failed(e.to_string());
            return unit;
        }
    };
    tracing::debug!(spec = %unit.spec(), pid = child.id(), "isolated child started");

    let stderr_reader = drain_stderr(&mut child);
    let timeout = options.timeout_duration();
    let waited = wait_with_timeout(&mut child, timeout);
    let stderr = collect(stderr_reader);

    let exit = match waited {
        Ok(Some(exit)) => exit,
        Ok(None) => {
            unit.conclude_failed(timeout_message(timeout, &stderr));
            return unit;
        }
        Err(e) => {
            unit.conclude_failed(with_stderr(format!("lost track of isolated process: {}", e), &stderr));
            return unit;
        }
    };

    let Some(exit_status) = exit.code().and_then(Status::from_exit_code) else {
        unit.conclude_failed(with_stderr(
            format!("isolated process terminated abnormally ({})", exit),
            &stderr,
        ));
        return unit;
    };

    let reported = RendezvousClient::connect(rendezvous).and_then(|mut client| client.get::<TestUnit>(&queue, RESULT_GRACE));
    match reported {
        Ok(Some(mut done)) => {
            done.set_run_kind(RunKind::Isolated);
            done
        }
        Ok(None) | Err(_) => {
            let msg = with_stderr("isolated process exited without reporting a result".to_string(), &stderr);
            unit.conclude(exit_status, msg, String::new());
            unit
        }
    }
}

/// Child side: run the unit and report it
pub(crate) fn run_child(payload: IsolatedPayload, loader: Arc<dyn ModuleLoader>) -> HarnessResult<Status> {
    let handle = payload
        .config
        .options
        .rendezvous
        .clone()
        .ok_or_else(|| HarnessError::Payload("isolated payload has no rendezvous server".to_string()))?;

    let resolver = Arc::new(Resolver::new(loader, payload.config.resolver)?);
    let mut executor = Executor::new(resolver, payload.config.options)
        .with_role(ExecutorRole::Child(RankInfo::default()));
    let done = executor.run(payload.unit);
    executor.finish();

    let mut client = RendezvousClient::connect(&handle)?;
    client.put(&payload.queue, &done)?;
    Ok(done.status().unwrap_or(Status::Fail))
}

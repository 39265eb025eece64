//! Multi-process units
//!
//! A unit whose group asks for `nprocs` processes runs on that many ranks at
//! once. Every rank runs the unit with all fixtures. Ranks above zero send
//! their results to rank 0, which reduces them into one result and reports
//! it to the parent.

use super::process::{
    collect, drain_stderr, kill_all, spawn_role, timeout_message, wait_all, with_stderr, GroupWait, RESULT_GRACE,
};
use crate::child::ChildRole;
use crate::error::{HarnessError, HarnessResult};
use crate::execute::{Executor, ExecutorRole};
use crate::options::{ExecOptions, RendezvousHandle, WorkerConfig};
use crate::registry::RankInfo;
use crate::rendezvous::{unique_queue, RendezvousClient};
use crate::resolver::{ModuleLoader, Resolver, ResolverSettings};
use crate::unit::{FixtureMarks, RunKind, Status, TestUnit};
use serde::{Deserialize, Serialize};
use std::process::Child;
use std::sync::Arc;
use std::time::Duration;

/// How long rank 0 waits for the other ranks when no timeout is configured
const GATHER_TIMEOUT: Duration = Duration::from_secs(600);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct RankPayload {
    pub unit: TestUnit,
    pub config: WorkerConfig,
    pub rank: usize,
    pub size: usize,
    pub gather_queue: String,
    pub result_queue: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct RankReport {
    rank: usize,
    unit: TestUnit,
}

/// Merge per-rank results into rank 0's result
///
/// The first failure from another rank wins unless rank 0 failed itself. A
/// skip from another rank only wins over a success. Memory usage is summed.
pub fn reduce(mut local: TestUnit, others: impl IntoIterator<Item = TestUnit>) -> TestUnit {
    for other in others {
        local.add_memory_usage(other.memory_usage());
        match other.status() {
            Some(Status::Fail) if local.status() != Some(Status::Fail) => {
                local.override_status(Status::Fail, other.err_msg().to_string());
                local.set_expected_fail(false);
            }
            Some(Status::Skip) if local.status() == Some(Status::Ok) => {
                local.override_status(Status::Skip, other.err_msg().to_string());
            }
            _ => {}
        }
    }
    local
}

/// Launch the ranks, wait for them and adopt rank 0's merged result
pub fn run_distributed(
    mut unit: TestUnit,
    options: &ExecOptions,
    settings: &ResolverSettings,
    rendezvous: &RendezvousHandle,
) -> TestUnit {
    unit.set_run_kind(RunKind::Distributed);
    unit.begin();
    let size = unit.nprocs().max(1);
    let gather_queue = unique_queue("gather");
    let result_queue = unique_queue("result");

    let mut child_unit = unit.clone();
    *child_unit.marks_mut() = FixtureMarks::all();
    let config = WorkerConfig {
        options: ExecOptions {
            rendezvous: Some(rendezvous.clone()),
            ..options.clone()
        },
        resolver: settings.clone(),
    };

    let mut children: Vec<Child> = Vec::with_capacity(size);
    let mut stderr_readers = Vec::with_capacity(size);
    for rank in 0..size {
        let payload = RankPayload {
            unit: child_unit.clone(),
            config: config.clone(),
            rank,
            size,
            gather_queue: gather_queue.clone(),
            result_queue: result_queue.clone(),
        };
        let spawned = serde_json::to_string(&payload)
            .map_err(|e| HarnessError::Payload(e.to_string()))
            .and_then(|payload| spawn_role(ChildRole::Rank, &payload, options.nocapture));
        match spawned {
            Ok(mut child) => {
                stderr_readers.push(drain_stderr(&mut child));
                children.push(child);
            }
            Err(e) => {
                kill_all(&mut children);
                unit.conclude_failed(format!("can't launch rank {} of {}: {}", rank, size, e));
                return unit;
            }
        }
    }
    tracing::debug!(spec = %unit.spec(), size, "distributed ranks started");

    let timeout = options.timeout_duration();
    let waited = wait_all(&mut children, timeout, |exit| {
        exit.code().and_then(Status::from_exit_code).is_some()
    });
    let stderr: Vec<String> = stderr_readers.into_iter().map(collect).collect();

    let rank0_exit = match waited {
        Ok(GroupWait::AllExited(exits)) => exits.first().and_then(|e| e.code()).and_then(Status::from_exit_code),
        Ok(GroupWait::Abnormal { index, status }) => {
            let msg = format!("rank {} of {} terminated abnormally ({})", index, size, status);
            unit.conclude_failed(with_stderr(msg, &stderr[index]));
            return unit;
        }
        Ok(GroupWait::TimedOut) => {
            unit.conclude_failed(timeout_message(timeout, &stderr.join("\n")));
            return unit;
        }
        Err(e) => {
            kill_all(&mut children);
            unit.conclude_failed(format!("lost track of distributed ranks: {}", e));
            return unit;
        }
    };

    let reported =
        RendezvousClient::connect(rendezvous).and_then(|mut client| client.get::<TestUnit>(&result_queue, RESULT_GRACE));
    match reported {
        Ok(Some(mut done)) => {
            done.set_run_kind(RunKind::Distributed);
            done
        }
        Ok(None) | Err(_) => {
            let msg = with_stderr("rank 0 exited without reporting a result".to_string(), &stderr.join("\n"));
            unit.conclude(rank0_exit.unwrap_or(Status::Fail), msg, String::new());
            unit
        }
    }
}

/// Rank side: run the unit, then gather (rank 0) or report (others)
pub(crate) fn run_rank(payload: RankPayload, loader: Arc<dyn ModuleLoader>) -> HarnessResult<Status> {
    let handle = payload
        .config
        .options
        .rendezvous
        .clone()
        .ok_or_else(|| HarnessError::Payload("rank payload has no rendezvous server".to_string()))?;
    let gather_wait = payload.config.options.timeout_duration().unwrap_or(GATHER_TIMEOUT);
    let rank = RankInfo {
        rank: payload.rank,
        size: payload.size,
    };

    let resolver = Arc::new(Resolver::new(loader, payload.config.resolver)?);
    let mut executor = Executor::new(resolver, payload.config.options).with_role(ExecutorRole::Child(rank));
    let local = executor.run(payload.unit);
    executor.finish();

    let mut client = RendezvousClient::connect(&handle)?;
    if rank.rank != 0 {
        let status = local.status().unwrap_or(Status::Fail);
        client.put(
            &payload.gather_queue,
            &RankReport {
                rank: rank.rank,
                unit: local,
            },
        )?;
        return Ok(status);
    }

    let mut reports = Vec::with_capacity(rank.size.saturating_sub(1));
    for _ in 1..rank.size {
        match client.get::<RankReport>(&payload.gather_queue, gather_wait)? {
            Some(report) => reports.push(report),
            None => break,
        }
    }
    reports.sort_by_key(|r| r.rank);
    let missing = rank.size.saturating_sub(1 + reports.len());

    let mut merged = reduce(local, reports.into_iter().map(|r| r.unit));
    if missing > 0 {
        merged.override_status(Status::Fail, format!("{} of {} ranks did not report a result", missing, rank.size));
        merged.set_expected_fail(false);
    }
    client.put(&payload.result_queue, &merged)?;
    Ok(merged.status().unwrap_or(Status::Fail))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn finished(status: Status, msg: &str, memory: f64) -> TestUnit {
        let mut unit = TestUnit::new("m:G.test_x");
        unit.conclude(status, msg.to_string(), String::new());
        unit.set_telemetry(memory, [0.0; 3]);
        unit
    }

    #[test]
    fn test_first_foreign_failure_wins() {
        let merged = reduce(
            finished(Status::Ok, "", 10.0),
            vec![
                finished(Status::Ok, "", 1.0),
                finished(Status::Fail, "rank 2 broke", 2.0),
                finished(Status::Fail, "rank 3 broke", 3.0),
            ],
        );
        assert_eq!(merged.status(), Some(Status::Fail));
        assert_eq!(merged.err_msg(), "rank 2 broke");
        assert_eq!(merged.memory_usage(), 16.0);
    }

    #[test]
    fn test_local_failure_is_kept() {
        let merged = reduce(
            finished(Status::Fail, "rank 0 broke", 1.0),
            vec![finished(Status::Fail, "rank 1 broke", 1.0)],
        );
        assert_eq!(merged.err_msg(), "rank 0 broke");
    }

    #[test]
    fn test_skip_only_beats_success() {
        let merged = reduce(
            finished(Status::Ok, "", 1.0),
            vec![finished(Status::Skip, "no gpu on rank 1", 1.0)],
        );
        assert_eq!(merged.status(), Some(Status::Skip));
        assert_eq!(merged.err_msg(), "no gpu on rank 1");

        let merged = reduce(
            finished(Status::Skip, "rank 0 skip", 1.0),
            vec![finished(Status::Skip, "rank 1 skip", 1.0)],
        );
        assert_eq!(merged.err_msg(), "rank 0 skip");
    }

    #[test]
    fn test_failure_after_skip() {
        let merged = reduce(
            finished(Status::Ok, "", 1.0),
            vec![finished(Status::Skip, "skip", 1.0), finished(Status::Fail, "fail", 1.0)],
        );
        assert_eq!(merged.status(), Some(Status::Fail));
        assert_eq!(merged.err_msg(), "fail");
    }
}

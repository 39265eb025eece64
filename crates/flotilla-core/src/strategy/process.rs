//! Child process plumbing shared by the isolated and distributed runners

use crate::child::{ChildRole, PAYLOAD_VAR, ROLE_VAR};
use crate::error::{HarnessError, HarnessResult};
use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// How long a parent waits for a result its child already reported
pub(crate) const RESULT_GRACE: Duration = Duration::from_secs(5);

/// Re-launch the current executable in a child role
pub(crate) fn spawn_role(role: ChildRole, payload: &str, nocapture: bool) -> HarnessResult<Child> {
    let program = std::env::current_exe().map_err(|e| HarnessError::launch(role.as_str(), e))?;
    Command::new(program)
        .env(ROLE_VAR, role.as_str())
        .env(PAYLOAD_VAR, payload)
        .stdin(Stdio::null())
        .stdout(if nocapture { Stdio::inherit() } else { Stdio::null() })
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| HarnessError::launch(role.as_str(), e))
}

/// Collect a child's stderr on a background thread so it never blocks on a full pipe
pub(crate) fn drain_stderr(child: &mut Child) -> Option<JoinHandle<String>> {
    let mut stderr = child.stderr.take()?;
    thread::Builder::new()
        .name("flotilla-stderr".to_string())
        .spawn(move || {
            let mut buf = Vec::new();
            let _ = stderr.read_to_end(&mut buf);
            String::from_utf8_lossy(&buf).into_owned()
        })
        .ok()
}

pub(crate) fn collect(reader: Option<JoinHandle<String>>) -> String {
    reader
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default()
}

/// Wait for a child, killing it if `timeout` elapses first; `None` means timed out
pub(crate) fn wait_with_timeout(child: &mut Child, timeout: Option<Duration>) -> HarnessResult<Option<ExitStatus>> {
    let Some(timeout) = timeout else {
        return Ok(Some(child.wait()?));
    };

    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// Poll a set of children until all exit, one exits abnormally, or time runs out
pub(crate) enum GroupWait {
    AllExited(Vec<ExitStatus>),
    Abnormal { index: usize, status: ExitStatus },
    TimedOut,
}

pub(crate) fn wait_all(
    children: &mut [Child],
    timeout: Option<Duration>,
    is_normal: impl Fn(&ExitStatus) -> bool,
) -> HarnessResult<GroupWait> {
    let deadline = timeout.map(|t| Instant::now() + t);
    let mut statuses: Vec<Option<ExitStatus>> = vec![None; children.len()];

    loop {
        let mut abnormal = None;
        for (index, child) in children.iter_mut().enumerate() {
            if statuses[index].is_some() {
                continue;
            }
            if let Some(status) = child.try_wait()? {
                if !is_normal(&status) {
                    abnormal = Some((index, status));
                    break;
                }
                statuses[index] = Some(status);
            }
        }
        if let Some((index, status)) = abnormal {
            kill_all(children);
            return Ok(GroupWait::Abnormal { index, status });
        }

        if statuses.iter().all(Option::is_some) {
            return Ok(GroupWait::AllExited(statuses.into_iter().flatten().collect()));
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            kill_all(children);
            return Ok(GroupWait::TimedOut);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

pub(crate) fn kill_all(children: &mut [Child]) {
    for child in children.iter_mut() {
        let _ = child.kill();
        let _ = child.wait();
    }
}

/// `TIMEOUT after N sec` with the child's stderr appended
pub(crate) fn timeout_message(timeout: Option<Duration>, stderr: &str) -> String {
    let secs = timeout.map(|t| t.as_secs_f64()).unwrap_or_default();
    with_stderr(format!("TIMEOUT after {} sec", secs), stderr)
}

pub(crate) fn with_stderr(mut msg: String, stderr: &str) -> String {
    let stderr = stderr.trim_end();
    if !stderr.is_empty() {
        msg.push('\n');
        msg.push_str(stderr);
    }
    msg
}

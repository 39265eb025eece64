//! Execution options shared by every strategy

use crate::resolver::ResolverSettings;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

/// Address and key of a running rendezvous server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RendezvousHandle {
    pub address: SocketAddr,
    pub authkey: String,
}

/// Options controlling how units are executed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecOptions {
    /// Worker process count; 1 runs everything in this process
    pub num_procs: usize,

    /// Run every unit in its own child process
    pub isolated: bool,

    /// Let test output through instead of capturing it
    pub nocapture: bool,

    /// Stop scheduling after the first unexpected failure
    pub stop: bool,

    /// Seconds before an isolated or distributed unit is killed
    pub timeout: Option<f64>,

    /// Run multi-process units in-process as a single rank
    pub nompi: bool,

    /// Rendezvous server used to move results out of child processes
    pub rendezvous: Option<RendezvousHandle>,
}

impl Default for ExecOptions {
    fn default() -> Self {
        Self {
            num_procs: 1,
            isolated: false,
            nocapture: false,
            stop: false,
            timeout: None,
            nompi: false,
            rendezvous: None,
        }
    }
}

impl ExecOptions {
    pub fn timeout_duration(&self) -> Option<Duration> {
        self.timeout
            .filter(|t| *t > 0.0)
            .and_then(|t| Duration::try_from_secs_f64(t).ok())
    }
}

/// Everything a child process needs to rebuild the coordinator's executor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerConfig {
    pub options: ExecOptions,
    pub resolver: ResolverSettings,
}

//! Child process roles
//!
//! Every child the harness spawns is the harness binary itself, started with
//! a role and a JSON payload in its environment. A harness `main` calls
//! [`run_child_role`] before anything else.

use crate::error::{HarnessError, HarnessResult};
use crate::resolver::ModuleLoader;
use crate::strategy::{distributed, isolated, pool};
use crate::unit::Status;
use serde::de::DeserializeOwned;
use std::process::ExitCode;
use std::sync::Arc;

pub const ROLE_VAR: &str = "FLOTILLA_ROLE";
pub const PAYLOAD_VAR: &str = "FLOTILLA_PAYLOAD";

/// Exit code of a child whose harness failed, as opposed to its test
pub const HARNESS_FAILURE: u8 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildRole {
    Worker,
    Isolated,
    Rank,
}

impl ChildRole {
    pub fn as_str(self) -> &'static str {
        match self {
            ChildRole::Worker => "worker",
            ChildRole::Isolated => "isolated",
            ChildRole::Rank => "rank",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "worker" => Some(ChildRole::Worker),
            "isolated" => Some(ChildRole::Isolated),
            "rank" => Some(ChildRole::Rank),
            _ => None,
        }
    }
}

/// The role this process was started in, if any
pub fn current_role() -> Option<ChildRole> {
    std::env::var(ROLE_VAR).ok().as_deref().and_then(ChildRole::parse)
}

/// Run this process's child role, if it has one
///
/// Returns `None` in a normal harness invocation.
pub fn run_child_role(loader: Arc<dyn ModuleLoader>) -> Option<ExitCode> {
    let role = current_role()?;
    let payload = std::env::var(PAYLOAD_VAR).unwrap_or_default();

    // grandchildren must not inherit the role
    std::env::remove_var(ROLE_VAR);
    std::env::remove_var(PAYLOAD_VAR);

    match run_role(role, &payload, loader) {
        Ok(code) => Some(ExitCode::from(code)),
        Err(e) => {
            tracing::error!(role = role.as_str(), error = %e, "child role failed");
            eprintln!("flotilla {}: {}", role.as_str(), e);
            Some(ExitCode::from(HARNESS_FAILURE))
        }
    }
}

fn run_role(role: ChildRole, payload: &str, loader: Arc<dyn ModuleLoader>) -> HarnessResult<u8> {
    match role {
        ChildRole::Worker => {
            pool::run_worker(decode(payload)?, loader)?;
            Ok(0)
        }
        ChildRole::Isolated => isolated::run_child(decode(payload)?, loader).map(status_code),
        ChildRole::Rank => distributed::run_rank(decode(payload)?, loader).map(status_code),
    }
}

fn decode<T: DeserializeOwned>(payload: &str) -> HarnessResult<T> {
    if payload.is_empty() {
        return Err(HarnessError::Payload(format!("{} is not set", PAYLOAD_VAR)));
    }
    serde_json::from_str(payload).map_err(|e| HarnessError::Payload(e.to_string()))
}

fn status_code(status: Status) -> u8 {
    u8::try_from(status.exit_code()).unwrap_or(HARNESS_FAILURE)
}

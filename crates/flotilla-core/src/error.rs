//! Error types for resolution and harness infrastructure
//!
//! Resolution errors never escape to the pipeline driver: they become `FAIL`
//! units. Harness errors mean the harness itself cannot work (no sockets, no
//! processes) and are allowed to end the run.

use std::path::PathBuf;
use thiserror::Error;

pub type ResolutionResult<T> = Result<T, ResolutionError>;

pub type HarnessResult<T> = Result<T, HarnessError>;

/// A specifier could not be mapped to something runnable
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ResolutionError {
    #[error("Empty test specifier")]
    EmptySpecifier,

    #[error("Can't find module for path '{path}': {reason}")]
    BadPath { path: PathBuf, reason: String },

    #[error("Can't import module '{module}': {reason}")]
    Import { module: String, reason: String },

    #[error("Couldn't find '{name}' in module '{module}'")]
    NotFound { module: String, name: String },

    #[error("Group '{group}' in module '{module}' has no member '{member}'")]
    MemberNotFound {
        module: String,
        group: String,
        member: String,
    },

    #[error("'{name}' in module '{module}' is not a test group or a test function")]
    NotATest { module: String, name: String },

    #[error("ERROR: test function not specified in '{spec}'")]
    MemberNotSpecified { spec: String },
}

impl ResolutionError {
    /// Create an import error
    pub fn import(module: impl Into<String>, reason: impl ToString) -> Self {
        Self::Import {
            module: module.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a bad path error
    pub fn bad_path(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::BadPath {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a not found error
    pub fn not_found(module: impl Into<String>, name: impl Into<String>) -> Self {
        Self::NotFound {
            module: module.into(),
            name: name.into(),
        }
    }
}

/// The harness cannot do its job
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to launch {role} process: {error}")]
    Launch {
        role: String,
        error: std::io::Error,
    },

    #[error("Failed to bind {what}: {error}")]
    Bind {
        what: String,
        error: std::io::Error,
    },

    #[error("Channel authentication failed for {peer}")]
    Auth { peer: String },

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Malformed child payload: {0}")]
    Payload(String),

    #[error("Invalid pattern '{pattern}': {error}")]
    Pattern { pattern: String, error: String },
}

impl HarnessError {
    /// Create a launch error
    pub fn launch(role: impl Into<String>, error: std::io::Error) -> Self {
        Self::Launch {
            role: role.into(),
            error,
        }
    }

    /// Create a bind error
    pub fn bind(what: impl Into<String>, error: std::io::Error) -> Self {
        Self::Bind {
            what: what.into(),
            error,
        }
    }

    /// Create a protocol error
    pub fn protocol(msg: impl ToString) -> Self {
        Self::Protocol(msg.to_string())
    }
}

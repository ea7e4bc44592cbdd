//! Error types for the fixture engine

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::declaration::Scope;

/// Result type alias using the engine's error
pub type Result<T> = std::result::Result<T, FixtureError>;

/// Fixture engine error types
#[derive(Error, Debug)]
pub enum FixtureError {
    #[error("Unknown fixture '{name}'{}", required_by_suffix(.required_by))]
    UnknownFixture {
        name: String,
        required_by: Option<String>,
    },

    #[error("Fixture '{0}' is registered more than once")]
    DuplicateFixture(String),

    #[error("Fixture dependency cycle detected: {}", .path.join(" -> "))]
    CycleDetected { path: Vec<String> },

    #[error("Fixture '{fixture}' ({scope} scope) cannot depend on '{dependency}' ({dependency_scope} scope)")]
    ScopeMismatch {
        fixture: String,
        scope: Scope,
        dependency: String,
        dependency_scope: Scope,
    },

    #[error("Fixture '{fixture}' broke the yield protocol: {reason}")]
    InvalidFixtureProtocol { fixture: String, reason: String },

    #[error("Fixture '{fixture}' failed during setup")]
    ConstructionFailed {
        fixture: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("{} fixture teardown(s) failed: {}", .failures.len(), summarize(.failures))]
    TeardownFailed { failures: Vec<TeardownFailure> },

    #[error("Fixture '{fixture}' was constructed twice in {scope} scope")]
    DuplicateConstruction { fixture: String, scope: Scope },

    #[error("Fixture '{0}' was not resolved for this test")]
    MissingFixture(String),

    #[error("Fixture '{fixture}' does not hold a value of type {expected}")]
    TypeMismatch {
        fixture: String,
        expected: &'static str,
    },

    #[error("Fixture '{fixture}' {phase} timed out after {}ms", .after.as_millis())]
    Timeout {
        fixture: String,
        phase: Phase,
        after: Duration,
    },

    #[error("Fixture engine has been shut down")]
    EngineShutDown,
}

impl FixtureError {
    /// True for errors that can be detected from the declarations alone
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            FixtureError::UnknownFixture { .. }
                | FixtureError::DuplicateFixture(_)
                | FixtureError::CycleDetected { .. }
                | FixtureError::ScopeMismatch { .. }
        )
    }

    /// Name of the fixture the error is attributed to, if any
    pub fn fixture(&self) -> Option<&str> {
        match self {
            FixtureError::UnknownFixture { name, .. } => Some(name),
            FixtureError::DuplicateFixture(name) => Some(name),
            FixtureError::CycleDetected { path } => path.first().map(String::as_str),
            FixtureError::ScopeMismatch { fixture, .. }
            | FixtureError::InvalidFixtureProtocol { fixture, .. }
            | FixtureError::ConstructionFailed { fixture, .. }
            | FixtureError::DuplicateConstruction { fixture, .. }
            | FixtureError::TypeMismatch { fixture, .. }
            | FixtureError::Timeout { fixture, .. } => Some(fixture),
            FixtureError::MissingFixture(name) => Some(name),
            FixtureError::TeardownFailed { .. } | FixtureError::EngineShutDown => None,
        }
    }
}

/// Lifecycle phase an error happened in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Setup,
    Teardown,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Setup => write!(f, "setup"),
            Phase::Teardown => write!(f, "teardown"),
        }
    }
}

/// A single failed teardown resumption.
///
/// The message holds the rendered error chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeardownFailure {
    pub fixture: String,
    pub scope: Scope,
    pub message: String,
}

impl fmt::Display for TeardownFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} scope): {}", self.fixture, self.scope, self.message)
    }
}

fn required_by_suffix(required_by: &Option<String>) -> String {
    match required_by {
        Some(parent) => format!(" (required by '{}')", parent),
        None => String::new(),
    }
}

fn summarize(failures: &[TeardownFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

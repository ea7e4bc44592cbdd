//! Error types for the suite runner

use rigging_engine::FixtureError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("Fixture error: {0}")]
    Fixture(#[from] FixtureError),

    #[error("Test case not found: {0}")]
    CaseNotFound(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type RunnerResult<T> = Result<T, RunnerError>;

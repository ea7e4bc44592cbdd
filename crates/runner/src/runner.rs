//! Suite runner that drives test cases through the fixture engine

use std::path::PathBuf;
use std::time::Instant;

use chrono::{DateTime, Utc};
use rigging_engine::{Engine, Registry, RegistryBuilder, TeardownFailure};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::case::TestCase;
use crate::config::RunnerConfig;
use crate::error::{RunnerError, RunnerResult};

/// Result of running a single test
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    pub name: String,
    pub success: bool,
    pub duration_ms: u64,
    /// Case-scope fixtures constructed for this test, in construction order
    pub fixtures: Vec<String>,
    /// Case-scope fixtures torn down after this test, in teardown order
    pub torn_down: Vec<String>,
    pub teardown_errors: Vec<TeardownFailure>,
    pub error: Option<String>,
}

/// Result of running a list of tests
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestSuiteResult {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub duration_ms: u64,
    pub started_at: DateTime<Utc>,
    pub results: Vec<TestResult>,
    /// Run-scope teardown failures reported at shutdown
    #[serde(default)]
    pub shutdown_errors: Vec<TeardownFailure>,
}

impl TestSuiteResult {
    /// Every test passed and every run fixture shut down cleanly
    pub fn success(&self) -> bool {
        self.failed == 0 && self.shutdown_errors.is_empty()
    }
}

/// Runs test cases one at a time against a single engine
pub struct SuiteRunner {
    engine: Engine,
    config: RunnerConfig,
}

impl SuiteRunner {
    /// Create a runner with default configuration
    pub fn new(registry: Registry) -> Self {
        Self::with_config(registry, RunnerConfig::default())
    }

    pub fn with_config(registry: Registry, config: RunnerConfig) -> Self {
        let engine = Engine::with_config(registry, config.engine.clone());
        Self { engine, config }
    }

    /// Validate the registry and create a runner for it
    pub fn from_builder(builder: RegistryBuilder, config: RunnerConfig) -> RunnerResult<Self> {
        let registry = builder.build()?;
        Ok(Self::with_config(registry, config))
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Run every case in order
    pub async fn run_cases(&mut self, cases: &[TestCase]) -> TestSuiteResult {
        let selected: Vec<&TestCase> = cases.iter().collect();
        self.run_selected(&selected).await
    }

    /// Run cases carrying `tag`
    pub async fn run_tagged(&mut self, cases: &[TestCase], tag: &str) -> TestSuiteResult {
        let selected: Vec<&TestCase> = cases.iter().filter(|c| c.has_tag(tag)).collect();
        self.run_selected(&selected).await
    }

    /// Run a specific case by name
    pub async fn run_named(&mut self, cases: &[TestCase], name: &str) -> RunnerResult<TestResult> {
        let case = cases
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| RunnerError::CaseNotFound(name.to_string()))?;

        Ok(self.run_case(case).await)
    }

    /// Run a single case: setup, body, case-scope teardown
    pub async fn run_case(&mut self, case: &TestCase) -> TestResult {
        let start = Instant::now();
        debug!("Running test: {}", case.name);

        let body = case.body.clone();
        let outcome = self
            .engine
            .run_case_with_timeout(case.needs.iter(), self.config.case_timeout(), move |values| body(values))
            .await;

        TestResult {
            name: case.name.clone(),
            success: outcome.passed(),
            duration_ms: start.elapsed().as_millis() as u64,
            fixtures: outcome.constructed,
            torn_down: outcome.torn_down,
            teardown_errors: outcome.teardown_errors,
            error: outcome.failure.map(|failure| failure.to_string()),
        }
    }

    /// Shut the engine down and fold run-scope teardown failures into `suite`
    pub async fn finish(&mut self, mut suite: TestSuiteResult) -> TestSuiteResult {
        let report = self.engine.shutdown().await;
        for failure in &report.failures {
            error!("✗ shutdown - {}", failure);
        }
        suite.shutdown_errors.extend(report.failures);
        suite
    }

    /// Write test results to JSON file
    pub fn write_results(&self, results: &TestSuiteResult) -> RunnerResult<PathBuf> {
        std::fs::create_dir_all(&self.config.output_dir)?;

        let path = self.config.output_dir.join("test-results.json");
        let json = serde_json::to_string_pretty(results)?;
        std::fs::write(&path, json)?;

        info!("Results written to: {}", path.display());
        Ok(path)
    }

    async fn run_selected(&mut self, cases: &[&TestCase]) -> TestSuiteResult {
        let started_at = Utc::now();
        let start = Instant::now();
        let mut results = Vec::new();
        let mut passed = 0;
        let mut failed = 0;
        let mut skipped = 0;

        info!("Running {} test(s)...", cases.len());

        for case in cases {
            if self.config.fail_fast && failed > 0 {
                debug!("Skipping {} (fail-fast)", case.name);
                skipped += 1;
                continue;
            }

            let result = self.run_case(case).await;
            if result.success {
                passed += 1;
                info!("✓ {} ({} ms)", result.name, result.duration_ms);
            } else {
                failed += 1;
                error!("✗ {} - {}", result.name, result.error.as_deref().unwrap_or("unknown error"));
            }
            for failure in &result.teardown_errors {
                warn!("  teardown: {}", failure);
            }
            results.push(result);
        }

        let duration_ms = start.elapsed().as_millis() as u64;

        info!(
            "Test Results: {} passed, {} failed, {} skipped ({} ms)",
            passed, failed, skipped, duration_ms
        );

        TestSuiteResult {
            total: cases.len(),
            passed,
            failed,
            skipped,
            duration_ms,
            started_at,
            results,
            shutdown_errors: Vec::new(),
        }
    }
}

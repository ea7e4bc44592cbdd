//! Rigging Suite Runner
//!
//! Runs named test cases through the fixture engine:
//! - resolves and constructs each case's fixtures (plus auto fixtures)
//! - enforces per-case timeouts and fail-fast
//! - aggregates results and writes them as JSON
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       SuiteRunner                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  run_cases / run_tagged / run_named                         │
//! │    └── run_case(case) -> TestResult                         │
//! │          └── Engine::run_case_with_timeout(needs, body)     │
//! │  finish(suite)        -> Engine::shutdown()                 │
//! │  write_results(suite) -> <output_dir>/test-results.json     │
//! ├─────────────────────────────────────────────────────────────┤
//! │  RunnerConfig (TOML + RIGGING_* env)                        │
//! │    ├── engine: EngineConfig                                 │
//! │    ├── case_timeout_ms, fail_fast, output_dir               │
//! │    └── log: LogConfig -> init_logging()                     │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod case;
pub mod config;
pub mod error;
pub mod logging;
pub mod runner;

pub use case::{CaseBody, TestCase};
pub use config::{LogConfig, RunnerConfig};
pub use error::{RunnerError, RunnerResult};
pub use logging::init_logging;
pub use runner::{SuiteRunner, TestResult, TestSuiteResult};

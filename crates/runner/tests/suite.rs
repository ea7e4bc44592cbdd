//! Suite runner behaviour against a small browser-style fixture graph

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rigging_engine::{FixtureDeclaration, FixtureError, FixtureValues, Registry, Scope};
use rigging_runner::{RunnerConfig, RunnerError, SuiteRunner, TestCase, TestSuiteResult};
use test_case::test_case;

struct Browser {
    launches: usize,
}

/// browser (run) <- context (case) <- page (case), plus an auto console log
fn registry(launches: Arc<AtomicUsize>) -> Registry {
    Registry::builder()
        .fixture(FixtureDeclaration::new("browser", Scope::Run, move |_deps, slot| {
            let launches = launches.clone();
            async move {
                let launches = launches.fetch_add(1, Ordering::SeqCst) + 1;
                slot.provide(Browser { launches }).await;
                anyhow::Ok(())
            }
        }))
        .fixture(FixtureDeclaration::value("context", Scope::Case, "context").depends_on(["browser"]))
        .fixture(FixtureDeclaration::value("page", Scope::Case, "page").depends_on(["context"]))
        .fixture(FixtureDeclaration::value("console", Scope::Case, Vec::<String>::new()).with_auto(true))
        .build()
        .unwrap()
}

fn passing(name: &str, needs: &[&str]) -> TestCase {
    TestCase::new(name, |_values| async { anyhow::Ok(()) }).with_needs(needs.iter().copied())
}

fn failing(name: &str) -> TestCase {
    TestCase::new(name, |_values| async { fail("assertion failed: title") })
}

fn fail(message: &str) -> anyhow::Result<()> {
    Err(anyhow::anyhow!(message.to_string()))
}

#[tokio::test]
async fn test_suite_counts_and_fixture_reuse() {
    let launches = Arc::new(AtomicUsize::new(0));
    let mut runner = SuiteRunner::new(registry(launches.clone()));

    let cases = vec![
        passing("home", &["page"]),
        failing("login"),
        TestCase::new("browser is shared", |values: FixtureValues| async move {
            let browser = values.get::<Browser>("browser")?;
            anyhow::ensure!(browser.launches == 1, "browser relaunched");
            anyhow::Ok(())
        })
        .with_needs(["browser"]),
    ];

    let suite = runner.run_cases(&cases).await;

    assert_eq!(suite.total, 3);
    assert_eq!(suite.passed, 2);
    assert_eq!(suite.failed, 1);
    assert_eq!(suite.skipped, 0);
    assert_eq!(launches.load(Ordering::SeqCst), 1);

    let home = &suite.results[0];
    assert_eq!(home.fixtures, ["console", "context", "page"]);
    assert_eq!(home.torn_down, ["page", "context", "console"]);

    let login = &suite.results[1];
    assert!(!login.success);
    assert_eq!(login.error.as_deref(), Some("assertion failed: title"));
    assert_eq!(login.fixtures, ["console"]);

    let suite = runner.finish(suite).await;
    assert!(suite.shutdown_errors.is_empty());
    assert!(!suite.success());
}

#[test_case(false, 3, 0 ; "keeps going")]
#[test_case(true, 1, 2 ; "stops after first failure")]
#[tokio::test]
async fn test_fail_fast(fail_fast: bool, ran: usize, skipped: usize) {
    let config = RunnerConfig {
        fail_fast,
        ..RunnerConfig::default()
    };
    let mut runner = SuiteRunner::with_config(registry(Arc::default()), config);

    let cases = vec![failing("first"), passing("second", &[]), passing("third", &["page"])];
    let suite = runner.run_cases(&cases).await;

    assert_eq!(suite.total, 3);
    assert_eq!(suite.results.len(), ran);
    assert_eq!(suite.skipped, skipped);
    assert_eq!(suite.failed, 1);
}

#[tokio::test]
async fn test_run_tagged_filters_cases() {
    let mut runner = SuiteRunner::new(registry(Arc::default()));
    let cases = vec![
        passing("smoke home", &["page"]).with_tags(["smoke"]),
        passing("deep settings", &["page"]).with_tags(["slow"]),
        passing("smoke login", &[]).with_tags(["smoke", "auth"]),
    ];

    let suite = runner.run_tagged(&cases, "smoke").await;

    let names: Vec<&str> = suite.results.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, ["smoke home", "smoke login"]);
    assert_eq!(suite.total, 2);
}

#[tokio::test]
async fn test_run_named() {
    let mut runner = SuiteRunner::new(registry(Arc::default()));
    let cases = vec![passing("home", &["page"]), failing("login")];

    let result = runner.run_named(&cases, "login").await.unwrap();
    assert!(!result.success);

    match runner.run_named(&cases, "checkout").await {
        Err(RunnerError::CaseNotFound(name)) => assert_eq!(name, "checkout"),
        other => panic!("expected CaseNotFound, got {:?}", other.map(|r| r.name)),
    }
}

#[tokio::test]
async fn test_case_timeout_fails_case_and_tears_down() {
    let config = RunnerConfig {
        case_timeout_ms: Some(50),
        ..RunnerConfig::default()
    };
    let mut runner = SuiteRunner::with_config(registry(Arc::default()), config);

    let hang = TestCase::new("hang", |_values| async {
        tokio::time::sleep(Duration::from_secs(30)).await;
        anyhow::Ok(())
    })
    .with_needs(["page"]);

    let result = runner.run_case(&hang).await;

    assert!(!result.success);
    assert_eq!(result.error.as_deref(), Some("timed out after 50ms"));
    assert_eq!(result.torn_down, ["page", "context", "console"]);
}

#[tokio::test]
async fn test_unknown_need_is_reported_as_setup_failure() {
    let mut runner = SuiteRunner::new(registry(Arc::default()));

    let result = runner.run_case(&passing("typo", &["pgae"])).await;

    assert!(!result.success);
    let error = result.error.unwrap();
    assert!(error.starts_with("setup failed"), "{}", error);
    assert!(error.contains("pgae"), "{}", error);
    assert!(result.fixtures.is_empty());
}

#[tokio::test]
async fn test_finish_folds_run_scope_teardown_failures() {
    let registry = Registry::builder()
        .fixture(FixtureDeclaration::new("server", Scope::Run, |_deps, slot| async move {
            slot.provide("http://127.0.0.1:0".to_string()).await;
            fail("server did not stop")
        }))
        .build()
        .unwrap();
    let mut runner = SuiteRunner::new(registry);

    let suite = runner.run_cases(&[passing("uses server", &["server"])]).await;
    assert_eq!(suite.passed, 1);

    let suite = runner.finish(suite).await;
    assert_eq!(suite.shutdown_errors.len(), 1);
    assert_eq!(suite.shutdown_errors[0].fixture, "server");
    assert_eq!(suite.shutdown_errors[0].scope, Scope::Run);
    assert!(suite.shutdown_errors[0].message.contains("server did not stop"));
    assert!(!suite.success());

    let after = runner.run_case(&passing("late", &[])).await;
    assert!(after.error.unwrap().contains("shut down"));
}

#[test]
fn test_from_builder_rejects_invalid_registry() {
    let builder = Registry::builder()
        .fixture(FixtureDeclaration::value("page", Scope::Case, ()).depends_on(["context"]));

    match SuiteRunner::from_builder(builder, RunnerConfig::default()) {
        Err(RunnerError::Fixture(FixtureError::UnknownFixture { name, required_by })) => {
            assert_eq!(name, "context");
            assert_eq!(required_by.as_deref(), Some("page"));
        }
        Err(other) => panic!("unexpected error: {}", other),
        Ok(_) => panic!("registry with a dangling dependency was accepted"),
    }
}

#[tokio::test]
async fn test_write_results_round_trips_json() {
    let dir = tempfile::tempdir().unwrap();
    let config = RunnerConfig {
        output_dir: dir.path().join("out"),
        ..RunnerConfig::default()
    };
    let mut runner = SuiteRunner::with_config(registry(Arc::default()), config);

    let suite = runner.run_cases(&[passing("home", &["page"]), failing("login")]).await;
    let suite = runner.finish(suite).await;
    let path = runner.write_results(&suite).unwrap();

    assert_eq!(path, dir.path().join("out").join("test-results.json"));
    let written: TestSuiteResult = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(written.total, 2);
    assert_eq!(written.failed, 1);
    assert_eq!(written.started_at, suite.started_at);
    assert_eq!(written.results[0].fixtures, ["console", "context", "page"]);
}

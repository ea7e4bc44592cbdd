//! Lifecycle runner
//!
//! Drives factories up to their yield, keeps the suspended remainder in the
//! scope store, and resumes those remainders in reverse construction order
//! when a test finishes (case scope) or at shutdown (run scope).

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::task::JoinError;
use tracing::{debug, info, warn};

use crate::auto::AutoActivator;
use crate::config::EngineConfig;
use crate::declaration::{FixtureDeclaration, FixtureSlot, Scope};
use crate::error::{FixtureError, Phase, Result, TeardownFailure};
use crate::registry::Registry;
use crate::resolver::Resolver;
use crate::store::{Continuation, FixtureState, ResolvedInstance, ScopeStore};
use crate::value::FixtureValues;

/// Why a test did not pass
#[derive(Error, Debug)]
pub enum CaseFailure {
    #[error("setup failed: {}", error_chain(.0))]
    Setup(FixtureError),

    #[error("{0:#}")]
    Body(anyhow::Error),

    #[error("timed out after {}ms", .0.as_millis())]
    TimedOut(Duration),

    #[error("{0}")]
    Teardown(FixtureError),
}

/// Fixtures resumed by one teardown pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeardownReport {
    /// Names in the order they were resumed
    pub torn_down: Vec<String>,
    pub failures: Vec<TeardownFailure>,
}

impl TeardownReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn extend(&mut self, other: TeardownReport) {
        self.torn_down.extend(other.torn_down);
        self.failures.extend(other.failures);
    }

    pub fn into_result(self) -> Result<()> {
        if self.failures.is_empty() {
            Ok(())
        } else {
            Err(FixtureError::TeardownFailed {
                failures: self.failures,
            })
        }
    }
}

/// Everything that happened to one test
#[derive(Debug)]
pub struct CaseOutcome {
    /// The test's failure, if any. Teardown errors only land here when
    /// nothing failed before them.
    pub failure: Option<CaseFailure>,
    /// Case-scope fixtures constructed for this test, in construction order
    pub constructed: Vec<String>,
    /// Case-scope fixtures resumed at the end of this test, in resume order
    pub torn_down: Vec<String>,
    /// Every teardown failure, whether or not it decided the outcome
    pub teardown_errors: Vec<TeardownFailure>,
}

impl CaseOutcome {
    fn new(failure: Option<CaseFailure>, constructed: Vec<String>, teardown: TeardownReport) -> Self {
        let failure = match failure {
            Some(failure) => Some(failure),
            None if !teardown.failures.is_empty() => {
                Some(CaseFailure::Teardown(FixtureError::TeardownFailed {
                    failures: teardown.failures.clone(),
                }))
            }
            None => None,
        };

        Self {
            failure,
            constructed,
            torn_down: teardown.torn_down,
            teardown_errors: teardown.failures,
        }
    }

    pub fn passed(&self) -> bool {
        self.failure.is_none()
    }

    pub fn into_result(self) -> std::result::Result<(), CaseFailure> {
        match self.failure {
            Some(failure) => Err(failure),
            None => Ok(()),
        }
    }
}

/// The fixture engine for one worker.
///
/// Single-threaded by contract: one resolution and one test body at a time.
/// Run-scope instances persist across tests until [`shutdown`](Self::shutdown);
/// later tests see any mutation an earlier test made to them.
pub struct Engine {
    registry: Arc<Registry>,
    activator: AutoActivator,
    store: ScopeStore,
    config: EngineConfig,
    shut_down: bool,
}

impl Engine {
    pub fn new(registry: Registry) -> Self {
        Self::with_config(registry, EngineConfig::default())
    }

    pub fn with_config(registry: Registry, config: EngineConfig) -> Self {
        let activator = AutoActivator::new(&registry);
        Self {
            registry: Arc::new(registry),
            activator,
            store: ScopeStore::new(),
            config,
            shut_down: false,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn state(&self, scope: Scope, name: &str) -> FixtureState {
        self.store.state(scope, name)
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    /// Construct what a test needs (plus auto fixtures) and return every
    /// resolved value.
    ///
    /// On failure, fixtures constructed earlier in this pass stay in the
    /// store so [`teardown_case`](Self::teardown_case) still releases them.
    pub async fn setup<I, S>(&mut self, needs: I) -> Result<FixtureValues>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if self.shut_down {
            return Err(FixtureError::EngineShutDown);
        }

        let registry = self.registry.clone();
        let requested = self.activator.activate(needs);
        let order = Resolver::new(&registry).resolve_all(&requested)?;
        debug!("Fixture order: [{}]", order.join(", "));

        let mut values = FixtureValues::new();
        for name in &order {
            let declaration = registry
                .get(name)
                .ok_or_else(|| FixtureError::UnknownFixture {
                    name: name.clone(),
                    required_by: None,
                })?;
            let scope = declaration.scope();

            // Instances are only recorded after their factory yielded.
            if let Some(instance) = self.store.get(scope, name) {
                debug!("Reusing fixture {} ({} scope)", name, scope);
                values.insert(name.clone(), instance.value().clone());
                continue;
            }

            let deps = values.select(declaration.dependencies());
            self.store.set_state(scope, name, FixtureState::Resolving);

            match self.construct(declaration, deps).await {
                Ok(instance) => {
                    values.insert(name.clone(), instance.value().clone());
                    self.store.record(scope, name, instance)?;
                    debug!("Constructed fixture {} ({} scope)", name, scope);
                }
                Err(err) => {
                    self.store.set_state(scope, name, FixtureState::Failed);
                    warn!("Fixture {} failed during setup: {}", name, error_chain(&err));
                    return Err(err);
                }
            }
        }

        Ok(values)
    }

    /// Resume every case fixture constructed since the last teardown, newest
    /// first. A failing resumption never stops the others.
    pub async fn teardown_case(&mut self) -> TeardownReport {
        let drained = self.store.drain_case();
        self.unwind(Scope::Case, drained).await
    }

    /// Setup, body, teardown. Teardown runs whatever the body did.
    pub async fn run_case<I, S, F, Fut>(&mut self, needs: I, body: F) -> CaseOutcome
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
        F: FnOnce(FixtureValues) -> Fut,
        Fut: Future<Output = anyhow::Result<()>>,
    {
        self.run_case_with_timeout(needs, None, body).await
    }

    /// [`run_case`](Self::run_case) with a limit on setup plus body.
    ///
    /// When the limit hits, in-flight work is abandoned, not cancelled: a
    /// factory that had not yielded yet is left to finish on its own and is
    /// never resumed, while everything already constructed is torn down.
    pub async fn run_case_with_timeout<I, S, F, Fut>(
        &mut self,
        needs: I,
        limit: Option<Duration>,
        body: F,
    ) -> CaseOutcome
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
        F: FnOnce(FixtureValues) -> Fut,
        Fut: Future<Output = anyhow::Result<()>>,
    {
        let failure = match limit {
            Some(limit) => {
                match tokio::time::timeout(limit, self.setup_and_run(needs, body)).await {
                    Ok(result) => result.err(),
                    Err(_) => {
                        warn!("Case timed out after {}ms", limit.as_millis());
                        Some(CaseFailure::TimedOut(limit))
                    }
                }
            }
            None => self.setup_and_run(needs, body).await.err(),
        };

        let constructed = self.store.construction_order(Scope::Case).to_vec();
        let teardown = self.teardown_case().await;
        CaseOutcome::new(failure, constructed, teardown)
    }

    /// Tear down leftover case fixtures, then the run scope. Only the first
    /// call does anything; afterwards `setup` fails with `EngineShutDown`.
    pub async fn shutdown(&mut self) -> TeardownReport {
        if self.shut_down {
            return TeardownReport::default();
        }
        self.shut_down = true;

        let mut report = self.teardown_case().await;
        let drained = self.store.drain_run();
        report.extend(self.unwind(Scope::Run, drained).await);

        info!(
            "Fixture engine shut down: {} fixture(s) torn down, {} teardown failure(s)",
            report.torn_down.len(),
            report.failures.len()
        );
        report
    }

    async fn setup_and_run<I, S, F, Fut>(
        &mut self,
        needs: I,
        body: F,
    ) -> std::result::Result<(), CaseFailure>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
        F: FnOnce(FixtureValues) -> Fut,
        Fut: Future<Output = anyhow::Result<()>>,
    {
        let values = self.setup(needs).await.map_err(CaseFailure::Setup)?;

        match AssertUnwindSafe(body(values)).catch_unwind().await {
            Ok(result) => result.map_err(CaseFailure::Body),
            Err(panic) => Err(CaseFailure::Body(anyhow::anyhow!(
                "test body panicked: {}",
                panic_message(&*panic)
            ))),
        }
    }

    /// Run a factory up to its yield.
    ///
    /// A factory that drops its slot unused fails at once, even if it keeps
    /// running. Factories that time out or break the protocol are detached,
    /// not cancelled: their `provide` returns immediately and cleanup runs.
    async fn construct(
        &self,
        declaration: &FixtureDeclaration,
        deps: FixtureValues,
    ) -> Result<ResolvedInstance> {
        let name = declaration.name().to_string();
        let (value_tx, value_rx) = oneshot::channel();
        let (resume_tx, resume_rx) = oneshot::channel();
        let abandoned = Arc::new(AtomicBool::new(false));
        let slot = FixtureSlot::new(name.clone(), value_tx, resume_rx, abandoned.clone());

        let mut factory = declaration.factory()(deps, slot);
        let (abandon_tx, abandon_rx) = oneshot::channel::<()>();
        let mut abandon_tx = Some(abandon_tx);
        // Report abandonment only while the factory is still pending, so a
        // factory that returned or panicked is classified by its result.
        let mut task = tokio::spawn(futures::future::poll_fn(move |cx| {
            let poll = factory.as_mut().poll(cx);
            if poll.is_pending() && abandoned.load(Ordering::Acquire) {
                if let Some(tx) = abandon_tx.take() {
                    let _ = tx.send(());
                }
            }
            poll
        }));

        let yielded = async {
            match value_rx.await {
                Ok(value) => Ok(value),
                // The slot is gone without a value: find out why.
                Err(_) => Err(tokio::select! {
                    biased;
                    joined = &mut task => finished_without_value(&name, joined),
                    marker = abandon_rx => match marker {
                        Ok(()) => FixtureError::InvalidFixtureProtocol {
                            fixture: name.clone(),
                            reason: "factory dropped its slot without providing a value".to_string(),
                        },
                        Err(_) => finished_without_value(&name, (&mut task).await),
                    },
                }),
            }
        };

        let limit = declaration.timeout().or_else(|| self.config.setup_timeout());
        let finished = match limit {
            Some(limit) => tokio::time::timeout(limit, yielded).await.ok(),
            None => Some(yielded.await),
        };

        match finished {
            Some(Ok(value)) => Ok(ResolvedInstance::new(value, Continuation { resume_tx, task })),
            Some(Err(err)) => Err(err),
            None => {
                debug!("Detaching fixture {} after setup timeout", name);
                Err(FixtureError::Timeout {
                    fixture: name,
                    phase: Phase::Setup,
                    after: limit.unwrap_or_default(),
                })
            }
        }
    }

    async fn unwind(&mut self, scope: Scope, drained: Vec<(String, ResolvedInstance)>) -> TeardownReport {
        let mut report = TeardownReport::default();

        for (name, mut instance) in drained.into_iter().rev() {
            match self.release(scope, &name, &mut instance).await {
                Ok(()) => {
                    debug!("Tore down fixture {} ({} scope)", name, scope);
                    self.store.set_state(scope, &name, FixtureState::TornDown);
                }
                Err(failure) => {
                    warn!("Teardown of fixture {} failed: {}", name, failure.message);
                    self.store.set_state(scope, &name, FixtureState::Failed);
                    report.failures.push(failure);
                }
            }
            report.torn_down.push(name);
        }

        report
    }

    /// Resume one factory past its yield and wait for its cleanup
    async fn release(
        &self,
        scope: Scope,
        name: &str,
        instance: &mut ResolvedInstance,
    ) -> std::result::Result<(), TeardownFailure> {
        let failure = |message: String| TeardownFailure {
            fixture: name.to_string(),
            scope,
            message,
        };

        let Some(Continuation { resume_tx, mut task }) = instance.take_continuation() else {
            return Ok(());
        };

        // The factory may already have finished on its own; that is fine.
        let _ = resume_tx.send(());

        let finished = match self.config.teardown_timeout() {
            Some(limit) => {
                let finished = tokio::time::timeout(limit, &mut task).await;
                match finished {
                    Ok(result) => result,
                    Err(_) => {
                        // Left to finish on its own.
                        drop(task);
                        let err = FixtureError::Timeout {
                            fixture: name.to_string(),
                            phase: Phase::Teardown,
                            after: limit,
                        };
                        return Err(failure(err.to_string()));
                    }
                }
            }
            None => task.await,
        };

        match finished {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(failure(format!("{:#}", err))),
            Err(join) => Err(failure(describe_join_error(join))),
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if !self.shut_down && !self.store.is_empty() {
            // Dropping the continuations lets each factory run its cleanup
            // unsupervised, provided the runtime is still alive.
            warn!("Fixture engine dropped without shutdown; teardown errors will not be reported");
        }
    }
}

fn finished_without_value(
    fixture: &str,
    joined: std::result::Result<anyhow::Result<()>, JoinError>,
) -> FixtureError {
    match joined {
        Ok(Ok(())) => FixtureError::InvalidFixtureProtocol {
            fixture: fixture.to_string(),
            reason: "factory finished without providing a value".to_string(),
        },
        Ok(Err(source)) => FixtureError::ConstructionFailed {
            fixture: fixture.to_string(),
            source,
        },
        Err(join) => FixtureError::ConstructionFailed {
            fixture: fixture.to_string(),
            source: anyhow::anyhow!(describe_join_error(join)),
        },
    }
}

fn describe_join_error(err: JoinError) -> String {
    if err.is_panic() {
        let panic = err.into_panic();
        format!("factory panicked: {}", panic_message(&*panic))
    } else {
        "factory task was cancelled".to_string()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

fn error_chain(err: &FixtureError) -> String {
    let mut message = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

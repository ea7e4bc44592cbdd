//! Fixture declarations and the yield protocol
//!
//! A factory is an async function that acquires a resource, hands it to the
//! engine through its [`FixtureSlot`] and then waits. Whatever runs after
//! `provide(..).await` returns is the fixture's cleanup: the engine resumes
//! it during teardown.
//!
//! ```ignore
//! FixtureDeclaration::new("page", Scope::Case, |deps, slot| async move {
//!     let context = deps.get::<BrowserContext>("context")?;
//!     let page = context.new_page().await?;
//!     slot.provide_shared(page.clone()).await;
//!     page.close().await
//! })
//! .depends_on(["context"])
//! ```

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::value::{FixtureValue, FixtureValues};

/// Lifetime class of a fixture instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    /// Shared by every test in the process, torn down at shutdown
    Run,
    /// Fresh for every test, torn down when the test finishes
    Case,
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Run => write!(f, "run"),
            Scope::Case => write!(f, "case"),
        }
    }
}

pub type FactoryFuture = BoxFuture<'static, anyhow::Result<()>>;

/// Type-erased two-phase factory
pub type Factory = Arc<dyn Fn(FixtureValues, FixtureSlot) -> FactoryFuture + Send + Sync>;

/// The yield operation handed to a factory.
///
/// Providing consumes the slot, so a factory cannot yield twice. A factory
/// that returns or drops its slot without providing breaks the protocol;
/// dropping an unused slot flags it as abandoned so setup can fail at once.
pub struct FixtureSlot {
    fixture: String,
    value_tx: Option<oneshot::Sender<FixtureValue>>,
    resume_rx: Option<oneshot::Receiver<()>>,
    abandoned: Arc<AtomicBool>,
}

impl FixtureSlot {
    pub(crate) fn new(
        fixture: impl Into<String>,
        value_tx: oneshot::Sender<FixtureValue>,
        resume_rx: oneshot::Receiver<()>,
        abandoned: Arc<AtomicBool>,
    ) -> Self {
        Self {
            fixture: fixture.into(),
            value_tx: Some(value_tx),
            resume_rx: Some(resume_rx),
            abandoned,
        }
    }

    /// Name of the fixture this slot belongs to
    pub fn fixture(&self) -> &str {
        &self.fixture
    }

    /// Hand `value` to the engine and suspend until teardown
    pub async fn provide<T: Any + Send + Sync>(self, value: T) {
        self.provide_shared(Arc::new(value)).await
    }

    /// Like [`provide`](Self::provide) for a value the factory keeps a handle
    /// to for its own cleanup
    pub async fn provide_shared<T: Any + Send + Sync>(mut self, value: Arc<T>) {
        let (Some(value_tx), Some(resume_rx)) = (self.value_tx.take(), self.resume_rx.take()) else {
            return;
        };

        if value_tx.send(value).is_err() {
            // Setup was abandoned; nothing will resume us.
            return;
        }

        // A dropped resume sender means the engine went away: clean up now.
        let _ = resume_rx.await;
    }
}

impl Drop for FixtureSlot {
    fn drop(&mut self) {
        if self.value_tx.is_some() {
            self.abandoned.store(true, Ordering::Release);
        }
    }
}

impl fmt::Debug for FixtureSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FixtureSlot")
            .field("fixture", &self.fixture)
            .finish_non_exhaustive()
    }
}

/// Build/dispose pair as an alternative to a hand-written factory
#[async_trait]
pub trait FixtureLifecycle: Send + Sync + 'static {
    type Value: Send + Sync + 'static;

    async fn build(&self, deps: &FixtureValues) -> anyhow::Result<Self::Value>;

    async fn dispose(&self, _value: Arc<Self::Value>) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Static, author-supplied description of one fixture
#[derive(Clone)]
pub struct FixtureDeclaration {
    name: String,
    scope: Scope,
    dependencies: Vec<String>,
    factory: Factory,
    auto: bool,
    timeout: Option<Duration>,
    description: Option<String>,
}

impl FixtureDeclaration {
    pub fn new<F, Fut>(name: impl Into<String>, scope: Scope, factory: F) -> Self
    where
        F: Fn(FixtureValues, FixtureSlot) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let factory: Factory = Arc::new(move |deps: FixtureValues, slot: FixtureSlot| -> FactoryFuture {
            factory(deps, slot).boxed()
        });
        Self {
            name: name.into(),
            scope,
            dependencies: Vec::new(),
            factory,
            auto: false,
            timeout: None,
            description: None,
        }
    }

    /// A fixture whose value is fixed up front and needs no cleanup
    pub fn value<T: Any + Send + Sync>(name: impl Into<String>, scope: Scope, value: T) -> Self {
        let value = Arc::new(value);
        Self::new(name, scope, move |_deps, slot| {
            let value = value.clone();
            async move {
                slot.provide_shared(value).await;
                anyhow::Ok(())
            }
        })
    }

    /// Adapt a [`FixtureLifecycle`] implementation into a factory
    pub fn from_lifecycle<L: FixtureLifecycle>(
        name: impl Into<String>,
        scope: Scope,
        lifecycle: L,
    ) -> Self {
        let lifecycle = Arc::new(lifecycle);
        Self::new(name, scope, move |deps, slot| {
            let lifecycle = lifecycle.clone();
            async move {
                let value = Arc::new(lifecycle.build(&deps).await?);
                slot.provide_shared(value.clone()).await;
                lifecycle.dispose(value).await
            }
        })
    }

    /// Add dependencies; duplicates are ignored and author order is kept
    pub fn depends_on<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for dependency in dependencies {
            let dependency = dependency.into();
            if !self.dependencies.contains(&dependency) {
                self.dependencies.push(dependency);
            }
        }
        self
    }

    /// Construct for every test even when nothing names this fixture
    pub fn with_auto(mut self, auto: bool) -> Self {
        self.auto = auto;
        self
    }

    /// Limit how long the factory may take to yield
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    pub fn is_auto(&self) -> bool {
        self.auto
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub(crate) fn factory(&self) -> Factory {
        self.factory.clone()
    }
}

impl fmt::Debug for FixtureDeclaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FixtureDeclaration")
            .field("name", &self.name)
            .field("scope", &self.scope)
            .field("dependencies", &self.dependencies)
            .field("auto", &self.auto)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

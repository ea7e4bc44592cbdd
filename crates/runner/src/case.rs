//! Test case definitions

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use rigging_engine::FixtureValues;

/// Type-erased test body
pub type CaseBody = Arc<dyn Fn(FixtureValues) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// A named test with the fixtures it needs
#[derive(Clone)]
pub struct TestCase {
    /// Unique name for this test
    pub name: String,

    /// Human-readable description
    pub description: String,

    /// Tags for filtering tests
    pub tags: Vec<String>,

    /// Fixtures the body asks for by name
    pub needs: Vec<String>,

    pub body: CaseBody,
}

impl TestCase {
    pub fn new<F, Fut>(name: impl Into<String>, body: F) -> Self
    where
        F: Fn(FixtureValues) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let body: CaseBody = Arc::new(move |values: FixtureValues| -> BoxFuture<'static, anyhow::Result<()>> {
            body(values).boxed()
        });
        Self {
            name: name.into(),
            description: String::new(),
            tags: Vec::new(),
            needs: Vec::new(),
            body,
        }
    }

    pub fn with_needs<I, S>(mut self, needs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.needs.extend(needs.into_iter().map(Into::into));
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

impl fmt::Debug for TestCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestCase")
            .field("name", &self.name)
            .field("tags", &self.tags)
            .field("needs", &self.needs)
            .finish_non_exhaustive()
    }
}

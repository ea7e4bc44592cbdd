//! Resolved fixture values handed to factories and test bodies

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{FixtureError, Result};

/// A constructed fixture value.
///
/// Every dependent receives a clone of the same `Arc`, so a fixture shared
/// through a diamond dependency is one instance. Fixtures meant to be mutated
/// by several dependents wrap their state in a lock.
pub type FixtureValue = Arc<dyn Any + Send + Sync>;

/// Name to value lookup table
#[derive(Clone, Default)]
pub struct FixtureValues {
    values: BTreeMap<String, FixtureValue>,
}

impl FixtureValues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Typed access to a resolved fixture
    pub fn get<T: Any + Send + Sync>(&self, name: &str) -> Result<Arc<T>> {
        let value = self
            .values
            .get(name)
            .ok_or_else(|| FixtureError::MissingFixture(name.to_string()))?;

        value
            .clone()
            .downcast::<T>()
            .map_err(|_| FixtureError::TypeMismatch {
                fixture: name.to_string(),
                expected: std::any::type_name::<T>(),
            })
    }

    /// Untyped access to a resolved fixture
    pub fn raw(&self, name: &str) -> Option<&FixtureValue> {
        self.values.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub(crate) fn insert(&mut self, name: impl Into<String>, value: FixtureValue) {
        self.values.insert(name.into(), value);
    }

    /// Copy out the entries for `names`, skipping any that are absent
    pub(crate) fn select<'a, I>(&self, names: I) -> FixtureValues
    where
        I: IntoIterator<Item = &'a String>,
    {
        let values = names
            .into_iter()
            .filter_map(|name| {
                self.values
                    .get(name)
                    .map(|value| (name.clone(), value.clone()))
            })
            .collect();
        FixtureValues { values }
    }
}

impl fmt::Debug for FixtureValues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.values.keys()).finish()
    }
}

//! Per-scope cache of constructed fixture instances
//!
//! Each scope keeps its instances, the order they were constructed in, and
//! the lifecycle state of every fixture it has seen. The case table is
//! swapped for an empty one between tests; the run table lives until
//! shutdown.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::declaration::Scope;
use crate::error::{FixtureError, Result};
use crate::value::FixtureValue;

/// Lifecycle state of one fixture within one scope instance.
///
/// `Unrequested -> Resolving -> Constructed -> TornDown`, or `Resolving ->
/// Failed` when setup fails, or `Constructed -> Failed` when teardown fails.
/// A case fixture that never got constructed is `Unrequested` again once the
/// case ends; the others keep their final state until rebuilt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixtureState {
    Unrequested,
    Resolving,
    Constructed,
    TornDown,
    Failed,
}

impl fmt::Display for FixtureState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FixtureState::Unrequested => "unrequested",
            FixtureState::Resolving => "resolving",
            FixtureState::Constructed => "constructed",
            FixtureState::TornDown => "torn down",
            FixtureState::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// Suspended remainder of a factory, resumed at teardown
pub(crate) struct Continuation {
    pub(crate) resume_tx: oneshot::Sender<()>,
    pub(crate) task: JoinHandle<anyhow::Result<()>>,
}

/// A constructed fixture. Dependents only ever see the value.
///
/// Built only once the factory has yielded, so every stored instance is
/// ready to share.
pub struct ResolvedInstance {
    value: FixtureValue,
    continuation: Option<Continuation>,
}

impl ResolvedInstance {
    pub(crate) fn new(value: FixtureValue, continuation: Continuation) -> Self {
        Self {
            value,
            continuation: Some(continuation),
        }
    }

    pub fn value(&self) -> &FixtureValue {
        &self.value
    }

    pub(crate) fn take_continuation(&mut self) -> Option<Continuation> {
        self.continuation.take()
    }
}

impl fmt::Debug for ResolvedInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedInstance")
            .field("suspended", &self.continuation.is_some())
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Default)]
struct ScopeTable {
    instances: HashMap<String, ResolvedInstance>,
    order: Vec<String>,
    states: HashMap<String, FixtureState>,
}

impl ScopeTable {
    fn drain(&mut self) -> Vec<(String, ResolvedInstance)> {
        let mut instances = std::mem::take(&mut self.instances);
        let order = std::mem::take(&mut self.order);

        order
            .into_iter()
            .filter_map(|name| instances.remove(&name).map(|instance| (name, instance)))
            .collect()
    }
}

/// Instances for both scopes
#[derive(Debug, Default)]
pub struct ScopeStore {
    run: ScopeTable,
    case: ScopeTable,
}

impl ScopeStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self, scope: Scope) -> &ScopeTable {
        match scope {
            Scope::Run => &self.run,
            Scope::Case => &self.case,
        }
    }

    fn table_mut(&mut self, scope: Scope) -> &mut ScopeTable {
        match scope {
            Scope::Run => &mut self.run,
            Scope::Case => &mut self.case,
        }
    }

    pub fn get(&self, scope: Scope, name: &str) -> Option<&ResolvedInstance> {
        self.table(scope).instances.get(name)
    }

    /// Insert a freshly constructed instance and append it to the scope's
    /// construction order.
    ///
    /// A second record for the same name means the engine tried to construct
    /// a fixture twice, which is an engine bug rather than a user error.
    pub fn record(&mut self, scope: Scope, name: &str, instance: ResolvedInstance) -> Result<()> {
        let table = self.table_mut(scope);
        if table.instances.contains_key(name) {
            return Err(FixtureError::DuplicateConstruction {
                fixture: name.to_string(),
                scope,
            });
        }

        table.instances.insert(name.to_string(), instance);
        table.order.push(name.to_string());
        table.states.insert(name.to_string(), FixtureState::Constructed);
        Ok(())
    }

    pub fn state(&self, scope: Scope, name: &str) -> FixtureState {
        self.table(scope)
            .states
            .get(name)
            .copied()
            .unwrap_or(FixtureState::Unrequested)
    }

    pub(crate) fn set_state(&mut self, scope: Scope, name: &str, state: FixtureState) {
        self.table_mut(scope).states.insert(name.to_string(), state);
    }

    /// Names constructed in `scope`, in construction order
    pub fn construction_order(&self, scope: Scope) -> &[String] {
        &self.table(scope).order
    }

    /// Take the case instances in construction order and start a clean case
    /// table, so the next test cannot observe this one's instances.
    ///
    /// Drained fixtures stay `Constructed` until the engine records how their
    /// teardown went; states of fixtures that never got built are forgotten.
    pub fn drain_case(&mut self) -> Vec<(String, ResolvedInstance)> {
        let drained = self.case.drain();
        self.case
            .states
            .retain(|name, _| drained.iter().any(|(drained_name, _)| drained_name == name));
        drained
    }

    /// Take the run instances in construction order. Only used at shutdown.
    pub(crate) fn drain_run(&mut self) -> Vec<(String, ResolvedInstance)> {
        self.run.drain()
    }

    pub fn is_empty(&self) -> bool {
        self.run.instances.is_empty() && self.case.instances.is_empty()
    }
}

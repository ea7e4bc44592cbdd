//! Auto-fixture activation
//!
//! Auto fixtures are found once, from the registry's static flags, and
//! prepended to every test's request. Both scopes apply to every test, so a
//! run-scoped auto fixture is built by the first test and reused after that.

use std::collections::HashSet;

use crate::registry::Registry;

#[derive(Debug, Clone, Default)]
pub struct AutoActivator {
    auto: Vec<String>,
}

impl AutoActivator {
    pub fn new(registry: &Registry) -> Self {
        Self {
            auto: registry.auto_fixtures().to_vec(),
        }
    }

    pub fn auto_fixtures(&self) -> &[String] {
        &self.auto
    }

    /// The request list for one test: auto fixtures first, then the test's
    /// own needs in the order given, without duplicates
    pub fn activate<I, S>(&self, needs: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = HashSet::new();
        let mut requested = Vec::new();

        let auto = self.auto.iter().map(String::as_str);
        let explicit: Vec<S> = needs.into_iter().collect();

        for name in auto.chain(explicit.iter().map(|s| <S as AsRef<str>>::as_ref(s))) {
            if seen.insert(name.to_string()) {
                requested.push(name.to_string());
            }
        }

        requested
    }
}

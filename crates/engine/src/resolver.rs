//! Dependency graph resolution
//!
//! Depth-first traversal with in-progress/done marks. A name met again while
//! still in progress closes a cycle; the error carries the whole path so the
//! faulty declarations can be found without re-deriving the graph.

use std::collections::HashMap;

use crate::error::{FixtureError, Result};
use crate::registry::Registry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    InProgress,
    Done,
}

/// Transient state of one resolution pass
#[derive(Debug, Default)]
pub struct ConstructionRecord {
    marks: HashMap<String, Mark>,
    path: Vec<String>,
    order: Vec<String>,
}

impl ConstructionRecord {
    pub fn into_order(self) -> Vec<String> {
        self.order
    }
}

/// Computes construction orders against a registry
pub struct Resolver<'a> {
    registry: &'a Registry,
}

impl<'a> Resolver<'a> {
    pub fn new(registry: &'a Registry) -> Self {
        Self { registry }
    }

    /// Order for a single fixture; `name` is always last
    pub fn resolve(&self, name: &str) -> Result<Vec<String>> {
        self.resolve_all([name])
    }

    /// One merged order for several requested fixtures.
    ///
    /// Shared dependencies appear once. The whole request is resolved before
    /// anything is returned, so an unknown name or a cycle anywhere in it is
    /// reported before construction can start.
    pub fn resolve_all<I, S>(&self, names: I) -> Result<Vec<String>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut record = ConstructionRecord::default();
        for name in names {
            self.visit(name.as_ref(), None, &mut record)?;
        }
        Ok(record.into_order())
    }

    /// Walk every declaration, reporting the first cycle found
    pub fn check_acyclic(&self) -> Result<()> {
        let mut record = ConstructionRecord::default();
        for declaration in self.registry.iter() {
            self.visit(declaration.name(), None, &mut record)?;
        }
        Ok(())
    }

    fn visit(
        &self,
        name: &str,
        required_by: Option<&str>,
        record: &mut ConstructionRecord,
    ) -> Result<()> {
        match record.marks.get(name) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::InProgress) => {
                let start = record.path.iter().position(|n| n == name).unwrap_or(0);
                let mut path = record.path[start..].to_vec();
                path.push(name.to_string());
                return Err(FixtureError::CycleDetected { path });
            }
            None => {}
        }

        let declaration = self
            .registry
            .get(name)
            .ok_or_else(|| FixtureError::UnknownFixture {
                name: name.to_string(),
                required_by: required_by.map(str::to_string),
            })?;

        record.marks.insert(name.to_string(), Mark::InProgress);
        record.path.push(name.to_string());

        for dependency in declaration.dependencies() {
            self.visit(dependency, Some(name), record)?;
        }

        record.path.pop();
        record.marks.insert(name.to_string(), Mark::Done);
        record.order.push(name.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::declaration::{FixtureDeclaration, Scope};

    fn fixture(name: &str, deps: &[&str]) -> FixtureDeclaration {
        FixtureDeclaration::value(name, Scope::Case, ()).depends_on(deps.iter().copied())
    }

    fn registry(decls: Vec<FixtureDeclaration>) -> Registry {
        let mut builder = Registry::builder();
        for decl in decls {
            builder.register(decl);
        }
        builder.build_unchecked()
    }

    #[test]
    fn test_leaf_resolves_to_itself() {
        let registry = registry(vec![fixture("base_url", &[])]);
        let order = Resolver::new(&registry).resolve("base_url").unwrap();
        assert_eq!(order, ["base_url"]);
    }

    #[test]
    fn test_nested_dependencies_come_first() {
        let registry = registry(vec![
            fixture("d", &[]),
            fixture("b", &["d"]),
            fixture("c", &[]),
            fixture("a", &["b", "c"]),
        ]);
        let order = Resolver::new(&registry).resolve("a").unwrap();
        assert_eq!(order, ["d", "b", "c", "a"]);
    }

    #[test]
    fn test_diamond_is_ordered_once() {
        let registry = registry(vec![
            fixture("browser", &[]),
            fixture("context", &["browser"]),
            fixture("tracing", &["browser"]),
            fixture("page", &["context", "tracing"]),
        ]);
        let order = Resolver::new(&registry).resolve("page").unwrap();
        assert_eq!(order, ["browser", "context", "tracing", "page"]);
    }

    #[test]
    fn test_cycle_reports_full_path() {
        let registry = registry(vec![
            fixture("entry", &["a"]),
            fixture("a", &["b"]),
            fixture("b", &["c"]),
            fixture("c", &["a"]),
        ]);
        match Resolver::new(&registry).resolve("entry") {
            Err(FixtureError::CycleDetected { path }) => {
                assert_eq!(path, ["a", "b", "c", "a"]);
            }
            other => panic!("expected cycle, got {:?}", other),
        }
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let registry = registry(vec![fixture("loop", &["loop"])]);
        assert!(matches!(
            Resolver::new(&registry).check_acyclic(),
            Err(FixtureError::CycleDetected { path }) if path == ["loop", "loop"]
        ));
    }

    #[test]
    fn test_unknown_dependency_names_parent() {
        let registry = registry(vec![fixture("page", &["context"])]);
        match Resolver::new(&registry).resolve("page") {
            Err(FixtureError::UnknownFixture { name, required_by }) => {
                assert_eq!(name, "context");
                assert_eq!(required_by.as_deref(), Some("page"));
            }
            other => panic!("expected unknown fixture, got {:?}", other),
        }
    }

    #[test]
    fn test_merged_request_has_no_duplicates() {
        let registry = registry(vec![
            fixture("shared", &[]),
            fixture("left", &["shared"]),
            fixture("right", &["shared"]),
        ]);
        let order = Resolver::new(&registry)
            .resolve_all(["left", "right", "left"])
            .unwrap();
        assert_eq!(order, ["shared", "left", "right"]);
    }
}

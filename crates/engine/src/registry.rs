//! Fixture registry
//!
//! Built once at process start and immutable afterwards. `build()` runs the
//! whole static validation pass so configuration errors surface before any
//! test runs.

use std::collections::HashMap;

use tracing::debug;

use crate::declaration::{FixtureDeclaration, Scope};
use crate::error::{FixtureError, Result};
use crate::resolver::Resolver;

/// Validated, immutable set of fixture declarations
#[derive(Debug, Clone)]
pub struct Registry {
    declarations: Vec<FixtureDeclaration>,
    index: HashMap<String, usize>,
    auto: Vec<String>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    pub fn get(&self, name: &str) -> Option<&FixtureDeclaration> {
        self.index.get(name).map(|&i| &self.declarations[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Declarations in registration order
    pub fn iter(&self) -> impl Iterator<Item = &FixtureDeclaration> {
        self.declarations.iter()
    }

    pub fn len(&self) -> usize {
        self.declarations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.declarations.is_empty()
    }

    /// Names of fixtures flagged `auto`, in registration order
    pub fn auto_fixtures(&self) -> &[String] {
        &self.auto
    }

    /// Full static validation; `RegistryBuilder::build` runs this
    pub fn validate(&self) -> Result<()> {
        for declaration in &self.declarations {
            for dependency in declaration.dependencies() {
                let target = self.get(dependency).ok_or_else(|| FixtureError::UnknownFixture {
                    name: dependency.clone(),
                    required_by: Some(declaration.name().to_string()),
                })?;

                if declaration.scope() == Scope::Run && target.scope() == Scope::Case {
                    return Err(FixtureError::ScopeMismatch {
                        fixture: declaration.name().to_string(),
                        scope: declaration.scope(),
                        dependency: dependency.clone(),
                        dependency_scope: target.scope(),
                    });
                }
            }
        }

        Resolver::new(self).check_acyclic()
    }

    fn from_declarations(declarations: Vec<FixtureDeclaration>) -> Result<Self> {
        let mut index = HashMap::with_capacity(declarations.len());
        for (i, declaration) in declarations.iter().enumerate() {
            if index.insert(declaration.name().to_string(), i).is_some() {
                return Err(FixtureError::DuplicateFixture(declaration.name().to_string()));
            }
        }

        let auto = declarations
            .iter()
            .filter(|d| d.is_auto())
            .map(|d| d.name().to_string())
            .collect();

        Ok(Self {
            declarations,
            index,
            auto,
        })
    }
}

/// Collects declarations before validation
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    declarations: Vec<FixtureDeclaration>,
    overrides: Vec<FixtureDeclaration>,
}

impl RegistryBuilder {
    /// Publish a fixture declaration
    pub fn register(&mut self, declaration: FixtureDeclaration) -> &mut Self {
        debug!("Registering fixture {} ({} scope)", declaration.name(), declaration.scope());
        self.declarations.push(declaration);
        self
    }

    /// Chainable form of [`register`](Self::register)
    pub fn fixture(mut self, declaration: FixtureDeclaration) -> Self {
        self.register(declaration);
        self
    }

    /// Replace an already registered fixture of the same name.
    ///
    /// Overrides are applied at `build()`, after every registration, so the
    /// override wins regardless of call order.
    pub fn override_fixture(mut self, declaration: FixtureDeclaration) -> Self {
        self.overrides.push(declaration);
        self
    }

    /// Apply overrides and validate the result
    pub fn build(self) -> Result<Registry> {
        let registry = self.assemble()?;
        registry.validate()?;
        debug!(
            "Fixture registry ready: {} fixture(s), {} auto",
            registry.len(),
            registry.auto_fixtures().len()
        );
        Ok(registry)
    }

    fn assemble(self) -> Result<Registry> {
        let RegistryBuilder {
            mut declarations,
            overrides,
        } = self;

        for declaration in overrides {
            let slot = declarations
                .iter_mut()
                .find(|d| d.name() == declaration.name())
                .ok_or_else(|| FixtureError::UnknownFixture {
                    name: declaration.name().to_string(),
                    required_by: None,
                })?;
            debug!("Overriding fixture {}", declaration.name());
            *slot = declaration;
        }

        Registry::from_declarations(declarations)
    }

    /// Skip graph validation so resolver tests can build broken graphs
    #[cfg(test)]
    pub(crate) fn build_unchecked(self) -> Registry {
        self.assemble().expect("registry without duplicates")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn fixture(name: &str, scope: Scope, deps: &[&str]) -> FixtureDeclaration {
        FixtureDeclaration::value(name, scope, ()).depends_on(deps.iter().copied())
    }

    #[test]
    fn test_valid_registry_builds() {
        let registry = Registry::builder()
            .fixture(fixture("browser", Scope::Run, &[]))
            .fixture(fixture("page", Scope::Case, &["browser"]))
            .fixture(fixture("console", Scope::Case, &[]).with_auto(true))
            .build()
            .unwrap();

        assert_eq!(registry.len(), 3);
        assert!(registry.contains("page"));
        assert_eq!(registry.auto_fixtures(), ["console"]);
        let names: Vec<&str> = registry.iter().map(|d| d.name()).collect();
        assert_eq!(names, ["browser", "page", "console"]);
    }

    #[test]
    fn test_duplicate_registration_is_rejected() {
        let err = Registry::builder()
            .fixture(fixture("page", Scope::Case, &[]))
            .fixture(fixture("page", Scope::Case, &[]))
            .build()
            .unwrap_err();
        assert!(matches!(err, FixtureError::DuplicateFixture(name) if name == "page"));
    }

    #[test]
    fn test_dangling_dependency_is_rejected() {
        let err = Registry::builder()
            .fixture(fixture("page", Scope::Case, &["context"]))
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            FixtureError::UnknownFixture { ref name, ref required_by }
                if name == "context" && required_by.as_deref() == Some("page")
        ));
    }

    #[test]
    fn test_cycle_is_rejected_at_build() {
        let err = Registry::builder()
            .fixture(fixture("a", Scope::Case, &["b"]))
            .fixture(fixture("b", Scope::Case, &["a"]))
            .build()
            .unwrap_err();
        assert!(matches!(err, FixtureError::CycleDetected { ref path } if path == &["a", "b", "a"]));
    }

    #[test_case(Scope::Run, Scope::Run, true; "run on run")]
    #[test_case(Scope::Case, Scope::Run, true; "case on run")]
    #[test_case(Scope::Case, Scope::Case, true; "case on case")]
    #[test_case(Scope::Run, Scope::Case, false; "run on case")]
    fn test_scope_compatibility(dependent: Scope, dependency: Scope, ok: bool) {
        let result = Registry::builder()
            .fixture(fixture("dependency", dependency, &[]))
            .fixture(fixture("dependent", dependent, &["dependency"]))
            .build();

        assert_eq!(result.is_ok(), ok);
        if let Err(err) = result {
            assert!(matches!(err, FixtureError::ScopeMismatch { .. }));
        }
    }

    #[test]
    fn test_override_replaces_declaration() {
        let registry = Registry::builder()
            .override_fixture(fixture("base_url", Scope::Run, &["env"]))
            .fixture(fixture("env", Scope::Run, &[]))
            .fixture(fixture("base_url", Scope::Run, &[]))
            .build()
            .unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get("base_url").unwrap().dependencies(), ["env"]);
    }

    #[test]
    fn test_override_of_unknown_fixture_fails() {
        let err = Registry::builder()
            .override_fixture(fixture("missing", Scope::Case, &[]))
            .build()
            .unwrap_err();
        assert!(matches!(err, FixtureError::UnknownFixture { ref name, .. } if name == "missing"));
    }
}

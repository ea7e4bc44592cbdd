//! Rigging Fixture Engine
//!
//! Dependency injection and lifecycle management for named test fixtures.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Engine (lifecycle)                   │
//! ├─────────────────────────────────────────────────────────────┤
//! │  setup(needs)                                               │
//! │    ├── AutoActivator::activate(needs) -> request list       │
//! │    ├── Resolver::resolve_all(request) -> construction order │
//! │    ├── ScopeStore::get(scope, name)   -> reuse              │
//! │    └── factory(deps, slot) ... slot.provide(value)          │
//! │  teardown_case()  -> resume case continuations, newest first│
//! │  shutdown()       -> resume run continuations, newest first │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Registry (immutable, validated once)                       │
//! │    └── FixtureDeclaration { name, scope, deps, factory,     │
//! │                             auto, timeout }                 │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod auto;
pub mod config;
pub mod declaration;
pub mod error;
pub mod lifecycle;
pub mod registry;
pub mod resolver;
pub mod store;
pub mod value;

pub use auto::AutoActivator;
pub use config::EngineConfig;
pub use declaration::{FixtureDeclaration, FixtureLifecycle, FixtureSlot, Scope};
pub use error::{FixtureError, Phase, Result, TeardownFailure};
pub use lifecycle::{CaseFailure, CaseOutcome, Engine, TeardownReport};
pub use registry::{Registry, RegistryBuilder};
pub use resolver::Resolver;
pub use store::{FixtureState, ResolvedInstance, ScopeStore};
pub use value::{FixtureValue, FixtureValues};

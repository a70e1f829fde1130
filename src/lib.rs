//! Stack Secrets Library
//!
//! Loads secrets through connectors, validates them, turns them into apply-ready effects
//! through providers and injects secret references into composed Kubernetes manifests.
//!
//! The pipeline is driven by [`orchestrator::SecretManagerEngine`]:
//!
//! 1. `collect` gathers the managers (one manager, or every registry entry)
//! 2. `inject_secrets_to_providers` hands each provider the secrets routed to it
//! 3. `validate` loads every declared secret and checks it can be read
//! 4. `prepare_effects` builds effects, merges them per provider and across managers
//! 5. `apply` pushes `kubectl` effects into the cluster, or logs them in dry-run mode
//!
//! Injections into manifests are declared on a [`stack::Stack`] through
//! [`injection::InjectionContext`] and rendered by `Stack::build`.

pub mod config;
pub mod connector;
pub mod effect;
pub mod error;
pub mod injection;
pub mod manager;
pub mod merge;
pub mod observability;
pub mod orchestrator;
pub mod provider;
pub mod stack;
pub mod strategy;

pub use config::ProjectConfig;
pub use connector::{Connector, SecretValue};
pub use effect::{EffectKind, PreparedEffect};
pub use error::{Result, SecretError};
pub use injection::{Injection, InjectionContext, SecretInjectionBuilder};
pub use manager::{SecretDefinition, SecretManager, SecretRegistry};
pub use merge::{ConflictOptions, ConflictScope, MergeEngine, MergeStrategy, SecretOrigin};
pub use orchestrator::{RunMode, RunSummary, SecretManagerEngine, SecretSource};
pub use provider::Provider;
pub use stack::Stack;
pub use strategy::InjectionStrategy;

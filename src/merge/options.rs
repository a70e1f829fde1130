//! # Conflict Options
//!
//! Per-scope merge strategies and the `strict` switch.
//!
//! Scopes, narrowest first:
//!
//! | Scope | Contributions differ in | Default |
//! |---|---|---|
//! | `intraProvider` | nothing (same provider instance) | `autoMerge` |
//! | `crossProvider` | provider, same manager | `error` |
//! | `intraStack` | manager, same stack | `error` |
//! | `crossStack` | stack | `error` |
//!
//! Older configurations name three levels instead. They map onto the scopes as
//! `managerLevel` → `crossProvider`, `stackLevel` → `intraStack`, `workspaceLevel` → `crossStack`.

use crate::error::{Result, SecretError};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum MergeStrategy {
    /// Later contribution replaces the earlier one
    Overwrite,
    /// Shallow merge of two mappings, overwrite otherwise
    AutoMerge,
    /// Reject the collision
    Error,
}

impl MergeStrategy {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            MergeStrategy::Overwrite => "overwrite",
            MergeStrategy::AutoMerge => "autoMerge",
            MergeStrategy::Error => "error",
        }
    }
}

impl fmt::Display for MergeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize, JsonSchema,
)]
#[serde(rename_all = "camelCase")]
pub enum ConflictScope {
    IntraProvider,
    CrossProvider,
    IntraStack,
    CrossStack,
}

impl ConflictScope {
    pub const ALL: [ConflictScope; 4] = [
        ConflictScope::IntraProvider,
        ConflictScope::CrossProvider,
        ConflictScope::IntraStack,
        ConflictScope::CrossStack,
    ];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictScope::IntraProvider => "intraProvider",
            ConflictScope::CrossProvider => "crossProvider",
            ConflictScope::IntraStack => "intraStack",
            ConflictScope::CrossStack => "crossStack",
        }
    }
}

impl fmt::Display for ConflictScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Strategy table, one entry per scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct ConflictStrategies {
    pub intra_provider: MergeStrategy,
    pub cross_provider: MergeStrategy,
    pub intra_stack: MergeStrategy,
    pub cross_stack: MergeStrategy,
}

impl Default for ConflictStrategies {
    fn default() -> Self {
        Self {
            intra_provider: MergeStrategy::AutoMerge,
            cross_provider: MergeStrategy::Error,
            intra_stack: MergeStrategy::Error,
            cross_stack: MergeStrategy::Error,
        }
    }
}

impl ConflictStrategies {
    /// Every scope rejects collisions
    #[must_use]
    pub fn all_error() -> Self {
        Self {
            intra_provider: MergeStrategy::Error,
            cross_provider: MergeStrategy::Error,
            intra_stack: MergeStrategy::Error,
            cross_stack: MergeStrategy::Error,
        }
    }

    #[must_use]
    pub fn get(&self, scope: ConflictScope) -> MergeStrategy {
        match scope {
            ConflictScope::IntraProvider => self.intra_provider,
            ConflictScope::CrossProvider => self.cross_provider,
            ConflictScope::IntraStack => self.intra_stack,
            ConflictScope::CrossStack => self.cross_stack,
        }
    }

    pub fn set(&mut self, scope: ConflictScope, strategy: MergeStrategy) {
        match scope {
            ConflictScope::IntraProvider => self.intra_provider = strategy,
            ConflictScope::CrossProvider => self.cross_provider = strategy,
            ConflictScope::IntraStack => self.intra_stack = strategy,
            ConflictScope::CrossStack => self.cross_stack = strategy,
        }
    }
}

/// Three-level table accepted for older project files
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LegacyConflictLevels {
    #[serde(default)]
    pub manager_level: Option<MergeStrategy>,
    #[serde(default)]
    pub stack_level: Option<MergeStrategy>,
    #[serde(default)]
    pub workspace_level: Option<MergeStrategy>,
}

impl LegacyConflictLevels {
    /// Configured levels translated to scopes; `intraProvider` has no legacy level
    #[must_use]
    pub fn overrides(&self) -> Vec<(ConflictScope, MergeStrategy)> {
        [
            (ConflictScope::CrossProvider, self.manager_level),
            (ConflictScope::IntraStack, self.stack_level),
            (ConflictScope::CrossStack, self.workspace_level),
        ]
        .into_iter()
        .filter_map(|(scope, strategy)| strategy.map(|s| (scope, s)))
        .collect()
    }

    /// Overlay the configured levels on top of `base`
    #[must_use]
    pub fn apply_to(&self, mut base: ConflictStrategies) -> ConflictStrategies {
        for (scope, strategy) in self.overrides() {
            base.set(scope, strategy);
        }
        base
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConflictOptions {
    strict: bool,
    strategies: ConflictStrategies,
}

impl ConflictOptions {
    #[must_use]
    pub fn new(strategies: ConflictStrategies) -> Self {
        Self {
            strict: false,
            strategies,
        }
    }

    /// Strict mode: every scope errors
    #[must_use]
    pub fn strict() -> Self {
        Self {
            strict: true,
            strategies: ConflictStrategies::all_error(),
        }
    }

    /// Change one scope's strategy
    pub fn set_strategy(&mut self, scope: ConflictScope, strategy: MergeStrategy) -> Result<()> {
        if self.strict && strategy != MergeStrategy::Error {
            return Err(SecretError::Configuration(format!(
                "Conflict strategy for scope '{scope}' cannot be relaxed to '{strategy}' in strict mode"
            )));
        }
        self.strategies.set(scope, strategy);
        Ok(())
    }

    #[must_use]
    pub fn is_strict(&self) -> bool {
        self.strict
    }

    #[must_use]
    pub fn strategies(&self) -> &ConflictStrategies {
        &self.strategies
    }

    #[must_use]
    pub fn strategy_for(&self, scope: ConflictScope) -> MergeStrategy {
        if self.strict {
            return MergeStrategy::Error;
        }
        self.strategies.get(scope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_only_relax_intra_provider() {
        let options = ConflictOptions::default();
        assert_eq!(
            options.strategy_for(ConflictScope::IntraProvider),
            MergeStrategy::AutoMerge
        );
        for scope in [
            ConflictScope::CrossProvider,
            ConflictScope::IntraStack,
            ConflictScope::CrossStack,
        ] {
            assert_eq!(options.strategy_for(scope), MergeStrategy::Error);
        }
    }

    #[test]
    fn test_strict_rejects_relaxation() {
        let mut options = ConflictOptions::strict();
        assert_eq!(
            options.strategy_for(ConflictScope::IntraProvider),
            MergeStrategy::Error
        );
        assert!(options
            .set_strategy(ConflictScope::CrossStack, MergeStrategy::Overwrite)
            .is_err());
        assert!(options
            .set_strategy(ConflictScope::CrossStack, MergeStrategy::Error)
            .is_ok());
    }

    #[test]
    fn test_legacy_levels_map_onto_scopes() {
        let legacy = LegacyConflictLevels {
            manager_level: Some(MergeStrategy::AutoMerge),
            stack_level: None,
            workspace_level: Some(MergeStrategy::Overwrite),
        };
        let strategies = legacy.apply_to(ConflictStrategies::default());
        assert_eq!(strategies.cross_provider, MergeStrategy::AutoMerge);
        assert_eq!(strategies.intra_stack, MergeStrategy::Error);
        assert_eq!(strategies.cross_stack, MergeStrategy::Overwrite);
        assert_eq!(strategies.intra_provider, MergeStrategy::AutoMerge);
    }

    #[test]
    fn test_strategies_deserialize_partially() {
        let strategies: ConflictStrategies =
            serde_yaml::from_str("crossStack: overwrite\n").unwrap();
        assert_eq!(strategies.cross_stack, MergeStrategy::Overwrite);
        assert_eq!(strategies.intra_provider, MergeStrategy::AutoMerge);
    }
}

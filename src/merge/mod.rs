//! # Merge Engine
//!
//! Resolves collisions between contributions that target the same destination key.
//!
//! Contributions are processed in the order they are offered. The first contribution to a
//! key sets the baseline identity `(stack, manager, provider)`. Every later contribution is
//! compared against that baseline to find its [`ConflictScope`]; the strategy configured for
//! the scope then decides whether it merges, overwrites, or aborts the run.

pub mod options;

pub use options::{
    ConflictOptions, ConflictScope, ConflictStrategies, LegacyConflictLevels, MergeStrategy,
};

use crate::effect::MASK_TOKEN;
use crate::error::{Result, SecretError};
use crate::observability::metrics;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, info};

/// Provenance of one contribution
#[derive(Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretOrigin {
    /// Destination key
    pub key: String,
    pub value: Value,
    /// What produced the contribution, usually the secret name
    pub source: String,
    pub provider_name: String,
    pub manager_name: String,
    pub stack_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin_path: Option<String>,
}

impl fmt::Debug for SecretOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretOrigin")
            .field("key", &self.key)
            .field("value", &MASK_TOKEN)
            .field("source", &self.source)
            .field("provider_name", &self.provider_name)
            .field("manager_name", &self.manager_name)
            .field("stack_name", &self.stack_name)
            .field("origin_path", &self.origin_path)
            .finish()
    }
}

impl SecretOrigin {
    #[must_use]
    pub fn describe(&self) -> String {
        format!(
            "'{}' (stack {}, manager {}, provider {})",
            self.source, self.stack_name, self.manager_name, self.provider_name
        )
    }
}

/// Scope of `later` relative to `first`, widest difference wins
#[must_use]
pub fn conflict_scope(first: &SecretOrigin, later: &SecretOrigin) -> ConflictScope {
    if first.stack_name != later.stack_name {
        ConflictScope::CrossStack
    } else if first.manager_name != later.manager_name {
        ConflictScope::IntraStack
    } else if first.provider_name != later.provider_name {
        ConflictScope::CrossProvider
    } else {
        ConflictScope::IntraProvider
    }
}

/// What [`MergeEngine::merge`] did with a contribution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// First contribution to the key
    Recorded,
    /// Shallow-merged into the existing mapping
    Merged,
    /// Replaced the existing value
    Overwritten,
}

struct KeyState {
    key: String,
    value: Value,
    history: Vec<SecretOrigin>,
}

impl fmt::Debug for KeyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyState")
            .field("key", &self.key)
            .field("history", &self.history)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Default)]
pub struct MergeEngine {
    options: ConflictOptions,
    // insertion order of keys
    entries: Vec<KeyState>,
    index: HashMap<String, usize>,
}

impl MergeEngine {
    #[must_use]
    pub fn new(options: ConflictOptions) -> Self {
        Self {
            options,
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }

    #[must_use]
    pub fn options(&self) -> &ConflictOptions {
        &self.options
    }

    /// Offer one contribution; the resolved value is available through [`MergeEngine::get`]
    pub fn merge(&mut self, origin: SecretOrigin) -> Result<MergeOutcome> {
        let Some(&position) = self.index.get(&origin.key) else {
            debug!("Recording first contribution to {} from {}", origin.key, origin.describe());
            let position = self.entries.len();
            self.index.insert(origin.key.clone(), position);
            self.entries.push(KeyState {
                key: origin.key.clone(),
                value: origin.value.clone(),
                history: vec![origin],
            });
            return Ok(MergeOutcome::Recorded);
        };

        let state = &mut self.entries[position];
        let scope = conflict_scope(&state.history[0], &origin);
        let strategy = self.options.strategy_for(scope);
        metrics::increment_conflicts(scope.as_str(), strategy.as_str());

        let outcome = match strategy {
            MergeStrategy::Error => {
                return Err(SecretError::Conflict(format!(
                    "Conflicting contributions to '{}' at scope {scope}: {} and {}",
                    state.key,
                    state.history[0].describe(),
                    origin.describe()
                )));
            }
            MergeStrategy::Overwrite => {
                info!(
                    "Overwriting '{}' at scope {}: {} replaces {}",
                    state.key,
                    scope,
                    origin.describe(),
                    state.history[state.history.len() - 1].describe()
                );
                state.value = origin.value.clone();
                MergeOutcome::Overwritten
            }
            MergeStrategy::AutoMerge => {
                if let (Some(current), Some(incoming)) =
                    (state.value.as_object_mut(), origin.value.as_object())
                {
                    debug!("Auto-merging '{}' at scope {}", state.key, scope);
                    for (k, v) in incoming {
                        current.insert(k.clone(), v.clone());
                    }
                    MergeOutcome::Merged
                } else {
                    info!(
                        "Overwriting non-mapping value of '{}' at scope {} with {}",
                        state.key,
                        scope,
                        origin.describe()
                    );
                    state.value = origin.value.clone();
                    MergeOutcome::Overwritten
                }
            }
        };

        state.history.push(origin);
        Ok(outcome)
    }

    /// Offer contributions in order, stopping at the first conflict
    pub fn merge_all<I>(&mut self, origins: I) -> Result<()>
    where
        I: IntoIterator<Item = SecretOrigin>,
    {
        for origin in origins {
            self.merge(origin)?;
        }
        Ok(())
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.index.get(key).map(|&i| &self.entries[i].value)
    }

    /// Every contribution to `key`, in the order offered
    #[must_use]
    pub fn history(&self, key: &str) -> &[SecretOrigin] {
        self.index
            .get(key)
            .map_or(&[], |&i| self.entries[i].history.as_slice())
    }

    #[must_use]
    pub fn keys(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.key.as_str()).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolved values in first-seen key order
    #[must_use]
    pub fn into_merged(self) -> Vec<(String, Value)> {
        self.entries.into_iter().map(|e| (e.key, e.value)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn origin(key: &str, value: Value, stack: &str, manager: &str, provider: &str) -> SecretOrigin {
        SecretOrigin {
            key: key.to_string(),
            value,
            source: format!("{stack}/{manager}/{provider}"),
            provider_name: provider.to_string(),
            manager_name: manager.to_string(),
            stack_name: stack.to_string(),
            origin_path: None,
        }
    }

    #[test]
    fn test_intra_provider_mappings_auto_merge() {
        let mut engine = MergeEngine::default();
        let first = engine.merge(origin("k", json!({"a": 1}), "s", "m", "p")).unwrap();
        let second = engine.merge(origin("k", json!({"b": 2}), "s", "m", "p")).unwrap();
        assert_eq!(first, MergeOutcome::Recorded);
        assert_eq!(second, MergeOutcome::Merged);
        assert_eq!(engine.get("k"), Some(&json!({"a": 1, "b": 2})));
        assert_eq!(engine.history("k").len(), 2);
    }

    #[test]
    fn test_intra_provider_scalars_overwrite() {
        let mut engine = MergeEngine::default();
        engine.merge(origin("k", json!("x"), "s", "m", "p")).unwrap();
        let outcome = engine.merge(origin("k", json!("y"), "s", "m", "p")).unwrap();
        assert_eq!(outcome, MergeOutcome::Overwritten);
        assert_eq!(engine.get("k"), Some(&json!("y")));
    }

    #[test]
    fn test_cross_provider_default_is_conflict() {
        let mut engine = MergeEngine::default();
        engine.merge(origin("k", json!("x"), "s", "m", "p1")).unwrap();
        let err = engine
            .merge(origin("k", json!("y"), "s", "m", "p2"))
            .unwrap_err();
        assert!(matches!(err, SecretError::Conflict(_)));
        assert!(err.to_string().contains("crossProvider"));
        // the failed contribution is not recorded
        assert_eq!(engine.history("k").len(), 1);
        assert_eq!(engine.get("k"), Some(&json!("x")));
    }

    #[test]
    fn test_scope_ordering_prefers_widest_difference() {
        let first = origin("k", Value::Null, "s1", "m1", "p1");
        assert_eq!(
            conflict_scope(&first, &origin("k", Value::Null, "s2", "m1", "p1")),
            ConflictScope::CrossStack
        );
        assert_eq!(
            conflict_scope(&first, &origin("k", Value::Null, "s1", "m2", "p2")),
            ConflictScope::IntraStack
        );
        assert_eq!(
            conflict_scope(&first, &origin("k", Value::Null, "s1", "m1", "p2")),
            ConflictScope::CrossProvider
        );
        assert_eq!(
            conflict_scope(&first, &origin("k", Value::Null, "s1", "m1", "p1")),
            ConflictScope::IntraProvider
        );
    }

    #[test]
    fn test_scope_is_relative_to_first_contribution() {
        let mut strategies = ConflictStrategies::default();
        strategies.cross_provider = MergeStrategy::Overwrite;
        let mut engine = MergeEngine::new(ConflictOptions::new(strategies));

        engine.merge(origin("k", json!("a"), "s", "m", "p1")).unwrap();
        engine.merge(origin("k", json!("b"), "s", "m", "p2")).unwrap();
        // compared with p1 (crossProvider), not with the latest p2 contribution
        engine.merge(origin("k", json!("c"), "s", "m", "p2")).unwrap();
        assert_eq!(engine.get("k"), Some(&json!("c")));
    }

    #[test]
    fn test_insertion_order_is_deterministic() {
        let contributions = || {
            vec![
                origin("zeta", json!(1), "s", "m", "p"),
                origin("alpha", json!(2), "s", "m", "p"),
                origin("mid", json!(3), "s", "m", "p"),
            ]
        };
        let mut first = MergeEngine::default();
        first.merge_all(contributions()).unwrap();
        let mut second = MergeEngine::default();
        second.merge_all(contributions()).unwrap();

        assert_eq!(first.keys(), vec!["zeta", "alpha", "mid"]);
        assert_eq!(first.into_merged(), second.into_merged());
    }

    #[test]
    fn test_order_changes_which_contribution_wins() {
        let mut strategies = ConflictStrategies::default();
        strategies.cross_stack = MergeStrategy::Overwrite;

        let mut forward = MergeEngine::new(ConflictOptions::new(strategies));
        forward
            .merge_all([
                origin("k", json!("one"), "s1", "m", "p"),
                origin("k", json!("two"), "s2", "m", "p"),
            ])
            .unwrap();
        let mut backward = MergeEngine::new(ConflictOptions::new(strategies));
        backward
            .merge_all([
                origin("k", json!("two"), "s2", "m", "p"),
                origin("k", json!("one"), "s1", "m", "p"),
            ])
            .unwrap();

        assert_eq!(forward.get("k"), Some(&json!("two")));
        assert_eq!(backward.get("k"), Some(&json!("one")));
        assert_eq!(forward.history("k")[0].stack_name, "s1");
    }

    #[test]
    fn test_strict_rejects_even_intra_provider() {
        let mut engine = MergeEngine::new(ConflictOptions::strict());
        engine.merge(origin("k", json!({"a": 1}), "s", "m", "p")).unwrap();
        assert!(engine.merge(origin("k", json!({"b": 2}), "s", "m", "p")).is_err());
    }
}

//! # Secret Manager Engine
//!
//! Drives the secret pipeline over every configured manager:
//!
//! 1. **collect**: gather managers (a single manager becomes the `default` entry)
//! 2. **inject_secrets_to_providers**: hand each manager's definitions to its providers
//! 3. **validate**: load and read every declared secret
//! 4. **prepare_effects**: turn values into effects, merge by destination
//! 5. **apply**: push `kubectl` effects to the cluster (or print them masked)
//!
//! Every stage runs sequentially in registration order and stops at the first error.

pub mod apply;

pub use apply::{ClusterApplier, KubeApiApplier, KubectlApplier};

use crate::connector::{Connector, SecretValue};
use crate::effect::{EffectKind, PreparedEffect};
use crate::error::{Result, SecretError};
use crate::manager::{SecretManager, SecretRegistry, DEFAULT_MANAGER_NAME};
use crate::merge::{ConflictOptions, MergeEngine, MergeOutcome, SecretOrigin};
use crate::observability::metrics;
use crate::provider::Provider;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Where the engine finds its managers
#[derive(Debug, Clone, Default)]
pub struct SecretSource {
    pub manager: Option<Arc<SecretManager>>,
    pub registry: Option<SecretRegistry>,
}

impl SecretSource {
    #[must_use]
    pub fn manager(manager: SecretManager) -> Self {
        Self {
            manager: Some(Arc::new(manager)),
            registry: None,
        }
    }

    #[must_use]
    pub fn registry(registry: SecretRegistry) -> Self {
        Self {
            manager: None,
            registry: Some(registry),
        }
    }
}

/// One collected manager with the identity used for conflict scopes
#[derive(Debug, Clone)]
pub struct ManagerEntry {
    pub name: String,
    pub stack: String,
    pub manager: Arc<SecretManager>,
}

/// A secret value resolved during one pass; never logged
struct ResolvedSecret {
    entry: usize,
    name: String,
    value: SecretValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Load and read every secret
    Validate,
    /// Prepare effects without applying them
    Plan,
    Apply { dry_run: bool },
}

#[derive(Debug, Default)]
pub struct ApplyReport {
    pub applied: usize,
    /// Custom effects, which never reach the cluster
    pub skipped: usize,
    pub dry_run: bool,
}

#[derive(Debug, Default)]
pub struct RunSummary {
    pub managers: usize,
    pub secrets: usize,
    pub effects: Vec<PreparedEffect>,
    pub apply: Option<ApplyReport>,
}

pub struct SecretManagerEngine {
    source: SecretSource,
    conflict: ConflictOptions,
    applier: Option<Arc<dyn ClusterApplier>>,
}

impl fmt::Debug for SecretManagerEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretManagerEngine")
            .field("source", &self.source)
            .field("conflict", &self.conflict)
            .field("applier", &self.applier)
            .finish()
    }
}

impl SecretManagerEngine {
    #[must_use]
    pub fn new(source: SecretSource) -> Self {
        Self {
            source,
            conflict: ConflictOptions::default(),
            applier: None,
        }
    }

    #[must_use]
    pub fn with_conflict_options(mut self, conflict: ConflictOptions) -> Self {
        self.conflict = conflict;
        self
    }

    #[must_use]
    pub fn with_applier(mut self, applier: Arc<dyn ClusterApplier>) -> Self {
        self.applier = Some(applier);
        self
    }

    #[must_use]
    pub fn conflict_options(&self) -> &ConflictOptions {
        &self.conflict
    }

    /// Gather every manager in scope
    pub fn collect(&self) -> Result<Vec<ManagerEntry>> {
        match (&self.source.manager, &self.source.registry) {
            (Some(manager), None) => Ok(vec![ManagerEntry {
                name: DEFAULT_MANAGER_NAME.to_string(),
                stack: DEFAULT_MANAGER_NAME.to_string(),
                manager: Arc::clone(manager),
            }]),
            (None, Some(registry)) => {
                if registry.is_empty() {
                    return Err(SecretError::Configuration(
                        "The secret registry has no managers".to_string(),
                    ));
                }
                Ok(registry
                    .list()
                    .iter()
                    .map(|entry| ManagerEntry {
                        name: entry.name.clone(),
                        stack: entry.stack.clone(),
                        manager: Arc::clone(&entry.manager),
                    })
                    .collect())
            }
            (Some(_), Some(_)) => Err(SecretError::Configuration(
                "Both a secret manager and a secret registry are configured; use one".to_string(),
            )),
            (None, None) => Err(SecretError::Configuration(
                "No secret manager or secret registry is configured".to_string(),
            )),
        }
    }

    /// Push each manager's definitions into its providers
    pub fn inject_secrets_to_providers(&self) -> Result<()> {
        for entry in self.collect()? {
            let definitions = entry.manager.secret_map();
            for (provider_id, provider) in entry.manager.providers() {
                debug!(
                    "Injecting {} secret definitions into provider {} of manager {}",
                    definitions.len(),
                    provider_id,
                    entry.name
                );
                provider.inject_secrets(&definitions);
            }
        }
        Ok(())
    }

    /// Load and read every declared secret; returns the number of secrets checked
    pub async fn validate(&self) -> Result<usize> {
        let started = Instant::now();
        let result = self.resolve_pass("validate").await;
        finish_stage("validate", started, &result);
        let (_, resolved) = result?;
        info!("Validated {} secrets", resolved.len());
        Ok(resolved.len())
    }

    /// Resolve every secret again and turn it into merged effects
    pub async fn prepare_effects(&self) -> Result<Vec<PreparedEffect>> {
        let started = Instant::now();
        let result = self.prepare_pass().await;
        finish_stage("prepare", started, &result);
        result
    }

    async fn prepare_pass(&self) -> Result<Vec<PreparedEffect>> {
        let (entries, resolved) = self.resolve_pass("prepare").await?;

        // provider groups in first-seen order
        let mut groups: Vec<ProviderGroup> = Vec::new();
        let mut group_index: HashMap<(usize, String), usize> = HashMap::new();

        for secret in resolved {
            let entry = &entries[secret.entry];
            let resolved_provider = entry.manager.resolve_provider_for(&secret.name)?;
            let mut effects = resolved_provider
                .provider
                .prepare(&secret.name, &secret.value)
                .await?;
            for effect in &mut effects {
                effect.provider_name.clone_from(&resolved_provider.provider_id);
            }
            metrics::increment_effects_prepared(&resolved_provider.provider_id, effects.len());
            debug!(
                "Provider {} prepared {} effects for secret {}",
                resolved_provider.provider_id,
                effects.len(),
                secret.name
            );

            let key = (secret.entry, resolved_provider.provider_id.clone());
            let index = *group_index.entry(key).or_insert_with(|| {
                groups.push(ProviderGroup {
                    entry: secret.entry,
                    provider_id: resolved_provider.provider_id.clone(),
                    provider: Arc::clone(&resolved_provider.provider),
                    effects: Vec::new(),
                });
                groups.len() - 1
            });
            groups[index].effects.extend(effects);
        }

        let mut engine = MergeEngine::new(self.conflict);
        let mut merged: Vec<PreparedEffect> = Vec::new();
        let mut by_destination: HashMap<String, usize> = HashMap::new();

        for group in groups {
            let entry = &entries[group.entry];
            let effects = group.provider.merge_secrets(group.effects)?;
            for effect in effects {
                let Some(destination) = group.provider.get_effect_identifier(&effect) else {
                    merged.push(effect);
                    continue;
                };
                let origin = SecretOrigin {
                    key: destination.clone(),
                    value: effect.data().map_or(Value::Null, |d| Value::Object(d.clone())),
                    source: effect.secret_name.clone(),
                    provider_name: group.provider_id.clone(),
                    manager_name: entry.name.clone(),
                    stack_name: entry.stack.clone(),
                    origin_path: Some("data".to_string()),
                };

                match engine.merge(origin)? {
                    MergeOutcome::Recorded => {
                        by_destination.insert(destination, merged.len());
                        merged.push(effect);
                    }
                    MergeOutcome::Overwritten => {
                        if let Some(&index) = by_destination.get(&destination) {
                            merged[index] = effect;
                        }
                    }
                    MergeOutcome::Merged => {
                        if let (Some(&index), Some(value)) =
                            (by_destination.get(&destination), engine.get(&destination))
                        {
                            if let (Some(data), Some(resolved)) =
                                (merged[index].data_mut(), value.as_object())
                            {
                                data.clone_from(resolved);
                            }
                        }
                    }
                }
            }
        }

        info!("Prepared {} effects", merged.len());
        Ok(merged)
    }

    /// Resolve connector values for every declared secret
    ///
    /// Each distinct (connector, secret) pair is loaded once per pass.
    async fn resolve_pass(&self, stage: &str) -> Result<(Vec<ManagerEntry>, Vec<ResolvedSecret>)> {
        let entries = self.collect()?;
        let mut seen: HashSet<(usize, String)> = HashSet::new();
        let mut resolved = Vec::new();

        for (index, entry) in entries.iter().enumerate() {
            for definition in entry.manager.secrets() {
                let connector = entry.manager.resolve_connector(definition.connector.as_deref())?;
                let identity = (connector_identity(&connector), definition.name.clone());
                if seen.insert(identity) {
                    debug!("[{}] Loading secret {} for manager {}", stage, definition.name, entry.name);
                    connector.load(std::slice::from_ref(&definition.name)).await?;
                    metrics::increment_secrets_loaded(
                        definition.connector.as_deref().unwrap_or("default"),
                    );
                }
                let value = connector.get(&definition.name)?;
                resolved.push(ResolvedSecret {
                    entry: index,
                    name: definition.name.clone(),
                    value,
                });
            }
        }
        Ok((entries, resolved))
    }

    /// Apply effects one at a time, stopping at the first failure
    pub async fn apply(&self, effects: &[PreparedEffect], dry_run: bool) -> Result<ApplyReport> {
        let started = Instant::now();
        let result = self.apply_effects(effects, dry_run).await;
        finish_stage("apply", started, &result);
        result
    }

    async fn apply_effects(&self, effects: &[PreparedEffect], dry_run: bool) -> Result<ApplyReport> {
        let mut report = ApplyReport {
            dry_run,
            ..ApplyReport::default()
        };

        let applier = match (&self.applier, dry_run) {
            (_, true) => None,
            (Some(applier), false) => Some(applier),
            (None, false) => {
                return Err(SecretError::Configuration(
                    "No cluster applier configured; use dry-run or configure kubectl".to_string(),
                ));
            }
        };

        for effect in effects {
            if effect.kind == EffectKind::Custom {
                debug!(
                    "Skipping custom effect of provider {} for secret {}",
                    effect.provider_name, effect.secret_name
                );
                report.skipped += 1;
                continue;
            }

            match applier {
                None => {
                    let masked = serde_json::to_string_pretty(&effect.masked_payload())
                        .unwrap_or_else(|_| "<unserializable>".to_string());
                    info!(
                        "[dry-run] Would apply effect of provider {} for secret {}:\n{}",
                        effect.provider_name, effect.secret_name, masked
                    );
                }
                Some(applier) => {
                    if let Err(e) = applier.apply(&effect.payload).await {
                        warn!(
                            "Apply failed for secret {} after {} applied effects; remaining effects skipped",
                            effect.secret_name, report.applied
                        );
                        return Err(e);
                    }
                }
            }
            metrics::increment_effects_applied(&effect.kind.to_string(), dry_run);
            report.applied += 1;
        }

        info!(
            "Applied {} effects ({} custom skipped, dry_run={})",
            report.applied, report.skipped, dry_run
        );
        Ok(report)
    }

    /// Run the pipeline up to the stage `mode` asks for
    pub async fn run(&self, mode: RunMode) -> Result<RunSummary> {
        let entries = self.collect()?;
        let mut summary = RunSummary {
            managers: entries.len(),
            ..RunSummary::default()
        };
        info!("Running secret pipeline over {} managers ({:?})", entries.len(), mode);

        self.inject_secrets_to_providers()?;
        summary.secrets = self.validate().await?;
        if mode == RunMode::Validate {
            return Ok(summary);
        }

        summary.effects = self.prepare_effects().await?;
        if let RunMode::Apply { dry_run } = mode {
            summary.apply = Some(self.apply(&summary.effects, dry_run).await?);
        }
        Ok(summary)
    }
}

struct ProviderGroup {
    entry: usize,
    provider_id: String,
    provider: Arc<dyn Provider>,
    effects: Vec<PreparedEffect>,
}

fn connector_identity(connector: &Arc<dyn Connector>) -> usize {
    Arc::as_ptr(connector).cast::<()>() as usize
}

fn finish_stage<T>(stage: &str, started: Instant, result: &Result<T>) {
    metrics::observe_stage_duration(stage, started.elapsed().as_secs_f64());
    if let Err(e) = result {
        metrics::increment_stage_errors(stage, e.kind());
    }
}

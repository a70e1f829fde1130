//! # Metrics
//!
//! Prometheus metrics for the secret pipeline.
//!
//! ## Metrics Exposed
//!
//! - `stack_secrets_secrets_loaded_total` - Secrets loaded through connectors, by connector
//! - `stack_secrets_effects_prepared_total` - Effects produced by providers, by provider
//! - `stack_secrets_effects_applied_total` - Effects applied to the cluster, by effect kind
//! - `stack_secrets_conflicts_total` - Merge conflicts, by scope and outcome
//! - `stack_secrets_stage_duration_seconds` - Duration of each pipeline stage
//! - `stack_secrets_stage_errors_total` - Failed pipeline stages

use anyhow::Result;
use prometheus::{Encoder, HistogramVec, IntCounterVec, Registry, TextEncoder};
use std::sync::LazyLock;

pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static SECRETS_LOADED_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "stack_secrets_secrets_loaded_total",
            "Total number of secrets loaded through connectors",
        ),
        &["connector"],
    )
    .expect("Failed to create SECRETS_LOADED_TOTAL metric - this should never happen")
});

static EFFECTS_PREPARED_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "stack_secrets_effects_prepared_total",
            "Total number of effects produced by providers",
        ),
        &["provider"],
    )
    .expect("Failed to create EFFECTS_PREPARED_TOTAL metric - this should never happen")
});

static EFFECTS_APPLIED_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "stack_secrets_effects_applied_total",
            "Total number of effects applied",
        ),
        &["kind", "dry_run"],
    )
    .expect("Failed to create EFFECTS_APPLIED_TOTAL metric - this should never happen")
});

static CONFLICTS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "stack_secrets_conflicts_total",
            "Total number of merge conflicts by scope and resolution",
        ),
        &["scope", "outcome"],
    )
    .expect("Failed to create CONFLICTS_TOTAL metric - this should never happen")
});

static STAGE_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        prometheus::HistogramOpts::new(
            "stack_secrets_stage_duration_seconds",
            "Duration of pipeline stages in seconds",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0]),
        &["stage"],
    )
    .expect("Failed to create STAGE_DURATION metric - this should never happen")
});

static STAGE_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "stack_secrets_stage_errors_total",
            "Total number of failed pipeline stages by error kind",
        ),
        &["stage", "kind"],
    )
    .expect("Failed to create STAGE_ERRORS_TOTAL metric - this should never happen")
});

/// Register all metrics with the crate registry
///
/// Fails when called twice (prometheus rejects duplicate collectors).
#[allow(
    clippy::missing_errors_doc,
    reason = "Error documentation is provided in doc comments"
)]
pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(SECRETS_LOADED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(EFFECTS_PREPARED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(EFFECTS_APPLIED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(CONFLICTS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(STAGE_DURATION.clone()))?;
    REGISTRY.register(Box::new(STAGE_ERRORS_TOTAL.clone()))?;
    Ok(())
}

pub fn increment_secrets_loaded(connector: &str) {
    SECRETS_LOADED_TOTAL.with_label_values(&[connector]).inc();
}

pub fn increment_effects_prepared(provider: &str, count: usize) {
    EFFECTS_PREPARED_TOTAL
        .with_label_values(&[provider])
        .inc_by(count as u64);
}

pub fn increment_effects_applied(kind: &str, dry_run: bool) {
    let dry_run = if dry_run { "true" } else { "false" };
    EFFECTS_APPLIED_TOTAL.with_label_values(&[kind, dry_run]).inc();
}

pub fn increment_conflicts(scope: &str, outcome: &str) {
    CONFLICTS_TOTAL.with_label_values(&[scope, outcome]).inc();
}

pub fn observe_stage_duration(stage: &str, duration: f64) {
    STAGE_DURATION.with_label_values(&[stage]).observe(duration);
}

pub fn increment_stage_errors(stage: &str, kind: &str) {
    STAGE_ERRORS_TOTAL.with_label_values(&[stage, kind]).inc();
}

/// Text exposition of everything registered so far
#[allow(
    clippy::missing_errors_doc,
    reason = "Error documentation is provided in doc comments"
)]
pub fn gather_text() -> Result<String> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&REGISTRY.gather(), &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

//! End-to-end runs of the secret pipeline: collect, validate, prepare and apply

mod common;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use common::{opaque, opaque_manager, CountingConnector};
use serde_json::{json, Value};
use stack_secrets::connector::{Connector, EnvConnector};
use stack_secrets::manager::{SecretDefinition, SecretManager, SecretRegistry};
use stack_secrets::merge::{ConflictOptions, ConflictScope, MergeStrategy};
use stack_secrets::orchestrator::{ClusterApplier, RunMode, SecretManagerEngine, SecretSource};
use stack_secrets::provider::{BasicAuthSecretProvider, KubernetesSecretTarget};
use stack_secrets::{EffectKind, SecretError};
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
struct RecordingApplier {
    applied: Mutex<Vec<Value>>,
}

#[async_trait]
impl ClusterApplier for RecordingApplier {
    async fn apply(&self, manifest: &Value) -> stack_secrets::Result<()> {
        self.applied.lock().unwrap().push(manifest.clone());
        Ok(())
    }
}

fn shared_connector_registry(connector: &Arc<CountingConnector>) -> SecretRegistry {
    let mut registry = SecretRegistry::new();
    for (name, target) in [("api", "api-secret"), ("worker", "worker-secret")] {
        let mut manager = SecretManager::named(name);
        manager
            .add_connector_arc("shared", Arc::clone(connector) as Arc<dyn Connector>)
            .unwrap()
            .add_provider("opaque", opaque(target))
            .unwrap()
            .set_default_connector("shared")
            .unwrap()
            .set_default_provider("opaque")
            .unwrap()
            .add_secret(SecretDefinition::new("API_KEY"))
            .unwrap();
        registry.add(name, manager).unwrap();
    }
    registry
}

#[tokio::test]
async fn test_validate_loads_each_distinct_secret_once() {
    let connector = Arc::new(CountingConnector::new(&[("API_KEY", json!("k-1"))]));
    let engine = SecretManagerEngine::new(SecretSource::registry(shared_connector_registry(
        &connector,
    )));

    let checked = engine.validate().await.unwrap();
    assert_eq!(checked, 2);
    assert_eq!(connector.loads("API_KEY"), 1);
}

#[tokio::test]
async fn test_each_pass_loads_once_more() {
    let connector = Arc::new(CountingConnector::new(&[("API_KEY", json!("k-1"))]));
    let engine = SecretManagerEngine::new(SecretSource::registry(shared_connector_registry(
        &connector,
    )));

    let summary = engine.run(RunMode::Plan).await.unwrap();
    assert_eq!(summary.effects.len(), 2);
    assert_eq!(connector.total_loads(), 2);
}

#[tokio::test]
async fn test_validate_and_prepare_see_the_same_value() {
    let connector = Arc::new(CountingConnector::new(&[("API_KEY", json!("s3cr3t"))]));
    let mut manager = SecretManager::new();
    manager
        .add_connector_arc("c", Arc::clone(&connector) as Arc<dyn Connector>)
        .unwrap()
        .add_provider("opaque", opaque("app"))
        .unwrap()
        .set_default_connector("c")
        .unwrap()
        .set_default_provider("opaque")
        .unwrap()
        .add_secret(SecretDefinition::new("API_KEY"))
        .unwrap();
    let engine = SecretManagerEngine::new(SecretSource::manager(manager));

    engine.validate().await.unwrap();
    let validated = connector.get("API_KEY").unwrap();
    let effects = engine.prepare_effects().await.unwrap();
    let prepared = effects[0].data().unwrap()["API_KEY"].as_str().unwrap().to_string();

    assert_eq!(validated, json!("s3cr3t"));
    assert_eq!(STANDARD.decode(prepared).unwrap(), b"s3cr3t");
}

fn env_manager(prefix: &str) -> SecretManager {
    let mut manager = SecretManager::new();
    manager
        .add_connector("env", EnvConnector::new().with_prefix(prefix))
        .unwrap()
        .add_provider("app", opaque("app-secret"))
        .unwrap()
        .set_default_connector("env")
        .unwrap()
        .set_default_provider("app")
        .unwrap()
        .add_secret(SecretDefinition::new("API_KEY"))
        .unwrap();
    manager
}

#[tokio::test]
async fn test_env_backed_api_key_validates_when_present() {
    std::env::set_var("PIPELINE_T1_API_KEY", "from-env");
    let engine = SecretManagerEngine::new(SecretSource::manager(env_manager("PIPELINE_T1_")));
    assert_eq!(engine.validate().await.unwrap(), 1);
}

#[tokio::test]
async fn test_env_backed_api_key_missing_is_load_error() {
    let engine = SecretManagerEngine::new(SecretSource::manager(env_manager("PIPELINE_T2_")));
    let err = engine.validate().await.unwrap_err();
    assert!(matches!(err, SecretError::Load(_)));
    assert!(err.to_string().contains("PIPELINE_T2_API_KEY"));
}

fn shared_secret_registry() -> SecretRegistry {
    let mut registry = SecretRegistry::new();
    registry
        .add("team-a", opaque_manager("team-a", "shared", &[("A_TOKEN", "a")]))
        .unwrap()
        .add("team-b", opaque_manager("team-b", "shared", &[("B_TOKEN", "b")]))
        .unwrap();
    registry
}

#[tokio::test]
async fn test_registry_shared_secret_conflicts_across_stacks_by_default() {
    let engine = SecretManagerEngine::new(SecretSource::registry(shared_secret_registry()));
    let err = engine.prepare_effects().await.unwrap_err();
    assert!(matches!(err, SecretError::Conflict(_)));
    assert!(err.to_string().contains("default/shared"));
    assert!(err.to_string().contains("crossStack"));

    let err = engine
        .run(RunMode::Apply { dry_run: true })
        .await
        .unwrap_err();
    assert!(matches!(err, SecretError::Conflict(_)));
}

#[tokio::test]
async fn test_registry_shared_secret_overwrite_keeps_later_manager() {
    let mut options = ConflictOptions::default();
    options
        .set_strategy(ConflictScope::CrossStack, MergeStrategy::Overwrite)
        .unwrap();
    let applier = Arc::new(RecordingApplier::default());
    let engine = SecretManagerEngine::new(SecretSource::registry(shared_secret_registry()))
        .with_conflict_options(options)
        .with_applier(Arc::clone(&applier) as Arc<dyn ClusterApplier>);

    let summary = engine.run(RunMode::Apply { dry_run: false }).await.unwrap();
    assert_eq!(summary.effects.len(), 1);
    let data = summary.effects[0].data().unwrap();
    assert!(data.contains_key("B_TOKEN"));
    assert!(!data.contains_key("A_TOKEN"));

    let applied = applier.applied.lock().unwrap();
    assert_eq!(applied.len(), 1);
    assert_eq!(applied[0]["metadata"]["name"], "shared");
}

#[tokio::test]
async fn test_same_stack_managers_collide_at_intra_stack() {
    let mut registry = SecretRegistry::new();
    registry
        .add_to_stack("platform", "a", opaque_manager("a", "shared", &[("A", "1")]))
        .unwrap()
        .add_to_stack("platform", "b", opaque_manager("b", "shared", &[("B", "2")]))
        .unwrap();

    let err = SecretManagerEngine::new(SecretSource::registry(registry.clone()))
        .prepare_effects()
        .await
        .unwrap_err();
    assert!(err.to_string().contains("intraStack"));

    let mut options = ConflictOptions::default();
    options
        .set_strategy(ConflictScope::IntraStack, MergeStrategy::AutoMerge)
        .unwrap();
    let effects = SecretManagerEngine::new(SecretSource::registry(registry))
        .with_conflict_options(options)
        .prepare_effects()
        .await
        .unwrap();
    assert_eq!(effects.len(), 1);
    let data = effects[0].data().unwrap();
    assert!(data.contains_key("A") && data.contains_key("B"));
}

#[tokio::test]
async fn test_provider_local_merge_unions_one_destination() {
    let manager = opaque_manager("m", "app", &[("ONE", "1"), ("TWO", "2"), ("THREE", "3")]);
    let effects = SecretManagerEngine::new(SecretSource::manager(manager))
        .prepare_effects()
        .await
        .unwrap();

    assert_eq!(effects.len(), 1);
    assert_eq!(effects[0].kind, EffectKind::Kubectl);
    assert_eq!(effects[0].provider_name, "opaque");
    let mut keys: Vec<&String> = effects[0].data().unwrap().keys().collect();
    keys.sort();
    assert_eq!(keys, vec!["ONE", "THREE", "TWO"]);
}

#[tokio::test]
async fn test_wrong_value_shape_is_validation_error() {
    let mut manager = SecretManager::new();
    manager
        .add_connector(
            "mem",
            stack_secrets::connector::InMemoryConnector::from_pairs([("DB", json!("not-an-object"))]),
        )
        .unwrap()
        .add_provider(
            "db",
            BasicAuthSecretProvider::new(KubernetesSecretTarget::new("db", "default")),
        )
        .unwrap()
        .set_default_connector("mem")
        .unwrap()
        .set_default_provider("db")
        .unwrap()
        .add_secret(SecretDefinition::new("DB"))
        .unwrap();

    let engine = SecretManagerEngine::new(SecretSource::manager(manager));
    // validate only checks the secret can be read
    engine.validate().await.unwrap();
    let err = engine.prepare_effects().await.unwrap_err();
    assert!(matches!(err, SecretError::Validation(_)));
}

#[tokio::test]
async fn test_dry_run_applies_nothing() {
    let applier = Arc::new(RecordingApplier::default());
    let engine = SecretManagerEngine::new(SecretSource::manager(opaque_manager(
        "m",
        "app",
        &[("A", "1")],
    )))
    .with_applier(Arc::clone(&applier) as Arc<dyn ClusterApplier>);

    let summary = engine.run(RunMode::Apply { dry_run: true }).await.unwrap();
    let report = summary.apply.unwrap();
    assert!(report.dry_run);
    assert_eq!(report.applied, 1);
    assert!(applier.applied.lock().unwrap().is_empty());
}

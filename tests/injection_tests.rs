//! Declaring injections on a stack and rendering its manifests

mod common;

use common::{deployment, opaque_manager, service};
use serde_json::json;
use stack_secrets::manager::{SecretDefinition, SecretManager};
use stack_secrets::provider::{
    BasicAuthSecretProvider, DockerConfigSecretProvider, KubernetesSecretTarget,
};
use stack_secrets::{InjectionStrategy, SecretError, Stack};
use std::sync::Arc;

fn app_manager() -> Arc<SecretManager> {
    Arc::new(opaque_manager("default", "app-secret", &[("API_KEY", "k"), ("TOKEN", "t")]))
}

fn web_stack() -> Stack {
    let mut stack = Stack::new("web");
    stack
        .add_resource("web", deployment("web"))
        .unwrap()
        .add_resource("web-svc", service("web"))
        .unwrap();
    stack
}

#[test]
fn test_missing_strategy_fails_resolution() {
    let mut stack = web_stack();
    let err = stack
        .use_secrets(&app_manager(), |ctx| {
            ctx.secrets("API_KEY")?;
            Ok(())
        })
        .unwrap_err();
    assert!(matches!(err, SecretError::InjectionResolution(_)));
    assert!(err.to_string().contains("inject()"));
}

#[test]
fn test_single_matching_resource_is_inferred() {
    let mut stack = web_stack();
    stack
        .use_secrets(&app_manager(), |ctx| {
            ctx.secrets("API_KEY")?.inject(InjectionStrategy::env())?;
            Ok(())
        })
        .unwrap();

    assert_eq!(stack.injections().len(), 1);
    assert_eq!(stack.injections()[0].resource_id, "web");
    assert_eq!(
        stack.injections()[0].path,
        "spec.template.spec.containers[0].env"
    );
}

#[test]
fn test_inference_fails_without_match() {
    let mut stack = Stack::new("svc-only");
    stack.add_resource("svc", service("svc")).unwrap();
    let err = stack
        .use_secrets(&app_manager(), |ctx| {
            ctx.secrets("API_KEY")?.inject(InjectionStrategy::env())?;
            Ok(())
        })
        .unwrap_err();
    assert!(err.to_string().contains("no resource of kind 'Deployment'"));
}

#[test]
fn test_inference_fails_with_several_matches() {
    let mut stack = web_stack();
    stack.add_resource("worker", deployment("worker")).unwrap();

    let err = stack
        .use_secrets(&app_manager(), |ctx| {
            ctx.secrets("API_KEY")?.inject(InjectionStrategy::env())?;
            Ok(())
        })
        .unwrap_err();
    assert!(matches!(err, SecretError::InjectionResolution(_)));
    assert!(err.to_string().contains("into_resource()"));

    stack
        .use_secrets(&app_manager(), |ctx| {
            ctx.secrets("API_KEY")?
                .inject(InjectionStrategy::env())?
                .into_resource("worker");
            Ok(())
        })
        .unwrap();
    assert_eq!(stack.injections()[0].resource_id, "worker");
}

#[test]
fn test_context_default_resource_applies_to_all_builders() {
    let mut stack = web_stack();
    stack.add_resource("worker", deployment("worker")).unwrap();
    stack
        .use_secrets(&app_manager(), |ctx| {
            ctx.set_default_resource_id("worker");
            ctx.secrets("API_KEY")?.inject(InjectionStrategy::env())?;
            ctx.secrets("TOKEN")?
                .inject(InjectionStrategy::env())?
                .into_resource("web");
            Ok(())
        })
        .unwrap();

    let targets: Vec<&str> = stack
        .injections()
        .iter()
        .map(|i| i.resource_id.as_str())
        .collect();
    assert_eq!(targets, vec!["worker", "web"]);
}

#[test]
fn test_unknown_explicit_resource_fails() {
    let mut stack = web_stack();
    let err = stack
        .use_secrets(&app_manager(), |ctx| {
            ctx.secrets("API_KEY")?
                .inject(InjectionStrategy::env())?
                .into_resource("missing");
            Ok(())
        })
        .unwrap_err();
    assert!(err.to_string().contains("'missing'"));
}

#[test]
fn test_unsupported_strategy_rejected_at_inject() {
    let mut stack = web_stack();
    let err = stack
        .use_secrets(&app_manager(), |ctx| {
            ctx.secrets("API_KEY")?
                .inject(InjectionStrategy::image_pull_secret())?;
            Ok(())
        })
        .unwrap_err();
    assert!(err.to_string().contains("does not support strategy"));
}

#[test]
fn test_second_inject_on_one_builder_fails() {
    let mut stack = web_stack();
    let err = stack
        .use_secrets(&app_manager(), |ctx| {
            ctx.secrets("API_KEY")?
                .inject(InjectionStrategy::env())?
                .inject(InjectionStrategy::env_from(None))?;
            Ok(())
        })
        .unwrap_err();
    assert!(err.to_string().contains("already has strategy"));
}

#[test]
fn test_undeclared_secret_fails_in_context() {
    let mut stack = web_stack();
    let err = stack
        .use_secrets(&app_manager(), |ctx| {
            ctx.secrets("NOT_DECLARED")?;
            Ok(())
        })
        .unwrap_err();
    assert!(matches!(err, SecretError::Resolution(_)));
}

#[test]
fn test_build_renders_env_and_volume() {
    let mut stack = web_stack();
    stack
        .use_secrets(&app_manager(), |ctx| {
            ctx.secrets("API_KEY")?
                .inject(InjectionStrategy::env())?
                .for_name("APP_KEY");
            ctx.secrets("TOKEN")?
                .inject(InjectionStrategy::volume("/etc/app"))?;
            Ok(())
        })
        .unwrap();

    let manifests = stack.build().unwrap();
    let pod = &manifests["web"]["spec"]["template"]["spec"];
    assert_eq!(
        pod["containers"][0]["env"],
        json!([{
            "name": "APP_KEY",
            "valueFrom": { "secretKeyRef": { "name": "app-secret", "key": "API_KEY" } }
        }])
    );
    assert_eq!(pod["containers"][0]["volumeMounts"][0]["mountPath"], "/etc/app");
    assert_eq!(pod["volumes"][0]["secret"]["secretName"], "app-secret");
    // untouched resources pass through
    assert_eq!(manifests["web-svc"], service("web"));
}

#[test]
fn test_env_keys_of_structured_provider() {
    let mut manager = SecretManager::new();
    manager
        .add_provider(
            "db",
            BasicAuthSecretProvider::new(KubernetesSecretTarget::new("db-auth", "default")),
        )
        .unwrap()
        .add_secret(SecretDefinition::new("DB").with_provider("db"))
        .unwrap();
    let manager = Arc::new(manager);

    let mut stack = web_stack();
    let err = stack
        .use_secrets(&manager, |ctx| {
            ctx.secrets("DB")?.inject(InjectionStrategy::env())?;
            Ok(())
        })
        .unwrap_err();
    assert!(err.to_string().contains("requires an env key"));

    stack
        .use_secrets(&manager, |ctx| {
            ctx.secrets("DB")?
                .inject(InjectionStrategy::env_key("password"))?
                .for_name("DB_PASSWORD");
            Ok(())
        })
        .unwrap();
    let manifests = stack.build().unwrap();
    let env = &manifests["web"]["spec"]["template"]["spec"]["containers"][0]["env"][0];
    assert_eq!(env["valueFrom"]["secretKeyRef"]["key"], "password");
}

#[test]
fn test_image_pull_secret_reference() {
    let mut manager = SecretManager::new();
    manager
        .add_provider(
            "registry",
            DockerConfigSecretProvider::new(KubernetesSecretTarget::new("regcred", "default")),
        )
        .unwrap()
        .add_secret(SecretDefinition::new("REGISTRY").with_provider("registry"))
        .unwrap();

    let mut stack = web_stack();
    stack
        .use_secrets(&Arc::new(manager), |ctx| {
            ctx.secrets("REGISTRY")?
                .inject(InjectionStrategy::image_pull_secret())?;
            Ok(())
        })
        .unwrap();

    let manifests = stack.build().unwrap();
    assert_eq!(
        manifests["web"]["spec"]["template"]["spec"]["imagePullSecrets"],
        json!([{ "name": "regcred" }])
    );
}

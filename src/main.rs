//! # secretctl
//!
//! Command-line driver for the secret pipeline.
//!
//! ```bash
//! # Load every declared secret and check it can be read
//! secretctl --config secrets.yaml validate
//!
//! # Show the effects that would be applied (secret values masked)
//! secretctl plan
//!
//! # Apply through kubectl, or log what would happen
//! secretctl apply
//! secretctl apply --dry-run
//!
//! # Render stack manifests with secret references injected
//! secretctl render
//!
//! # Print the project file JSON schema
//! secretctl schema
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use stack_secrets::config::{BuiltProject, ProjectConfig};
use stack_secrets::observability::metrics;
use stack_secrets::orchestrator::{KubeApiApplier, KubectlApplier, RunMode, SecretManagerEngine};
use stack_secrets::ConflictScope;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "secretctl")]
#[command(
    about = "Secret orchestration and injection for Kubernetes manifests",
    version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("BUILD_GIT_HASH"), ")"),
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Project file
    #[arg(short, long, global = true, default_value = "secrets.yaml")]
    config: PathBuf,

    /// Print Prometheus metrics for the run on exit
    #[arg(long, global = true)]
    metrics: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Load and read every declared secret
    Validate,
    /// Prepare effects and print them with secret values masked
    Plan,
    /// Prepare effects and apply them to the cluster
    Apply {
        /// Log the effects instead of applying them
        #[arg(long)]
        dry_run: bool,

        /// kubectl binary
        #[arg(long, default_value = "kubectl")]
        kubectl: PathBuf,

        /// kubectl context
        #[arg(long)]
        context: Option<String>,

        /// Use kubectl server-side apply
        #[arg(long)]
        server_side: bool,

        /// Apply through the Kubernetes API instead of kubectl
        #[arg(long, conflicts_with_all = ["kubectl", "context", "server_side"])]
        api: bool,
    },
    /// Render stack manifests with injections applied
    Render,
    /// Print the JSON schema of the project file
    Schema,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Must run before any kube client is created
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "secretctl=info,stack_secrets=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if cli.metrics {
        metrics::register_metrics()?;
    }

    let result = run(&cli).await;

    if cli.metrics {
        eprintln!("{}", metrics::gather_text()?);
    }
    result
}

fn load_project(path: &Path) -> Result<(ProjectConfig, BuiltProject)> {
    let project = ProjectConfig::load(path)
        .with_context(|| format!("Failed to load project file {}", path.display()))?;
    let built = project.build().context("Invalid project configuration")?;
    Ok((project, built))
}

async fn run(cli: &Cli) -> Result<()> {
    match &cli.command {
        Commands::Schema => {
            let schema = serde_json::to_string_pretty(&ProjectConfig::json_schema())?;
            println!("{schema}");
        }
        Commands::Validate => {
            let (_, built) = load_project(&cli.config)?;
            let engine = SecretManagerEngine::new(built.source).with_conflict_options(built.conflict);
            let summary = engine.run(RunMode::Validate).await?;
            println!(
                "Validated {} secrets across {} managers",
                summary.secrets, summary.managers
            );
        }
        Commands::Plan => {
            let (_, built) = load_project(&cli.config)?;
            let engine = SecretManagerEngine::new(built.source).with_conflict_options(built.conflict);
            let summary = engine.run(RunMode::Plan).await?;
            for scope in ConflictScope::ALL {
                println!(
                    "# {scope}: {}",
                    engine.conflict_options().strategy_for(scope)
                );
            }
            let masked: Vec<_> = summary
                .effects
                .iter()
                .map(|effect| {
                    serde_json::json!({
                        "kind": effect.kind,
                        "provider": effect.provider_name,
                        "secret": effect.secret_name,
                        "payload": effect.masked_payload(),
                    })
                })
                .collect();
            println!("{}", serde_yaml::to_string(&masked)?);
        }
        Commands::Apply {
            dry_run,
            kubectl,
            context,
            server_side,
            api,
        } => {
            let (_, built) = load_project(&cli.config)?;
            let mut engine =
                SecretManagerEngine::new(built.source).with_conflict_options(built.conflict);
            if !dry_run {
                if *api {
                    let applier = KubeApiApplier::try_default()
                        .await
                        .context("Failed to create Kubernetes client. Ensure kubeconfig is configured.")?;
                    engine = engine.with_applier(Arc::new(applier));
                } else {
                    let mut applier = KubectlApplier::new(kubectl.clone()).server_side(*server_side);
                    if let Some(context) = context {
                        applier = applier.with_context(context);
                    }
                    engine = engine.with_applier(Arc::new(applier));
                }
            }
            let summary = engine.run(RunMode::Apply { dry_run: *dry_run }).await?;
            if let Some(report) = summary.apply {
                info!(
                    "Apply finished: {} applied, {} custom effects skipped",
                    report.applied, report.skipped
                );
                println!(
                    "{} {} effects ({} skipped)",
                    if report.dry_run { "Would apply" } else { "Applied" },
                    report.applied,
                    report.skipped
                );
            }
        }
        Commands::Render => {
            let (project, built) = load_project(&cli.config)?;
            let stacks = project.build_stacks(&built.source)?;
            for stack in &stacks {
                for (id, manifest) in stack.build()? {
                    println!("---\n# stack: {}, resource: {id}", stack.name());
                    print!("{}", serde_yaml::to_string(&manifest)?);
                }
            }
        }
    }
    Ok(())
}

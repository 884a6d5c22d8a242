//! kubeops CLI
//!
//! Switches kubeconfig contexts, installs KEDA, reconciles autoscaled
//! workloads and reports their health.

mod commands;
mod config;
mod helm;
mod kubeconfig;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{connect, deploy, docs, doctor, health, keda};
use kubeops_lib::ClusterConfig;
use std::path::PathBuf;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// kubeops CLI
#[derive(Parser)]
#[command(name = "kubeops")]
#[command(author, version, about = "Deploy and inspect autoscaled Kubernetes workloads", long_about = None)]
pub struct Cli {
    /// Path to kubeconfig file (defaults to KUBECONFIG, then ~/.kube/config)
    #[arg(long, global = true)]
    pub kubeconfig: Option<PathBuf>,

    /// Kubeconfig context to use instead of the current one
    #[arg(long, global = true)]
    pub context: Option<String>,

    /// Output format
    #[arg(long, short, global = true, default_value = "table")]
    pub format: output::OutputFormat,

    /// Enable verbose output
    #[arg(long, short, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Set the kubeconfig's current context
    Connect {
        /// Context to switch to (prompts when omitted)
        #[arg(long)]
        context_name: Option<String>,
    },

    /// Install the KEDA operator with helm, or report its status
    InstallKeda {
        /// Namespace for the operator
        #[arg(long, short)]
        namespace: Option<String>,

        /// Helm release name
        #[arg(long, default_value = "keda")]
        release: String,
    },

    /// Create or update a Deployment, its Service and its autoscaler
    CreateDeployment(deploy::CreateDeploymentArgs),

    /// Show health and resource usage of a deployment
    HealthStatus {
        /// Deployment name
        #[arg(long)]
        name: String,

        /// Namespace of the deployment
        #[arg(long, short)]
        namespace: Option<String>,
    },

    /// Check that external tools are available
    Doctor,

    /// Generate Markdown documentation for every command
    #[command(hide = true)]
    Docs {
        /// Output directory
        #[arg(long, default_value = "docs")]
        dir: PathBuf,
    },
}

fn init_tracing(verbose: bool, json: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    let settings = config::CliConfig::load()?;
    let cluster = ClusterConfig::new(cli.kubeconfig.clone(), cli.context.clone());

    match cli.command {
        Commands::Connect { context_name } => {
            let path = config::kubeconfig_path(cli.kubeconfig.as_deref())?;
            connect::run(&path, context_name, cli.format)?;
        }
        Commands::InstallKeda { namespace, release } => {
            let namespace = namespace.unwrap_or_else(|| settings.keda_namespace.clone());
            keda::install(&cluster, &namespace, &release, cli.format).await?;
        }
        Commands::CreateDeployment(args) => {
            deploy::create_deployment(&cluster, &settings, args, cli.format).await?;
        }
        Commands::HealthStatus { name, namespace } => {
            let namespace = namespace.unwrap_or_else(|| settings.namespace.clone());
            health::show_health(&cluster, &name, &namespace, cli.format).await?;
        }
        Commands::Doctor => {
            if !doctor::run(cli.format).await? {
                std::process::exit(1);
            }
        }
        Commands::Docs { dir } => {
            docs::generate(&dir)?;
        }
    }

    Ok(())
}

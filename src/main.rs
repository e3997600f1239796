use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use ironic_provision::configdrive::{ConfigDriveBuilder, ConfigDriveInput};
use ironic_provision::ironic::{CleanStep, DeployStep, IronicClient, NodeApi, TargetPowerState, TargetProvisionState};
use ironic_provision::{
    api_metrics, init_telemetry, DriveRequest, NodeLocks, ProvisionConfig, ProvisionEngine, RunLimits,
    ShutdownCoordinator,
};

#[derive(Parser)]
#[command(name = "ironic-provision")]
#[command(about = "Drive bare-metal nodes through OpenStack Ironic provisioning states")]
#[command(long_about = "ironic-provision moves a node to a target provision state by issuing one Ironic \
                       verb at a time and polling until the node settles, detouring through \
                       intermediate states (manageable, available) when the target needs them.")]
struct Cli {
    /// Configuration file (defaults to ./ironic-provision.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Drive a node to a target provision state
    Provision(ProvisionArgs),
    /// Change a node's power state and wait for it to settle
    Power {
        /// Node UUID or name
        #[arg(long)]
        node: String,
        /// Target power state: on, off, reboot, soft-off, soft-reboot
        #[arg(long)]
        state: TargetPowerState,
        /// Seconds Ironic may spend on a soft power action before failing it
        #[arg(long)]
        soft_timeout: Option<u64>,
    },
    /// Print the current node record as JSON
    Show {
        /// Node UUID or name
        #[arg(long)]
        node: String,
    },
    /// Print the effective configuration as TOML
    Config {
        /// Also write it to this file
        #[arg(long)]
        save: Option<PathBuf>,
    },
}

#[derive(Args)]
struct ProvisionArgs {
    /// Node UUID or name
    #[arg(long)]
    node: String,
    /// manage, provide, active, deleted, clean or inspect
    #[arg(long)]
    target: TargetProvisionState,
    /// User data file for the config drive (active only)
    #[arg(long)]
    user_data: Option<PathBuf>,
    /// Network data JSON file for the config drive (active only)
    #[arg(long)]
    network_data: Option<PathBuf>,
    /// Metadata JSON file for the config drive (active only)
    #[arg(long)]
    meta_data: Option<PathBuf>,
    /// JSON list of clean steps (clean only)
    #[arg(long)]
    clean_steps: Option<PathBuf>,
    /// JSON list of deploy steps (active only)
    #[arg(long)]
    deploy_steps: Option<PathBuf>,
    /// Give up after this many seconds, overriding the configured deadline
    #[arg(long)]
    deadline: Option<u64>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = tokio::runtime::Runtime::new()
        .context("Failed to start async runtime")
        .and_then(|runtime| runtime.block_on(run(cli)));

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    ProvisionConfig::load_env_file()?;
    let config = ProvisionConfig::load(cli.config.as_deref())?;
    init_telemetry(&config.observability)?;

    match cli.command {
        Commands::Provision(args) => provision_command(&config, args).await,
        Commands::Power {
            node,
            state,
            soft_timeout,
        } => power_command(&config, &node, state, soft_timeout).await,
        Commands::Show { node } => show_command(&config, &node).await,
        Commands::Config { save } => config_command(&config, save.as_deref()),
    }
}

fn build_client(config: &ProvisionConfig) -> Result<IronicClient> {
    let client = IronicClient::new(&config.ironic.endpoint, config.api_version()?, config.client_options())
        .with_context(|| format!("Failed to create client for {}", config.ironic.endpoint))?;
    Ok(client)
}

async fn provision_command(config: &ProvisionConfig, args: ProvisionArgs) -> Result<()> {
    let client = Arc::new(build_client(config)?);
    let engine = ProvisionEngine::new(client.clone(), config.workflow_settings());

    let mut request = DriveRequest::default();
    if args.target == TargetProvisionState::Active {
        request.config_drive = match read_config_drive_input(&args).await? {
            Some(input) => {
                let builder = ConfigDriveBuilder::new(client.api_version()).with_iso_tool(&config.ironic.iso_tool);
                Some(builder.build(input).await?)
            }
            None => None,
        };
        if let Some(path) = &args.deploy_steps {
            request.deploy_steps = read_json::<Vec<DeployStep>>(path).await?;
        }
    }
    if args.target == TargetProvisionState::Clean {
        if let Some(path) = &args.clean_steps {
            request.clean_steps = read_json::<Vec<CleanStep>>(path).await?;
        }
    }

    let shutdown = ShutdownCoordinator::new();
    shutdown.install_signal_handlers();
    let mut limits = RunLimits::unbounded().with_cancellation(shutdown.token());
    if let Some(budget) = args.deadline.map(Duration::from_secs).or_else(|| config.deadline()) {
        limits = limits.with_timeout(budget);
    }

    let locks = NodeLocks::new();
    let result = locks
        .run_exclusive(&args.node, engine.drive_to_state(&args.node, args.target, &request, &limits))
        .await;
    api_metrics().log_stats();
    result?;

    info!(node = %args.node, target = %args.target, "Provisioning complete");
    println!("Node {} reached '{}'", args.node, args.target);
    Ok(())
}

async fn read_config_drive_input(args: &ProvisionArgs) -> Result<Option<ConfigDriveInput>> {
    if args.user_data.is_none() && args.network_data.is_none() && args.meta_data.is_none() {
        return Ok(None);
    }

    let mut input = ConfigDriveInput::default();
    if let Some(path) = &args.user_data {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read user data from {}", path.display()))?;
        input.user_data = Some(text);
    }
    if let Some(path) = &args.network_data {
        input.network_data = read_json(path).await?;
    }
    if let Some(path) = &args.meta_data {
        input.meta_data = read_json(path).await?;
    }
    Ok(Some(input))
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Invalid JSON in {}", path.display()))
}

async fn power_command(
    config: &ProvisionConfig,
    node: &str,
    state: TargetPowerState,
    soft_timeout: Option<u64>,
) -> Result<()> {
    let client = Arc::new(build_client(config)?);
    let engine = ProvisionEngine::new(client, config.workflow_settings());

    let locks = NodeLocks::new();
    let result = locks
        .run_exclusive(node, engine.change_power_state(node, state, soft_timeout))
        .await;
    api_metrics().log_stats();
    result?;

    println!("Node {node} is now '{}'", state.settled_state());
    Ok(())
}

async fn show_command(config: &ProvisionConfig, node: &str) -> Result<()> {
    let client = build_client(config)?;
    let record = client.get_node(node).await?;
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}

fn config_command(config: &ProvisionConfig, save: Option<&Path>) -> Result<()> {
    print!("{}", config.to_toml()?);
    if let Some(path) = save {
        config.save_to_file(path)?;
        eprintln!("Configuration written to {}", path.display());
    }
    Ok(())
}

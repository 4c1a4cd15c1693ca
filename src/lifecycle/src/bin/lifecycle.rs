//! lifecycle binary: bootstraps this instance into its cluster.

use anyhow::Context;
use clap::{Parser, Subcommand};
use lifecycle::config::resource_config_path;
use lifecycle::labels::labels_for;
use lifecycle::{
    identity, resolve_node, BootstrapConfig, Bootstrapper, NodeLabelApplier,
    ProvisioningParameters, SecretsManagerStore, SystemRunner, TopologyDescriptor,
};
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "lifecycle", version, about = "Join this instance to its cluster control plane")]
struct Args {
    /// Resource config JSON with the addresses of every cluster instance
    #[arg(long = "resource-config", alias = "resource_config", global = true)]
    resource_config: Option<PathBuf>,

    /// Provisioning parameters JSON naming the controller and login groups
    #[arg(long = "provisioning-parameters", alias = "provisioning_parameters", global = true)]
    provisioning_parameters: Option<PathBuf>,

    /// Bootstrap configuration (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Address of this instance; discovered from the routing table when unset
    #[arg(long, env = "LIFECYCLE_NODE_ADDRESS", global = true)]
    address: Option<Ipv4Addr>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the full bootstrap pipeline on this node
    Run,
    /// Show where this node sits in the topology
    Resolve,
    /// Apply the standard labels to every node in the topology
    LabelAll,
}

fn main() -> ExitCode {
    // Default to info level if RUST_LOG not set
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let args = Args::parse();

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!("Failed to start runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(execute(args)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("Bootstrap failed: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn execute(args: Args) -> anyhow::Result<()> {
    let config = BootstrapConfig::load(args.config.as_deref())?;
    let topology = TopologyDescriptor::load(&resource_config_path(args.resource_config.as_deref()))?;
    let params = match &args.provisioning_parameters {
        Some(path) => ProvisioningParameters::load(path)?,
        None => ProvisioningParameters::default(),
    };
    let local = args.address.unwrap_or_else(identity::local_address);
    tracing::info!("This node ip address is {}", local);

    let runner = SystemRunner;

    match args.command {
        Command::Run => {
            let store = SecretsManagerStore::for_region(topology.identity().region()).await;
            let report = Bootstrapper::new(&topology, &params, &config, &runner, &store)
                .run(local)
                .await
                .context("bootstrap pipeline")?;
            tracing::info!(
                "Node {} ({}) done: join={:?} configuration={:?} membership={:?}",
                report.node_name,
                report.role,
                report.join,
                report.configuration,
                report.membership
            );
        }
        Command::Resolve => {
            let node = resolve_node(&topology, &params, local)?;
            println!("cluster:       {}", topology.identity());
            println!("region:        {}", topology.identity().region());
            println!("group:         {}", node.group.name);
            println!("instance:      {}", node.member.instance_id);
            println!("node name:     {}", node.member.name);
            println!("role:          {}", node.role);
            for (key, value) in labels_for(node.member, topology.identity(), &config.labels) {
                println!("label:         {}={}", key, value);
            }
        }
        Command::LabelAll => {
            let applier = NodeLabelApplier::new(&runner, &config.commands);
            let labeled = applier
                .label_all_members(&topology, &config.labels)
                .await
                .context("labeling cluster nodes")?;
            tracing::info!("Labeled {} node(s)", labeled);
        }
    }

    Ok(())
}

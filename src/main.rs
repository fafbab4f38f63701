//! GNS (.gorb) Name Service Node
//!
//! Loads configuration, opens the registry store and serves JSON-RPC until
//! Ctrl-C.

use clap::{Parser, Subcommand};
use gns_core::config::GnsConfig;
use gns_core::derivation::AddressDeriver;
use gns_core::registry::DomainRegistry;
use gns_core::rpc::{start_rpc_server, RpcState};
use gns_core::storage::{open_store, StorageBackend};
use gns_core::wallet::KeyPair;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "gns-node")]
#[command(about = "GNS name service registrar node")]
#[command(version)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the RPC port
    #[arg(short, long)]
    port: Option<u16>,

    /// Override the storage path
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Override the storage backend (memory, sled, json_file)
    #[arg(long)]
    backend: Option<StorageBackend>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve JSON-RPC (default)
    Serve,
    /// Generate an owner keypair file
    Keygen {
        /// Output key file
        #[arg(short, long, default_value = "gns-owner.json")]
        output: PathBuf,
    },
    /// Print the effective configuration as TOML
    ShowConfig,
}

fn init_logging(config: &GnsConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => GnsConfig::load_from_file(path)?,
        None => GnsConfig::default(),
    };
    if let Some(port) = cli.port {
        config.rpc.port = port;
    }
    if let Some(dir) = cli.data_dir {
        config.storage.path = dir;
    }
    if let Some(backend) = cli.backend {
        config.storage.backend = backend;
    }
    config.validate()?;

    init_logging(&config);

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config).await,
        Commands::Keygen { output } => {
            let keypair = KeyPair::generate();
            keypair.save(&output)?;
            println!("{}", keypair.address);
            Ok(())
        }
        Commands::ShowConfig => {
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
    }
}

async fn serve(config: GnsConfig) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(config.storage.backend, &config.storage.path)?;
    let registry = DomainRegistry::with_parts(store, AddressDeriver::default(), config.name_policy())
        .with_pricing(config.price_schedule());
    let domains = registry.list_all()?.len();
    info!(
        domains,
        program_id = %registry.deriver().scheme().program_id,
        "Registry ready"
    );

    let state = Arc::new(RpcState::new(Arc::new(registry)));

    tokio::select! {
        result = start_rpc_server(state, &config.rpc.bind, config.rpc.port) => {
            if let Err(e) = &result {
                error!("RPC server stopped: {}", e);
            }
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
        }
    }

    Ok(())
}

//! vethkube CLI - warm veth pool daemon for container pods

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tabled::{Table, Tabled};
use veth_kube::manager::veth_initializer;
use veth_kube::{
    network, DaemonConfig, DockerRuntime, Manager, Pool, PoolConfig, Result, Server, VethFactory,
};

#[derive(Parser)]
#[command(name = "vethkube")]
#[command(about = "Warm pool of veth interfaces for container pods")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pool daemon with its HTTP API
    Serve {
        /// Host to bind to
        #[arg(long, default_value = "0.0.0.0")]
        host: String,
        /// Port to listen on
        #[arg(short, long, default_value = "8080")]
        port: u16,
        /// Idle interfaces to keep warm
        #[arg(long, default_value = "2")]
        min_idle: usize,
        /// Idle interfaces beyond this are deleted
        #[arg(long, default_value = "5")]
        max_idle: usize,
        /// Hard cap on owned interfaces
        #[arg(long, default_value = "10")]
        capacity: usize,
        /// Name prefix for pool-owned interfaces
        #[arg(long, default_value = "veth")]
        prefix: String,
        /// Directory for binding records
        #[arg(long, default_value = "/var/lib/veth-kube")]
        state_dir: PathBuf,
        /// Seconds an acquire may wait for capacity
        #[arg(long, default_value = "30")]
        acquire_timeout: u64,
    },
    /// Host link operations
    Links {
        #[command(subcommand)]
        action: LinksAction,
    },
}

#[derive(Subcommand)]
enum LinksAction {
    /// List host links with the given prefix
    List {
        /// Name prefix to filter on
        #[arg(long, default_value = "veth")]
        prefix: String,
    },
    /// Delete every host link with the given prefix
    Purge {
        /// Name prefix to match
        #[arg(long)]
        prefix: String,
    },
}

#[derive(Tabled)]
struct LinkRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "State")]
    state: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("veth_kube=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            host,
            port,
            min_idle,
            max_idle,
            capacity,
            prefix,
            state_dir,
            acquire_timeout,
        } => {
            let config = DaemonConfig::builder()
                .min_idle(min_idle)
                .max_idle(max_idle)
                .capacity(capacity)
                .veth_prefix(prefix)
                .state_dir(state_dir)
                .acquire_timeout_secs(acquire_timeout)
                .build_validated()?;

            serve(config, host, port).await?;
        }
        Commands::Links { action } => handle_links(action)?,
    }

    Ok(())
}

async fn serve(config: DaemonConfig, host: String, port: u16) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .map_err(|e| veth_kube::Error::Config(format!("invalid listen address: {}", e)))?;

    let runtime = Arc::new(DockerRuntime);
    let factory = Arc::new(VethFactory::new(config.veth_prefix.clone())?);

    let pool = Pool::new(
        PoolConfig::new(factory)
            .min_idle(config.min_idle)
            .max_idle(config.max_idle)
            .capacity(config.capacity)
            .initializer(veth_initializer(
                config.veth_prefix.clone(),
                config.state_dir.clone(),
                runtime.clone(),
            )),
    )?;

    let manager = Arc::new(Manager::new(
        pool,
        runtime,
        config.state_dir.clone(),
        config.acquire_timeout(),
    )?);

    let stat = manager.pool().stat();
    println!("Pool ready: {} idle, {} in use, capacity {}", stat.idle, stat.inuse, stat.capacity);
    println!();
    println!("Endpoints:");
    println!("  GET  /health               Health check");
    println!("  GET  /api/v1/pool          Pool occupancy");
    println!("  GET  /api/v1/resources     Bound resources");
    println!("  POST /api/v1/acquire       Acquire an interface");
    println!("  POST /api/v1/release/:id   Release an interface");
    println!("  POST /api/v1/gc            Collect leaked interfaces");
    println!();

    let server = Server::new(manager.clone(), addr);
    tokio::select! {
        result = server.run() => {
            result.map_err(|e| veth_kube::Error::Runtime(e.to_string()))?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
    }

    manager.pool().close().await?;
    Ok(())
}

fn handle_links(action: LinksAction) -> Result<()> {
    match action {
        LinksAction::List { prefix } => {
            let links = network::list_links(&prefix)?;
            if links.is_empty() {
                println!("No links with prefix '{}'.", prefix);
                return Ok(());
            }

            let rows: Vec<LinkRow> = links
                .iter()
                .map(|l| LinkRow {
                    name: l.ifname.clone(),
                    state: l.operstate.clone().unwrap_or_else(|| "-".to_string()),
                })
                .collect();

            println!("{}", Table::new(rows));
        }
        LinksAction::Purge { prefix } => {
            let links = network::list_links(&prefix)?;
            if links.is_empty() {
                println!("No links with prefix '{}'.", prefix);
                return Ok(());
            }

            for link in links {
                println!("Deleting {}...", link.ifname);
                network::delete_link(&link.ifname)?;
            }
            println!("Done.");
        }
    }
    Ok(())
}

use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "blockyard")]
#[command(about = "Block compaction planner", long_about = None)]
pub struct Cli {
    /// Configuration file (defaults to $BLOCKYARD_CONFIG or config/blockyard.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP server and the periodic sync loop
    Server(ServerArgs),
    /// Run one sync cycle and print the planned jobs
    Sync(SyncArgs),
}

#[derive(clap::Args, Debug)]
pub struct ServerArgs {
    /// Address to bind the HTTP server to (overrides server.bind_addr)
    #[arg(long)]
    pub address: Option<SocketAddr>,
}

#[derive(clap::Args, Debug)]
pub struct SyncArgs {
    /// Only sync these tenants (overrides compactor.tenants)
    #[arg(long = "tenant")]
    pub tenants: Vec<String>,
}

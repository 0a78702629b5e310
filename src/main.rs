mod cli;

use blockyard::compactor::{JobStatus, TenantOutcome};
use blockyard::config::Config;
use blockyard::{observability, server};
use clap::Parser;
use cli::{Cli, Commands};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cli = Cli::parse();

    let mut config = match cli.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };
    observability::init_tracing(&config.telemetry.log_filter);

    match cli.command {
        Commands::Server(args) => {
            if let Some(address) = args.address {
                config.server.bind_addr = address;
            }
            server::run(config).await?;
        }
        Commands::Sync(args) => {
            if !args.tenants.is_empty() {
                config.compactor.tenants = args.tenants;
            }
            let state = server::AppState::from_config(&config)?;
            let report = state.run_cycle(&CancellationToken::new()).await?;

            for tenant in &report.tenants {
                match &tenant.outcome {
                    TenantOutcome::Synced { fetch, blocks, jobs } => {
                        println!("{}: {:?}, {} blocks, {} jobs", tenant.tenant, fetch, blocks, jobs.len());
                        for planned in jobs {
                            let status = match &planned.status {
                                JobStatus::Ready => "ready".to_string(),
                                JobStatus::Waiting { blocking } => format!("waiting on {}", blocking),
                                JobStatus::Failed { error } => format!("failed: {}", error),
                            };
                            println!("  {} {}", planned.job, status);
                        }
                    }
                    TenantOutcome::Failed { error } => {
                        println!("{}: failed: {}", tenant.tenant, error);
                    }
                }
            }
        }
    }

    Ok(())
}

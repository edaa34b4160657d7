use anyhow::Result;
use clap::Parser;
use nbzip::cli::Cli;
use nbzip::config::ServerConfig;
use nbzip::server::run_server;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.log_filter()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let config = ServerConfig::resolve(&cli)?;
    run_server(config).await
}

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "tipster")]
#[command(about = "Football preview tips monitor")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Discover preview pages and refresh the local database.
    Collect,
    /// Serve the reporting dashboard over HTTP.
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Collect) {
        Commands::Collect => {
            let summary = tipster_collect::run_collect_once_from_env().await?;
            println!(
                "collect complete: run_id={} pages={} links={} saved={} no_tip={} fetch_errors={}",
                summary.run_id,
                summary.pages_visited,
                summary.links_discovered,
                summary.records_saved,
                summary.skipped_no_tip,
                summary.skipped_fetch_errors
            );
        }
        Commands::Serve => {
            tipster_web::serve_from_env().await?;
        }
    }

    Ok(())
}

use std::path::PathBuf;

use clap::Parser;
use projecthub::config::Config;
use projecthub::daemon;
use projecthub::error::Result;

#[derive(Parser, Debug)]
#[command(name = "projecthubd")]
#[command(about = "ProjectHub HTTP daemon")]
struct Cli {
    /// JSON config file; convention defaults are used when omitted.
    #[arg(long, env = "PROJECTHUB_CONFIG")]
    config: Option<PathBuf>,

    #[arg(long, env = "PROJECTHUB_HOST")]
    host: Option<String>,

    #[arg(long, env = "PROJECTHUB_PORT")]
    port: Option<u16>,

    #[arg(long)]
    db: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    projecthub::logging::init_tracing("projecthubd");
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(db) = cli.db {
        config.database.sqlite_path = Some(db);
    }
    config.validate()?;

    daemon::run_with_shutdown(config, async {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown requested");
        }
    })
    .await
}

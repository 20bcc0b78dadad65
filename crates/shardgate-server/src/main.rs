mod config;
mod dispatcher;
mod handshake;
mod server;

use clap::Parser;
use config::Config;
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "shardgate", about = "MySQL-facing front end of a sharding proxy")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "config.example.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let subscriber = FmtSubscriber::new();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();
    let config = Config::from_path(&args.config)?;
    server::run(config).await?;
    Ok(())
}

use clap::Parser;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "tunnel-server", about = "Reverse TCP tunnel intermediary")]
struct Args {
    /// Path to the server's YAML configuration file.
    #[arg(short, long, default_value = "server.yaml")]
    config: String,
}

fn init_tracing(default_directive: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = rtun::config::ServerConfig::load(&args.config)?;

    init_tracing(config.log_level.as_deref().unwrap_or("info"));

    let config = Arc::new(config);
    tokio::select! {
        result = rtun::server::run(config) => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("received shutdown signal, exiting");
        }
    }
    Ok(())
}

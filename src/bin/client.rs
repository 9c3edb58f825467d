use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "tunnel-client", about = "Reverse TCP tunnel endpoint")]
struct Args {
    /// Path to the client's YAML configuration file.
    #[arg(short, long, default_value = "client.yaml")]
    config: String,
}

fn init_tracing(default_directive: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = rtun::config::ClientConfig::load(&args.config)?;

    init_tracing(config.log_level.as_deref().unwrap_or("info"));

    tokio::select! {
        _ = rtun::client::run(config) => {}
        _ = tokio::signal::ctrl_c() => {
            info!("received shutdown signal, exiting");
        }
    }
    Ok(())
}

//! The tunnel-endpoint role: a perpetual supervisor over authenticate-then-serve epochs.

pub mod worker;

use crate::common::{configure_tcp_stream, Error, Result, Shutdown};
use crate::config::ClientConfig;
use crate::protocol;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::{info, warn};

const EPOCH_RETRY_BACKOFF: Duration = Duration::from_secs(5);

/// Run epochs forever (spec.md §4.7). Each epoch is one control connection's
/// lifetime together with the proxy workers it spawned.
pub async fn run(config: ClientConfig) -> ! {
    loop {
        if let Err(e) = run_epoch(&config).await {
            warn!(error = %e, "epoch ended");
        }
        tokio::time::sleep(EPOCH_RETRY_BACKOFF).await;
    }
}

async fn run_epoch(config: &ClientConfig) -> Result<()> {
    let shutdown = Shutdown::new();
    let server_addr = config.resolve_server_addr();

    let stream = tokio::time::timeout(
        Duration::from_secs(config.connect_timeout),
        TcpStream::connect(&server_addr),
    )
    .await
    .map_err(|_| Error::timeout(format!("dialing {server_addr}")))??;
    configure_tcp_stream(&stream);
    let mut reader = BufReader::new(stream);

    let auth_line = protocol::format_auth(&config.username, &config.password);
    reader.get_mut().write_all(auth_line.as_bytes()).await?;

    let mut reply = String::new();
    reader.read_line(&mut reply).await?;

    if !reply.starts_with("AUTH_OK") {
        warn!(reply = reply.trim_end(), "authentication rejected by server");
        return Ok(());
    }

    let pool_size = protocol::parse_pool_size(&reply);
    info!(%server_addr, pool_size, "authenticated, spawning proxy workers");

    let mut workers = Vec::with_capacity(pool_size);
    for _ in 0..pool_size {
        let server_addr = server_addr.clone();
        let username = config.username.clone();
        let local_port = config.local_port;
        let shutdown = shutdown.clone();
        workers.push(tokio::spawn(async move {
            worker::run(server_addr, username, local_port, shutdown).await;
        }));
    }

    let mut control_stream = reader.into_inner();
    let mut byte = [0u8; 1];
    loop {
        match control_stream.read_exact(&mut byte).await {
            Ok(_) => continue,
            Err(_) => break,
        }
    }
    shutdown.fire();

    for worker in workers {
        let _ = worker.await;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_epoch_fails_to_dial_closed_port() {
        let config = ClientConfig {
            server_addr: "127.0.0.1:1".to_string(),
            local_port: 8000,
            connect_timeout: 1,
            username: "admin".to_string(),
            password: "123456".to_string(),
            log_level: None,
        };
        let result = run_epoch(&config).await;
        assert!(result.is_err());
    }
}

//! The intermediary role: accept-dispatch loop plus per-identity state.

pub mod control;
pub mod credential;
pub mod pool;
pub mod registry;
pub mod rendezvous;

use crate::common::{configure_tcp_stream, Shutdown};
use crate::config::ServerConfig;
use crate::protocol::{self, Command};
use crate::Result;
use control::Control;
use registry::Registry;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

/// Run the server until a bind error or process signal ends it. Per spec.md
/// §7, nothing short of "cannot bind the listen socket" terminates it.
pub async fn run(config: Arc<ServerConfig>) -> Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", config.port)).await?;
    let registry = Arc::new(Registry::new());
    info!(port = config.port, "tunnel server listening");

    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                configure_tcp_stream(&stream);
                let registry = registry.clone();
                let config = config.clone();
                tokio::spawn(async move {
                    dispatch(stream, peer, registry, config).await;
                });
            }
            Err(e) => {
                // A single bad accept must not kill the server (spec.md §7.6).
                warn!(error = %e, "accept failed, continuing");
            }
        }
    }
}

async fn dispatch(stream: TcpStream, peer: SocketAddr, registry: Arc<Registry>, config: Arc<ServerConfig>) {
    let reader = BufReader::new(stream);
    let (command, reader) = match protocol::read_command(reader).await {
        Ok(pair) => pair,
        Err(e) => {
            debug!(%peer, error = %e, "failed to read opening line");
            return;
        }
    };

    match command {
        Command::Auth { username, password } => {
            handle_auth(reader, peer, username, password, &registry, &config).await
        }
        Command::Proxy { username } => handle_proxy(reader, peer, username, &registry).await,
        Command::Public { first_line } => {
            rendezvous::handle_public(reader, first_line, peer, &registry).await
        }
        Command::Rejected => {
            debug!(%peer, "rejected malformed AUTH line");
        }
    }
}

async fn handle_auth(
    reader: BufReader<TcpStream>,
    peer: SocketAddr,
    username: String,
    password: String,
    registry: &Registry,
    config: &ServerConfig,
) {
    if !credential::check(&config.users, &username, &password) {
        warn!(%peer, %username, "AUTH rejected: invalid credentials");
        let mut stream = reader.into_inner();
        let _ = stream.write_all(protocol::format_auth_failed("invalid credentials").as_bytes()).await;
        return;
    }

    let pool_size = config.effective_pool_size();
    let stream = reader.into_inner();
    let (read_half, write_half) = stream.into_split();

    let new_control = Arc::new(Control::new(username.clone(), pool_size, write_half));

    // install() fires the previous Control's shutdown while still holding
    // the registry's write lock, so no reader can observe `new_control`
    // without that having already happened (invariant I3). We additionally
    // force the old socket closed here so it's provably dead before
    // AUTH_OK goes out on the wire (L2).
    if let Some(previous) = registry.install(username.clone(), new_control.clone()).await {
        previous.force_close().await;
    }

    if new_control
        .send_line(&protocol::format_auth_ok(pool_size))
        .await
        .is_err()
    {
        registry.delete_if_current(&username, &new_control).await;
        return;
    }

    info!(%peer, %username, pool_size, "AUTH accepted");

    tokio::select! {
        biased;
        _ = new_control.shutdown.recv() => {}
        _ = liveness_loop(read_half, new_control.shutdown.clone()) => {}
    }

    let parked = new_control.pool.parked_len();
    registry.delete_if_current(&username, &new_control).await;
    debug!(%username, parked, "control session torn down");
}

/// Blocking single-byte reads for liveness (spec.md §4.4). Any read error
/// (including a clean EOF) fires `shutdown` exactly once and returns.
async fn liveness_loop(mut read_half: OwnedReadHalf, shutdown: Shutdown) {
    let mut byte = [0u8; 1];
    loop {
        match read_half.read(&mut byte).await {
            Ok(0) => {
                shutdown.fire();
                return;
            }
            Ok(_) => continue,
            Err(_) => {
                shutdown.fire();
                return;
            }
        }
    }
}

async fn handle_proxy(reader: BufReader<TcpStream>, peer: SocketAddr, username: String, registry: &Registry) {
    let control = match registry.load(&username).await {
        Some(c) => c,
        None => {
            debug!(%peer, %username, "PROXY for unknown identity, closing");
            return;
        }
    };
    let stream = reader.into_inner();
    control.pool.push(stream, &control.shutdown).await;
}

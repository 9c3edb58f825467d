//! A single proxy worker: parks a connection, wakes on demand, bridges to the local service.

use crate::common::configure_tcp_stream;
use crate::protocol;
use crate::common::Shutdown;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, warn};

const SERVER_RETRY_BACKOFF: Duration = Duration::from_secs(10);
const PARK_RETRY_BACKOFF: Duration = Duration::from_secs(5);
const LOCAL_RETRY_BACKOFF: Duration = Duration::from_secs(1);

/// Run one proxy worker for the lifetime of an epoch (spec.md §4.8).
pub async fn run(server_addr: String, username: String, local_port: u16, shutdown: Shutdown) {
    loop {
        if shutdown.is_fired() {
            return;
        }

        let mut proxy = match dial_server(&server_addr, &shutdown).await {
            Some(s) => s,
            None => return, // shutdown fired while waiting to retry
        };

        let proxy_line = protocol::format_proxy(&username);
        if proxy.write_all(proxy_line.as_bytes()).await.is_err() {
            drop(proxy);
            if !sleep_or_shutdown(SERVER_RETRY_BACKOFF, &shutdown).await {
                return;
            }
            continue;
        }

        // Park: block-read exactly one byte. It's both the wakeup signal
        // and the first byte of public payload (spec.md §4.8 step 4; §9
        // "First-byte handoff").
        let mut wakeup = [0u8; 1];
        match proxy.read_exact(&mut wakeup).await {
            Ok(_) => {}
            Err(e) => {
                if e.kind() != std::io::ErrorKind::UnexpectedEof {
                    warn!(error = %e, "parked proxy read failed");
                }
                drop(proxy);
                if !sleep_or_shutdown(PARK_RETRY_BACKOFF, &shutdown).await {
                    return;
                }
                continue;
            }
        }

        let local_addr = format!("127.0.0.1:{}", local_port);
        let mut local = match TcpStream::connect(&local_addr).await {
            Ok(s) => s,
            Err(e) => {
                debug!(error = %e, addr = %local_addr, "local service unreachable");
                drop(proxy);
                // Deliberately not shutdown-preemptible; spec.md §9 flags
                // this as a minor asymmetry to preserve, not fix.
                tokio::time::sleep(LOCAL_RETRY_BACKOFF).await;
                continue;
            }
        };
        configure_tcp_stream(&local);

        if local.write_all(&wakeup).await.is_err() {
            continue;
        }

        match tokio::io::copy_bidirectional(&mut proxy, &mut local).await {
            Ok((up, down)) => debug!(up, down, "worker splice finished"),
            Err(e) => debug!(error = %e, "worker splice ended with error"),
        }
    }
}

/// Dial the server, retrying every 10s until it succeeds or shutdown fires.
async fn dial_server(server_addr: &str, shutdown: &Shutdown) -> Option<TcpStream> {
    loop {
        match TcpStream::connect(server_addr).await {
            Ok(s) => {
                configure_tcp_stream(&s);
                return Some(s);
            }
            Err(e) => {
                debug!(error = %e, "worker failed to dial server, retrying");
                if !sleep_or_shutdown(SERVER_RETRY_BACKOFF, shutdown).await {
                    return None;
                }
            }
        }
    }
}

/// Sleep for `duration`, but wake early if shutdown fires. Returns `false`
/// if shutdown won the race (caller should give up, not retry).
async fn sleep_or_shutdown(duration: Duration, shutdown: &Shutdown) -> bool {
    tokio::select! {
        biased;
        _ = shutdown.recv() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}

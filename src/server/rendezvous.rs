//! Pairing an anonymous public connection with a parked proxy connection.

use crate::server::registry::Registry;
use std::net::SocketAddr;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::{debug, warn};

/// Handle a connection whose first line wasn't AUTH or PROXY (spec.md §4.6).
pub async fn handle_public(
    reader: BufReader<TcpStream>,
    first_line: Vec<u8>,
    peer: SocketAddr,
    registry: &Registry,
) {
    let control = match registry.sole().await {
        Some(c) => c,
        None => {
            debug!(%peer, "public connection with no registered identity, closing");
            return;
        }
    };

    let mut proxy = match control.pool.pop(&control.shutdown).await {
        Some(p) => p,
        None => {
            debug!(%peer, identity = %control.username, "shutdown fired before a proxy became available");
            return;
        }
    };

    // The command parser already consumed this line deciding "not AUTH, not
    // PROXY"; it's real application payload and must reach the hidden
    // service as the first bytes of the splice (P4).
    if let Err(e) = proxy.write_all(&first_line).await {
        warn!(%peer, error = %e, "failed to replay buffered line onto proxy socket");
        return;
    }

    let mut reader = reader;
    match tokio::io::copy_bidirectional(&mut reader, &mut proxy).await {
        Ok((to_proxy, to_public)) => {
            debug!(%peer, to_proxy, to_public, "splice finished");
        }
        Err(e) => {
            debug!(%peer, error = %e, "splice ended with error");
        }
    }
}

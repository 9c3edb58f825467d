//! A single authenticated identity's live state on the server.

use crate::common::Shutdown;
use crate::server::pool::Pool;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::Mutex;

/// Server-side state for one authenticated identity (spec.md §3 "Control").
///
/// The control socket's read half lives in the session task's stack (it's
/// the thing that task blocks on for liveness); only the write half is kept
/// here, so a takeover can force the old connection closed without racing
/// the old task for ownership of the stream.
pub struct Control {
    pub username: String,
    pub pool: Pool,
    pub shutdown: Shutdown,
    write_half: Mutex<OwnedWriteHalf>,
}

impl Control {
    pub fn new(username: String, pool_size: usize, write_half: OwnedWriteHalf) -> Self {
        Control {
            username,
            pool: Pool::new(pool_size),
            shutdown: Shutdown::new(),
            write_half: Mutex::new(write_half),
        }
    }

    /// Force the control socket closed. Used on takeover (L2) so the old
    /// connection is provably dead before the new one's `AUTH_OK` is sent,
    /// rather than relying on the old session task to notice `shutdown` and
    /// unwind on its own schedule.
    pub async fn force_close(&self) {
        use tokio::io::AsyncWriteExt;
        let mut half = self.write_half.lock().await;
        let _ = half.shutdown().await;
    }

    /// Write a line (e.g. `AUTH_OK ...`) to the control socket.
    pub async fn send_line(&self, line: &str) -> std::io::Result<()> {
        use tokio::io::AsyncWriteExt;
        let mut half = self.write_half.lock().await;
        half.write_all(line.as_bytes()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::{TcpListener, TcpStream};

    async fn loopback_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let connect = TcpStream::connect(addr);
        let (accept, connect) = tokio::join!(listener.accept(), connect);
        (accept.unwrap().0, connect.unwrap())
    }

    #[tokio::test]
    async fn test_force_close_does_not_panic() {
        let (a, _b) = loopback_pair().await;
        let (_read, write) = a.into_split();
        let control = Control::new("admin".to_string(), 3, write);
        control.force_close().await;
        control.force_close().await;
    }
}

//! Socket tuning shared by both roles

use socket2::SockRef;
use tokio::net::TcpStream;

/// Apply the socket options every tunnel connection wants: disable Nagle
/// (control lines and wakeup bytes are latency-sensitive single writes) and
/// enable keepalive so a half-open peer is eventually reaped by the OS.
#[inline]
pub fn configure_tcp_stream(stream: &TcpStream) {
    let _ = stream.set_nodelay(true);
    let sock = SockRef::from(stream);
    let _ = sock.set_keepalive(true);
}

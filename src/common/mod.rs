//! Shared utilities used by both the server and client roles

pub mod error;
pub mod net;
pub mod shutdown;

pub use error::{Error, Result};
pub use net::configure_tcp_stream;
pub use shutdown::Shutdown;

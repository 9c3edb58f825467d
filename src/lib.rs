//! Reverse TCP tunnel core: control/proxy multiplexing between a tunnel
//! client, this server, and arbitrary public clients.
//!
//! ```text
//!                      ┌──────────────┐
//!   public clients ───▶│   server     │◀─── AUTH / PROXY ─── tunnel client
//!                      │ (registry +  │                           │
//!                      │  per-id pool)│                      local service
//!                      └──────────────┘
//! ```

pub mod client;
pub mod common;
pub mod config;
pub mod protocol;
pub mod server;

pub use common::{Error, Result};

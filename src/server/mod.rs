//! TFTP server.
//!
//! - `server`: request dispatcher and the two serving state machines
//! - `store`: in-memory file store
//! - `config`: server configuration

mod config;
mod server;
mod store;

pub use config::{DEFAULT_BIND_PORT, ServerConfig};
pub use server::Server;
pub use store::FileStore;

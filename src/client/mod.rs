//! TFTP client.
//!
//! - `client`: download (RRQ) and upload (WRQ) transfer state machines
//! - `config`: client configuration

mod client;
mod config;

pub use client::Client;
pub use config::ClientConfig;

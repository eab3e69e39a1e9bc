//! TFTP (Trivial File Transfer Protocol) client and server.
//!
//! Implements the base protocol of
//! [RFC 1350](https://www.rfc-editor.org/rfc/rfc1350) over UDP: lock-step
//! transfers of 512-byte blocks, with retransmission on a fixed interval,
//! duplicate and stale packet rejection, and cooperative cancellation
//! threaded through every blocking call. Option extensions (RFC 2347 and
//! later) and the `mail` mode are not supported; only octet-mode
//! transfers are served.
//!
//! ## Module Structure
//!
//! ```text
//! tftp_kit/
//! ├── core/           # Core protocol implementation
//! │   ├── packet      # Packet serialization/deserialization
//! │   ├── connection  # UDP transport and reliable exchange
//! │   ├── reservation # Per-endpoint transfer exclusivity
//! │   └── cancel      # Cooperative cancellation
//! │
//! ├── server/         # TFTP server
//! │   ├── server      # Request dispatcher and transfer handlers
//! │   ├── store       # In-memory file store
//! │   └── config      # Server configuration
//! │
//! └── client/         # TFTP client
//!     └── ...
//! ```
//!
//! ## Usage Examples
//!
//! ### Start a TFTP server
//!
//! ```rust,no_run
//! use tftp_kit::core::ReservationRegistry;
//! use tftp_kit::server::{FileStore, Server, ServerConfig};
//!
//! # async fn example() -> tftp_kit::Result<()> {
//! let config = ServerConfig::new("0.0.0.0".parse().unwrap(), 69);
//! let server = Server::spawn(config, ReservationRegistry::new(), FileStore::new()).await?;
//! // ... later:
//! server.stop().await;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod core;
pub mod error;
pub mod server;

pub use error::{Error, Result};

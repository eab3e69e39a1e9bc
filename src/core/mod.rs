//! Core protocol implementation.
//!
//! - `packet`: packet model, serialization and deserialization
//! - `connection`: UDP transport and the reliable request/response exchange
//! - `reservation`: per-endpoint transfer exclusivity
//! - `cancel`: cooperative cancellation primitive

mod cancel;
mod connection;
mod packet;
mod reservation;

pub use cancel::{CancelHandle, CancelToken, cancel_pair};
pub use connection::{
    Connection, DEFAULT_RESPONSE_TIMEOUT, DEFAULT_RETRY_PERIOD, expect_ack, expect_data,
};
pub use packet::{ErrorCode, FormatError, MAX_BLOCK_SIZE, Mode, Packet};
pub use reservation::{Reservation, ReservationRegistry};

pub(crate) use connection::data_payload;

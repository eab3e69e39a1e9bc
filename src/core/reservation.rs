//! Process-wide mutual exclusion over remote endpoints.
//!
//! TFTP gives every transfer its own ephemeral port pair, but this
//! implementation disallows two simultaneous transfers with the same
//! remote endpoint. The registry is an explicit service handle: create
//! one per process and pass a clone to every transfer initiator.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use log::debug;

use crate::error::{Error, Result};

#[derive(Clone, Debug, Default)]
pub struct ReservationRegistry {
    engaged: Arc<Mutex<HashSet<String>>>,
}

impl ReservationRegistry {
    pub fn new() -> ReservationRegistry {
        ReservationRegistry::default()
    }

    /// Atomically test and reserve `endpoint`. Fails with
    /// [`Error::AddressInUse`] while another transfer holds it.
    pub fn reserve(&self, endpoint: SocketAddr) -> Result<Reservation> {
        let key = endpoint.to_string();
        let mut engaged = self.engaged.lock().unwrap();
        if !engaged.insert(key.clone()) {
            return Err(Error::AddressInUse(endpoint));
        }
        debug!("reserved remote endpoint {endpoint}");
        Ok(Reservation {
            registry: self.clone(),
            key,
            endpoint,
        })
    }
}

/// A held reservation. Dropping it releases the endpoint on every exit
/// path of the owning transfer, including cancellation and error.
#[derive(Debug)]
pub struct Reservation {
    registry: ReservationRegistry,
    key: String,
    endpoint: SocketAddr,
}

impl Reservation {
    pub fn endpoint(&self) -> SocketAddr {
        self.endpoint
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        self.registry.engaged.lock().unwrap().remove(&self.key);
        debug!("released remote endpoint {}", self.endpoint);
    }
}

use std::net::IpAddr;
use std::time::Duration;

use crate::core::{DEFAULT_RESPONSE_TIMEOUT, DEFAULT_RETRY_PERIOD};

/// Well-known TFTP request port.
pub const DEFAULT_BIND_PORT: u16 = 69;

/// TFTP server configuration.
///
/// # Example
///
/// ```rust
/// use tftp_kit::server::ServerConfig;
///
/// let config = ServerConfig::new("127.0.0.1".parse().unwrap(), 69);
/// ```
#[derive(Clone)]
pub struct ServerConfig {
    /// IP address to listen on; transfer connections bind to it too
    pub ip_address: IpAddr,
    /// Port number to listen on (0 picks an ephemeral port)
    pub port: u16,
    /// Deadline for each block exchange with a client
    pub timeout: Duration,
    /// Interval between retransmissions
    pub retry_period: Duration,
}

impl ServerConfig {
    pub fn new(ip_address: IpAddr, port: u16) -> Self {
        Self {
            ip_address,
            port,
            timeout: DEFAULT_RESPONSE_TIMEOUT,
            retry_period: DEFAULT_RETRY_PERIOD,
        }
    }

    /// Set the per-exchange deadline
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the retransmission interval
    pub fn with_retry_period(mut self, retry_period: Duration) -> Self {
        self.retry_period = retry_period;
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        use std::net::Ipv4Addr;

        Self::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), DEFAULT_BIND_PORT)
    }
}

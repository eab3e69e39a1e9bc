use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use crate::core::{DEFAULT_RESPONSE_TIMEOUT, DEFAULT_RETRY_PERIOD, Mode};

/// TFTP client configuration.
///
/// # Example
///
/// ```rust
/// use tftp_kit::client::ClientConfig;
///
/// let config = ClientConfig::new("192.168.1.100".parse().unwrap(), 69);
/// ```
#[derive(Clone)]
pub struct ClientConfig {
    /// Server IP address
    pub server_ip: IpAddr,
    /// Server port number (usually 69)
    pub server_port: u16,
    /// Deadline for each block exchange
    pub timeout: Duration,
    /// Interval between retransmissions
    pub retry_period: Duration,
    /// Transfer mode requested from the server (only octet is served)
    pub mode: Mode,
}

impl ClientConfig {
    pub fn new(server_ip: IpAddr, server_port: u16) -> Self {
        Self {
            server_ip,
            server_port,
            timeout: DEFAULT_RESPONSE_TIMEOUT,
            retry_period: DEFAULT_RETRY_PERIOD,
            mode: Mode::Octet,
        }
    }

    pub fn server_addr(&self) -> SocketAddr {
        SocketAddr::new(self.server_ip, self.server_port)
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

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new("127.0.0.1".parse().unwrap(), 69)
    }
}

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use log::{debug, info};

use super::config::ClientConfig;
use crate::core::{
    CancelToken, Connection, MAX_BLOCK_SIZE, Packet, ReservationRegistry, data_payload, expect_ack,
    expect_data,
};
use crate::error::Result;

/// TFTP client.
///
/// Supports whole-file download ([`get`]) and upload ([`put`]) against a
/// single server. Both transfers are lock-step: one block in flight,
/// each block acknowledged before the next.
///
/// [`get`]: Client::get
/// [`put`]: Client::put
///
/// # Example
///
/// ```rust,no_run
/// use tftp_kit::client::{Client, ClientConfig};
/// use tftp_kit::core::{ReservationRegistry, cancel_pair};
///
/// # async fn example() -> tftp_kit::Result<()> {
/// let config = ClientConfig::new("192.168.1.100".parse().unwrap(), 69);
/// let client = Client::new(config, ReservationRegistry::new());
/// let (_handle, token) = cancel_pair();
///
/// let contents = client.get("remote.txt", &token).await?;
/// client.put("copy.txt", &contents, &token).await?;
/// # Ok(())
/// # }
/// ```
pub struct Client {
    config: ClientConfig,
    registry: ReservationRegistry,
}

impl Client {
    pub fn new(config: ClientConfig, registry: ReservationRegistry) -> Self {
        Self { config, registry }
    }

    /// Download `remote_file` from the server, returning its contents.
    pub async fn get(&self, remote_file: &str, cancel: &CancelToken) -> Result<Vec<u8>> {
        let server = self.config.server_addr();
        info!("reading '{remote_file}' from server {server}");

        let connection = Connection::bind(unspecified_for(server)).await?;
        let mut output = Vec::new();
        let mut block: u16 = 1;

        // The RRQ is answered with DATA block 1 from the ephemeral port
        // the server picked for this transfer.
        let request = Packet::Rrq {
            filename: remote_file.to_string(),
            mode: self.config.mode,
        };
        debug!("sending RRQ for '{remote_file}'");
        let (packet, remote) = connection
            .exchange_to(
                &request,
                server,
                self.config.timeout,
                self.config.retry_period,
                expect_data(block),
                cancel,
            )
            .await?;
        let _reservation = self.registry.reserve(remote)?;
        connection.connect(remote);
        let mut payload = data_payload(packet)?;

        loop {
            debug!("received block {block} ({} bytes)", payload.len());
            output.extend_from_slice(&payload);
            let ack = Packet::Ack { block };
            if payload.len() < MAX_BLOCK_SIZE {
                // Final block: acknowledge once and stop.
                connection.send(&ack).await?;
                break;
            }
            block = block.wrapping_add(1);
            let (packet, _) = connection
                .exchange_to(
                    &ack,
                    remote,
                    self.config.timeout,
                    self.config.retry_period,
                    expect_data(block),
                    cancel,
                )
                .await?;
            payload = data_payload(packet)?;
        }

        info!("read of '{remote_file}' complete ({} bytes)", output.len());
        Ok(output)
    }

    /// Upload `contents` to the server under the name `remote_file`.
    pub async fn put(&self, remote_file: &str, contents: &[u8], cancel: &CancelToken) -> Result<()> {
        let server = self.config.server_addr();
        info!(
            "writing {} bytes to '{remote_file}' on server {server}",
            contents.len()
        );

        let _server_reservation = self.registry.reserve(server)?;
        let connection = Connection::bind(unspecified_for(server)).await?;

        // The WRQ is answered with ACK 0, revealing the server's
        // ephemeral port for this transfer.
        let request = Packet::Wrq {
            filename: remote_file.to_string(),
            mode: self.config.mode,
        };
        debug!("sending WRQ for '{remote_file}'");
        let (_, remote) = connection
            .exchange_to(
                &request,
                server,
                self.config.timeout,
                self.config.retry_period,
                expect_ack(0),
                cancel,
            )
            .await?;
        let _transfer_reservation = self.registry.reserve(remote)?;
        connection.connect(remote);

        let mut block: u16 = 1;
        let mut offset = 0;
        loop {
            let take = (contents.len() - offset).min(MAX_BLOCK_SIZE);
            let chunk = contents[offset..offset + take].to_vec();
            offset += take;
            debug!("sending block {block} ({take} bytes)");
            connection
                .exchange_to(
                    &Packet::Data { block, data: chunk },
                    remote,
                    self.config.timeout,
                    self.config.retry_period,
                    expect_ack(block),
                    cancel,
                )
                .await?;
            // A chunk shorter than the maximum block size, including an
            // empty one, is the final block.
            if take < MAX_BLOCK_SIZE {
                break;
            }
            block = block.wrapping_add(1);
        }

        info!("write of '{remote_file}' complete");
        Ok(())
    }
}

fn unspecified_for(server: SocketAddr) -> SocketAddr {
    let ip: IpAddr = match server.ip() {
        IpAddr::V4(_) => Ipv4Addr::UNSPECIFIED.into(),
        IpAddr::V6(_) => Ipv6Addr::UNSPECIFIED.into(),
    };
    SocketAddr::new(ip, 0)
}

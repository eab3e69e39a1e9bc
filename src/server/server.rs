use std::net::SocketAddr;

use log::{debug, info, warn};
use tokio::task::{JoinHandle, JoinSet};

use super::config::ServerConfig;
use super::store::FileStore;
use crate::core::{
    CancelHandle, CancelToken, Connection, ErrorCode, MAX_BLOCK_SIZE, Mode, Packet,
    ReservationRegistry, cancel_pair, data_payload, expect_ack, expect_data,
};
use crate::error::{Error, Result};

/// A running TFTP server.
///
/// The accept loop listens on the configured request port and spawns an
/// independent handler task per RRQ/WRQ, each on its own ephemeral
/// connection. [`stop`] cancels the accept loop and every in-flight
/// handler, then waits for all of them to finish.
///
/// [`stop`]: Server::stop
pub struct Server {
    local_addr: SocketAddr,
    cancel: CancelHandle,
    listener_task: JoinHandle<()>,
    store: FileStore,
}

impl Server {
    /// Bind the request port and start the accept loop.
    pub async fn spawn(
        config: ServerConfig,
        registry: ReservationRegistry,
        store: FileStore,
    ) -> Result<Server> {
        let listener = Connection::bind(SocketAddr::new(config.ip_address, config.port)).await?;
        let local_addr = listener.local_addr()?;
        info!("TFTP server listening on {local_addr}");
        let (cancel, token) = cancel_pair();
        let listener_task = tokio::spawn(accept_loop(
            listener,
            config,
            registry,
            store.clone(),
            token,
        ));
        Ok(Server {
            local_addr,
            cancel,
            listener_task,
            store,
        })
    }

    /// The bound request endpoint (useful when the port was 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Handle to the store this server serves from and commits to.
    pub fn store(&self) -> &FileStore {
        &self.store
    }

    /// Stop accepting requests, cancel in-flight transfers, and wait for
    /// the accept loop and every handler to return.
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.listener_task.await {
            warn!("listener task failed: {e}");
        }
    }
}

/// Accept only octet-mode read and write requests. Everything else is
/// logged and dropped without a wire reply; this deviates from RFC 1350,
/// which answers bad requests with an ERROR packet, and is kept as an
/// explicit policy choice.
fn accept_request(packet: &Packet) -> bool {
    match packet {
        Packet::Rrq {
            mode: Mode::Octet, ..
        }
        | Packet::Wrq {
            mode: Mode::Octet, ..
        } => true,
        Packet::Rrq { mode, .. } | Packet::Wrq { mode, .. } => {
            warn!("rejecting request with unsupported mode '{mode}'");
            false
        }
        other => {
            warn!("request listener received non-request {} packet", other.op());
            false
        }
    }
}

async fn accept_loop(
    listener: Connection,
    config: ServerConfig,
    registry: ReservationRegistry,
    store: FileStore,
    cancel: CancelToken,
) {
    let mut handlers = JoinSet::new();
    loop {
        let accepted = listener.receive(accept_request, &cancel).await;
        while handlers.try_join_next().is_some() {}
        match accepted {
            Ok((request, from)) => {
                let config = config.clone();
                let registry = registry.clone();
                let store = store.clone();
                let token = cancel.clone();
                handlers.spawn(async move {
                    match handle_request(request, from, config, registry, store, token).await {
                        Ok(()) => {}
                        Err(Error::Cancelled) => info!("transfer with {from} cancelled"),
                        Err(e) => warn!("request from {from} failed: {e}"),
                    }
                });
            }
            Err(Error::Cancelled) => break,
            Err(e) => {
                warn!("request listener stopping: {e}");
                break;
            }
        }
    }
    if !handlers.is_empty() {
        info!("waiting for {} in-flight transfer(s)", handlers.len());
    }
    while handlers.join_next().await.is_some() {}
    info!("TFTP server stopped");
}

async fn handle_request(
    request: Packet,
    client: SocketAddr,
    config: ServerConfig,
    registry: ReservationRegistry,
    store: FileStore,
    cancel: CancelToken,
) -> Result<()> {
    match request {
        Packet::Rrq { filename, .. } => {
            serve_read(&filename, client, &config, &registry, &store, &cancel).await
        }
        Packet::Wrq { filename, .. } => {
            serve_write(&filename, client, &config, &registry, &store, &cancel).await
        }
        other => Err(Error::Protocol {
            expected: "RRQ or WRQ",
            received: other.op(),
        }),
    }
}

/// Stream the named file to `client` in lock-step blocks.
async fn serve_read(
    filename: &str,
    client: SocketAddr,
    config: &ServerConfig,
    registry: &ReservationRegistry,
    store: &FileStore,
    cancel: &CancelToken,
) -> Result<()> {
    info!("RRQ for '{filename}' from {client}");
    let _reservation = registry.reserve(client)?;
    let connection = Connection::bind(SocketAddr::new(config.ip_address, 0)).await?;
    connection.connect(client);

    let Some(contents) = store.read(filename) else {
        let message = format!("could not find file '{filename}'");
        warn!("{message}");
        connection
            .send(&Packet::Error {
                code: ErrorCode::FileNotFound,
                message,
            })
            .await?;
        return Ok(());
    };

    let mut block: u16 = 1;
    let mut offset = 0;
    loop {
        let take = (contents.len() - offset).min(MAX_BLOCK_SIZE);
        let chunk = contents[offset..offset + take].to_vec();
        offset += take;
        debug!("sending block {block} ({take} bytes) to {client}");
        connection
            .exchange_to(
                &Packet::Data { block, data: chunk },
                client,
                config.timeout,
                config.retry_period,
                expect_ack(block),
                cancel,
            )
            .await?;
        if take < MAX_BLOCK_SIZE {
            break;
        }
        block = block.wrapping_add(1);
    }
    info!("finished sending '{filename}' to {client}");
    Ok(())
}

/// Accumulate lock-step blocks from `client`, then commit the buffer
/// under the requested name.
async fn serve_write(
    filename: &str,
    client: SocketAddr,
    config: &ServerConfig,
    registry: &ReservationRegistry,
    store: &FileStore,
    cancel: &CancelToken,
) -> Result<()> {
    info!("WRQ for '{filename}' from {client}");
    let _reservation = registry.reserve(client)?;
    let connection = Connection::bind(SocketAddr::new(config.ip_address, 0)).await?;
    connection.connect(client);

    let mut received = Vec::new();
    let mut block: u16 = 1;
    // ACK 0 acknowledges the WRQ itself; data blocks start at 1.
    let mut ack = Packet::Ack { block: 0 };
    loop {
        let (packet, _) = connection
            .exchange_to(
                &ack,
                client,
                config.timeout,
                config.retry_period,
                expect_data(block),
                cancel,
            )
            .await?;
        let payload = data_payload(packet)?;
        debug!("received block {block} ({} bytes) from {client}", payload.len());
        let last = payload.len() < MAX_BLOCK_SIZE;
        received.extend_from_slice(&payload);
        ack = Packet::Ack { block };
        if last {
            let total = received.len();
            if store.insert_if_absent(filename, received) {
                connection.send(&ack).await?;
                info!("stored '{filename}' ({total} bytes) from {client}");
            } else {
                let message = format!("file '{filename}' already exists");
                warn!("{message}");
                connection
                    .send(&Packet::Error {
                        code: ErrorCode::FileAlreadyExists,
                        message,
                    })
                    .await?;
            }
            break;
        }
        block = block.wrapping_add(1);
    }
    Ok(())
}

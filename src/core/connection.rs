//! UDP packet transport and the reliable request/response exchange.
//!
//! A [`Connection`] owns one UDP socket and a background receive loop
//! that runs for the connection's whole lifetime. The loop decodes each
//! inbound datagram, applies the currently armed receive filter, guards
//! against datagrams from the wrong source once a peer is pinned, and
//! deposits at most one matched packet into a capacity-one mailbox.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{debug, warn};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;

use crate::core::cancel::CancelToken;
use crate::core::packet::{ErrorCode, Packet};
use crate::error::{Error, Result};

/// Interval between retransmissions of an unanswered packet.
pub const DEFAULT_RETRY_PERIOD: Duration = Duration::from_millis(200);

/// Deadline for receiving a matching response.
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(10);

type Filter = Box<dyn Fn(&Packet) -> bool + Send>;

/// Filter matching a DATA packet with the given block number.
pub fn expect_data(block: u16) -> impl Fn(&Packet) -> bool + Send + 'static {
    move |packet| matches!(packet, Packet::Data { block: b, .. } if *b == block)
}

/// Filter matching an ACK packet with the given block number.
pub fn expect_ack(block: u16) -> impl Fn(&Packet) -> bool + Send + 'static {
    move |packet| matches!(packet, Packet::Ack { block: b } if *b == block)
}

/// Extract the payload of a DATA packet obtained through a
/// [`expect_data`] filter.
pub(crate) fn data_payload(packet: Packet) -> Result<Vec<u8>> {
    match packet {
        Packet::Data { data, .. } => Ok(data),
        other => Err(Error::Protocol {
            expected: "DATA",
            received: other.op(),
        }),
    }
}

pub struct Connection {
    socket: Arc<UdpSocket>,
    peer: Arc<Mutex<Option<SocketAddr>>>,
    filter: Arc<Mutex<Option<Filter>>>,
    inbox: tokio::sync::Mutex<mpsc::Receiver<(Packet, SocketAddr)>>,
    recv_task: JoinHandle<()>,
}

impl Connection {
    /// Bind a UDP socket (port 0 picks an ephemeral port) and start the
    /// background receive loop.
    pub async fn bind(addr: SocketAddr) -> Result<Connection> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        debug!("opened connection on port {}", socket.local_addr()?.port());
        let peer = Arc::new(Mutex::new(None));
        let filter: Arc<Mutex<Option<Filter>>> = Arc::new(Mutex::new(None));
        let (deposits, inbox) = mpsc::channel(1);
        let recv_task = tokio::spawn(receive_loop(
            socket.clone(),
            filter.clone(),
            peer.clone(),
            deposits,
        ));
        Ok(Connection {
            socket,
            peer,
            filter,
            inbox: tokio::sync::Mutex::new(inbox),
            recv_task,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Pin this connection to one remote endpoint. Afterwards [`send`]
    /// targets that peer and datagrams from any other source are answered
    /// with `Error(UnknownTransferId)` and dropped.
    ///
    /// [`send`]: Connection::send
    pub fn connect(&self, remote: SocketAddr) {
        debug!(
            "connecting port {} to {}",
            self.socket.local_addr().map(|a| a.port()).unwrap_or(0),
            remote
        );
        *self.peer.lock().unwrap() = Some(remote);
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        *self.peer.lock().unwrap()
    }

    /// Send a packet to the pinned peer.
    pub async fn send(&self, packet: &Packet) -> Result<()> {
        let peer = self.peer().ok_or(Error::AddressRequired)?;
        self.send_to(packet, peer).await
    }

    pub async fn send_to(&self, packet: &Packet, dest: SocketAddr) -> Result<()> {
        self.socket.send_to(&packet.encode(), dest).await?;
        Ok(())
    }

    /// Arm `filter` and block until the receive loop deposits a matching
    /// packet, or until `cancel` fires.
    ///
    /// Any deposit left over from a previous wait that was abandoned
    /// (timed out or cancelled) is discarded before the filter is armed.
    pub async fn receive<F>(&self, filter: F, cancel: &CancelToken) -> Result<(Packet, SocketAddr)>
    where
        F: Fn(&Packet) -> bool + Send + 'static,
    {
        let mut inbox = self.inbox.lock().await;
        while inbox.try_recv().is_ok() {}
        *self.filter.lock().unwrap() = Some(Box::new(filter));
        let received = tokio::select! {
            received = inbox.recv() => received,
            _ = cancel.cancelled() => {
                *self.filter.lock().unwrap() = None;
                return Err(Error::Cancelled);
            }
        };
        *self.filter.lock().unwrap() = None;
        received.ok_or(Error::Closed)
    }

    /// [`exchange_to`] against the pinned peer with the default timeout
    /// and retry period.
    ///
    /// [`exchange_to`]: Connection::exchange_to
    pub async fn exchange<F>(
        &self,
        packet: &Packet,
        filter: F,
        cancel: &CancelToken,
    ) -> Result<(Packet, SocketAddr)>
    where
        F: Fn(&Packet) -> bool + Send + 'static,
    {
        let dest = self.peer().ok_or(Error::AddressRequired)?;
        self.exchange_to(
            packet,
            dest,
            DEFAULT_RESPONSE_TIMEOUT,
            DEFAULT_RETRY_PERIOD,
            filter,
            cancel,
        )
        .await
    }

    /// Repeatedly send `packet` to `dest` every `retry_period` while
    /// waiting for a response matching `filter`.
    ///
    /// The packet is serialized once; every retransmission resends those
    /// exact bytes. Resolution is whichever comes first:
    /// a matching response, the caller's cancellation (`Error::Cancelled`),
    /// or the deadline (`Error::Timeout`). When both the deadline and the
    /// caller's token have fired, the caller's cancellation wins.
    /// Retransmission never outlives this call.
    pub async fn exchange_to<F>(
        &self,
        packet: &Packet,
        dest: SocketAddr,
        timeout: Duration,
        retry_period: Duration,
        filter: F,
        cancel: &CancelToken,
    ) -> Result<(Packet, SocketAddr)>
    where
        F: Fn(&Packet) -> bool + Send + 'static,
    {
        let bytes = packet.encode();
        let resend = async {
            loop {
                if let Err(e) = self.socket.send_to(&bytes, dest).await {
                    return Error::from(e);
                }
                sleep(retry_period).await;
                debug!("re-sending {} to {}", packet.op(), dest);
            }
        };
        tokio::select! {
            received = self.receive(filter, cancel) => received,
            send_error = resend => Err(send_error),
            _ = sleep(timeout) => {
                if cancel.is_cancelled() {
                    Err(Error::Cancelled)
                } else {
                    Err(Error::Timeout(timeout))
                }
            }
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.recv_task.abort();
    }
}

async fn receive_loop(
    socket: Arc<UdpSocket>,
    filter: Arc<Mutex<Option<Filter>>>,
    peer: Arc<Mutex<Option<SocketAddr>>>,
    deposits: mpsc::Sender<(Packet, SocketAddr)>,
) {
    let mut buf = vec![0u8; 65536];
    loop {
        let (len, from) = match socket.recv_from(&mut buf).await {
            Ok(received) => received,
            Err(e) => {
                debug!("receive loop stopping: {e}");
                return;
            }
        };
        let packet = match Packet::decode(&buf[..len]) {
            Ok(packet) => packet,
            Err(e) => {
                warn!("dropping undecodable datagram from {from}: {e}");
                continue;
            }
        };
        let wanted = match &*filter.lock().unwrap() {
            Some(filter) => filter(&packet),
            None => false,
        };
        if !wanted {
            debug!("ignoring unwanted {} from {from}", packet.op());
            continue;
        }
        let expected = *peer.lock().unwrap();
        if let Some(expected) = expected {
            if from != expected {
                warn!(
                    "{} received from {from}, but this connection is bound to {expected}",
                    packet.op()
                );
                let reply = Packet::Error {
                    code: ErrorCode::UnknownTransferId,
                    message: "unexpected source endpoint".to_string(),
                };
                if let Err(e) = socket.send_to(&reply.encode(), from).await {
                    warn!("failed to reply to {from}: {e}");
                }
                continue;
            }
        }
        if deposits.try_send((packet, from)).is_err() {
            warn!("dropping matched packet from {from}: previous match not yet consumed");
        }
    }
}

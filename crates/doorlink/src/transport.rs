// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! UDP endpoint shared by every client.
//!
//! One socket bound to an ephemeral port both sends COMMAND datagrams to
//! the hub and receives its replies. The receive loop resolves FEEDBACK
//! through the correlation table and broadcasts everything else.

use crate::correlation::CorrelationTable;
use crate::error::{BridgeError, BridgeResult};
use crate::fanout::ClientRegistry;
use crate::messages::ServerMessage;
use crate::protocol::{datagram_text, decode_line, encode, InboundMessage, OutboundCommand};
use crate::stats::BridgeStats;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::{watch, OnceCell};
use tracing::{debug, info, warn};

/// Largest datagram read from the hub.
const MAX_DATAGRAM: usize = 2048;

struct Endpoint {
    socket: Arc<UdpSocket>,
    hub: SocketAddr,
    local: SocketAddr,
}

/// The bridge's single datagram endpoint.
pub struct HubTransport {
    bind_address: IpAddr,
    endpoint: OnceCell<Endpoint>,
    table: Arc<CorrelationTable>,
    clients: Arc<ClientRegistry>,
    stats: Arc<BridgeStats>,
    shutdown: watch::Receiver<bool>,
}

impl HubTransport {
    pub fn new(
        bind_address: IpAddr,
        table: Arc<CorrelationTable>,
        clients: Arc<ClientRegistry>,
        stats: Arc<BridgeStats>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            bind_address,
            endpoint: OnceCell::new(),
            table,
            clients,
            stats,
            shutdown,
        }
    }

    /// Bind the endpoint and spawn the receive loop.
    ///
    /// Idempotent: later calls (even concurrent ones) return the address of
    /// the endpoint opened by the first.
    pub async fn start(&self, hub: SocketAddr) -> BridgeResult<SocketAddr> {
        let endpoint = self
            .endpoint
            .get_or_try_init(|| async {
                let socket = UdpSocket::bind(SocketAddr::new(self.bind_address, 0)).await?;
                let local = socket.local_addr()?;
                let socket = Arc::new(socket);
                info!("UDP endpoint {} -> hub {}", local, hub);

                tokio::spawn(receive_loop(
                    socket.clone(),
                    self.table.clone(),
                    self.clients.clone(),
                    self.stats.clone(),
                    self.shutdown.clone(),
                ));

                Ok::<_, BridgeError>(Endpoint { socket, hub, local })
            })
            .await?;

        if endpoint.hub != hub {
            warn!(
                "Transport already bound for hub {}, ignoring {}",
                endpoint.hub, hub
            );
        }
        Ok(endpoint.local)
    }

    pub fn is_started(&self) -> bool {
        self.endpoint.initialized()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.endpoint.get().map(|e| e.local)
    }

    pub fn hub_addr(&self) -> Option<SocketAddr> {
        self.endpoint.get().map(|e| e.hub)
    }

    /// Encode and send a command. No retry.
    pub async fn send(&self, cmd: &OutboundCommand) -> BridgeResult<usize> {
        let bytes = encode(cmd)?;
        let sent = self.send_bytes(&bytes).await?;
        debug!("Sent COMMAND -> {}", cmd);
        Ok(sent)
    }

    /// Send text to the hub unchanged.
    pub async fn send_raw(&self, text: &str) -> BridgeResult<usize> {
        let sent = self.send_bytes(text.as_bytes()).await?;
        debug!("Sent raw -> {}", text.trim_end());
        Ok(sent)
    }

    async fn send_bytes(&self, bytes: &[u8]) -> BridgeResult<usize> {
        let endpoint = self.endpoint.get().ok_or(BridgeError::NotStarted)?;
        Ok(endpoint.socket.send_to(bytes, endpoint.hub).await?)
    }
}

async fn receive_loop(
    socket: Arc<UdpSocket>,
    table: Arc<CorrelationTable>,
    clients: Arc<ClientRegistry>,
    stats: Arc<BridgeStats>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut buf = vec![0u8; MAX_DATAGRAM];

    loop {
        if *shutdown.borrow() {
            break;
        }

        tokio::select! {
            result = socket.recv_from(&mut buf) => {
                match result {
                    Ok((len, from)) => {
                        debug!("UDP rx from {} ({} bytes)", from, len);
                        dispatch_inbound(&buf[..len], &table, &clients, &stats);
                    }
                    Err(e) => {
                        // ICMP unreachable from an earlier send surfaces here
                        warn!("UDP receive error: {}", e);
                    }
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    debug!("UDP receive loop stopped");
}

/// Route one inbound datagram.
///
/// Matched FEEDBACK is consumed by its pending command; unmatched FEEDBACK
/// is dropped. Everything else is broadcast.
pub(crate) fn dispatch_inbound(
    datagram: &[u8],
    table: &CorrelationTable,
    clients: &ClientRegistry,
    stats: &BridgeStats,
) {
    BridgeStats::bump(&stats.datagrams_received);

    let line = datagram_text(datagram);
    let message = decode_line(&line);

    match message {
        InboundMessage::Feedback(feedback) => {
            let command_id = feedback.command_id;
            match table.resolve(feedback) {
                Some(request) => {
                    BridgeStats::bump(&stats.feedback_matched);
                    debug!(
                        "FEEDBACK for command {} matched ({:?})",
                        command_id, request.requester
                    );
                }
                None => {
                    BridgeStats::bump(&stats.feedback_dropped);
                    debug!(
                        "FEEDBACK for command {} has no pending request, dropped",
                        command_id
                    );
                }
            }
        }
        other => {
            if let Some(msg) = ServerMessage::unsolicited(&other, &line) {
                BridgeStats::bump(&stats.unsolicited);
                let delivered = clients.broadcast(msg);
                debug!(
                    "{} from hub broadcast to {} client(s)",
                    other.kind(),
                    delivered
                );
            }
        }
    }
}

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The bridge context.
//!
//! [`HubBridge`] is built once at startup and shared through an `Arc` by
//! every WebSocket session, the UDP receive loop and the status poller. It
//! owns the command-id counter, the correlation table, the client registry
//! and the hub transport.

use crate::config::{BridgeConfig, ConfigError};
use crate::correlation::CorrelationTable;
use crate::error::{BridgeError, BridgeResult};
use crate::fanout::{ClientRegistry, SessionId};
use crate::messages::ServerMessage;
use crate::poller;
use crate::protocol::CommandId;
use crate::stats::{BridgeStats, BridgeStatsSnapshot};
use crate::transport::HubTransport;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// Bridge between WebSocket clients and the UDP door hub.
pub struct HubBridge {
    pub(crate) config: BridgeConfig,
    pub(crate) table: Arc<CorrelationTable>,
    pub(crate) clients: Arc<ClientRegistry>,
    pub(crate) stats: Arc<BridgeStats>,
    pub(crate) transport: HubTransport,
    bind_address: IpAddr,
    next_command_id: AtomicU64,
    poller_started: AtomicBool,
    shutdown_tx: watch::Sender<bool>,
}

impl HubBridge {
    /// Build a bridge from a validated configuration. Nothing is bound yet.
    pub fn new(config: BridgeConfig) -> BridgeResult<Arc<Self>> {
        config.validate()?;
        let bind_address: IpAddr = config.bind_address.parse().map_err(|_| {
            ConfigError::Invalid(format!("bind_address '{}'", config.bind_address))
        })?;

        let table = Arc::new(CorrelationTable::new());
        let clients = Arc::new(ClientRegistry::new(config.client_queue_depth));
        let stats = Arc::new(BridgeStats::new());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let transport = HubTransport::new(
            bind_address,
            table.clone(),
            clients.clone(),
            stats.clone(),
            shutdown_rx,
        );

        Ok(Arc::new(Self {
            config,
            table,
            clients,
            stats,
            transport,
            bind_address,
            next_command_id: AtomicU64::new(1),
            poller_started: AtomicBool::new(false),
            shutdown_tx,
        }))
    }

    /// Open the hub endpoint and start the poller (if configured).
    ///
    /// Safe to call more than once; returns the local UDP address.
    pub async fn start(self: &Arc<Self>) -> BridgeResult<SocketAddr> {
        let local = self.start_transport().await?;

        if let Some(interval) = self.config.poll_interval() {
            if !self.poller_started.swap(true, Ordering::SeqCst) {
                tokio::spawn(poller::run(
                    Arc::clone(self),
                    interval,
                    self.shutdown_signal(),
                ));
            }
        }

        Ok(local)
    }

    /// Open the hub endpoint only. Called lazily before the first send.
    pub(crate) async fn start_transport(&self) -> BridgeResult<SocketAddr> {
        if self.is_shut_down() {
            return Err(BridgeError::Shutdown);
        }
        if let Some(local) = self.transport.local_addr() {
            return Ok(local);
        }
        let hub = self.resolve_hub().await?;
        self.transport.start(hub).await
    }

    async fn resolve_hub(&self) -> BridgeResult<SocketAddr> {
        let endpoint = self.config.hub_endpoint();
        let addrs: Vec<SocketAddr> = match tokio::net::lookup_host(endpoint.clone()).await {
            Ok(addrs) => addrs.collect(),
            Err(e) => {
                warn!("Hub lookup for {} failed: {}", endpoint, e);
                return Err(BridgeError::HubAddress(endpoint));
            }
        };

        // Prefer an address the local endpoint can reach.
        addrs
            .iter()
            .find(|addr| addr.is_ipv4() == self.bind_address.is_ipv4())
            .or_else(|| addrs.first())
            .copied()
            .ok_or(BridgeError::HubAddress(endpoint))
    }

    /// Stop the receive loop and poller, and drop every pending command.
    pub fn shutdown(&self) {
        if self.shutdown_tx.send_replace(true) {
            return;
        }
        let cancelled = self.table.cancel_all();
        info!(
            "Bridge shut down ({} pending command(s) cancelled)",
            cancelled
        );
    }

    pub fn is_shut_down(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    /// Receiver that flips to `true` on shutdown.
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    /// Allocate the next command id. Starts at 1, never reused.
    pub fn next_command_id(&self) -> CommandId {
        CommandId(self.next_command_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Register a client and queue its welcome message.
    pub fn connect(&self) -> (SessionId, mpsc::Receiver<ServerMessage>) {
        let (id, rx) = self.clients.connect();
        self.clients
            .send_to(id, ServerMessage::welcome(self.config.hub_endpoint()));
        info!("[{}] Client connected ({} total)", id, self.clients.len());
        (id, rx)
    }

    /// Forget a client and cancel its pending commands without delivery.
    pub fn disconnect(&self, id: SessionId) -> usize {
        let cancelled = self.table.cancel_session(id);
        self.clients.disconnect(id);
        if cancelled > 0 {
            debug!("[{}] Cancelled {} pending command(s)", id, cancelled);
        }
        info!("[{}] Client disconnected ({} left)", id, self.clients.len());
        cancelled
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn clients(&self) -> &ClientRegistry {
        &self.clients
    }

    pub fn table(&self) -> &CorrelationTable {
        &self.table
    }

    pub fn stats(&self) -> BridgeStatsSnapshot {
        self.stats.snapshot()
    }

    /// Configured hub endpoint (`host:port`).
    pub fn hub_endpoint(&self) -> String {
        self.config.hub_endpoint()
    }

    /// Local UDP address once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.transport.local_addr()
    }

    /// Resolved hub address once started.
    pub fn hub_addr(&self) -> Option<SocketAddr> {
        self.transport.hub_addr()
    }
}

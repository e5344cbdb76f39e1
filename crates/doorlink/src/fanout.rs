// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Connected clients and message fan-out.
//!
//! Each client is an opaque [`SessionId`] plus a bounded outbound queue.
//! Pushes never wait: a full or closed queue is logged and skipped so a
//! slow browser cannot stall the datagram receive loop or other clients.

use crate::correlation::Requester;
use crate::messages::ServerMessage;
use crate::status::{DoorStatus, DoorStatusCache};
use dashmap::DashMap;
use std::fmt;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};
use uuid::Uuid;

/// Opaque client identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form for logs
        write!(f, "{}", &self.0.simple().to_string()[..8])
    }
}

struct ClientHandle {
    tx: mpsc::Sender<ServerMessage>,
    doors: DoorStatusCache,
}

/// Registry of connected clients.
pub struct ClientRegistry {
    clients: DashMap<SessionId, ClientHandle>,
    queue_depth: usize,
}

impl ClientRegistry {
    /// Create a registry whose clients get queues of `queue_depth` messages.
    pub fn new(queue_depth: usize) -> Self {
        Self {
            clients: DashMap::new(),
            queue_depth: queue_depth.max(1),
        }
    }

    /// Register a client; the receiver feeds its connection writer.
    pub fn connect(&self) -> (SessionId, mpsc::Receiver<ServerMessage>) {
        let id = SessionId::new();
        let (tx, rx) = mpsc::channel(self.queue_depth);
        self.clients.insert(
            id,
            ClientHandle {
                tx,
                doors: DoorStatusCache::new(),
            },
        );
        (id, rx)
    }

    /// Remove a client. Returns false if it was not registered.
    pub fn disconnect(&self, id: SessionId) -> bool {
        self.clients.remove(&id).is_some()
    }

    /// Push a message to one client.
    pub fn send_to(&self, id: SessionId, msg: ServerMessage) -> bool {
        let Some(client) = self.clients.get(&id) else {
            debug!("[{}] Dropping {}: client gone", id, msg.event_name());
            return false;
        };
        Self::push(id, &client.tx, msg)
    }

    /// Push a message to every client. Returns how many accepted it.
    pub fn broadcast(&self, msg: ServerMessage) -> usize {
        let mut delivered = 0;
        for client in self.clients.iter() {
            if Self::push(*client.key(), &client.tx, msg.clone()) {
                delivered += 1;
            }
        }
        delivered
    }

    /// Deliver to a requester: its own session, or everyone.
    pub fn deliver(&self, requester: Requester, msg: ServerMessage) -> usize {
        match requester {
            Requester::Session(id) => usize::from(self.send_to(id, msg)),
            Requester::Broadcast => self.broadcast(msg),
        }
    }

    /// Merge FEEDBACK text into a client's door cache.
    pub fn update_door_status(&self, id: SessionId, module_id: &str, action: &str) -> DoorStatus {
        match self.clients.get_mut(&id) {
            Some(mut client) => client.doors.update(module_id, action),
            None => {
                let mut status = DoorStatus::default();
                status.apply(action);
                status
            }
        }
    }

    pub fn contains(&self, id: SessionId) -> bool {
        self.clients.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    fn push(id: SessionId, tx: &mpsc::Sender<ServerMessage>, msg: ServerMessage) -> bool {
        let name = msg.event_name();
        match tx.try_send(msg) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!("[{}] Outbound queue full, dropping {}", id, name);
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!("[{}] Outbound queue closed, dropping {}", id, name);
                false
            }
        }
    }
}

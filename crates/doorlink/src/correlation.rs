// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Correlation of outstanding commands with hub FEEDBACK.
//!
//! Each registered command owns a one-shot reply channel and an expiry
//! timer. Whichever of FEEDBACK, timeout, send failure or cancellation
//! removes the entry from the map first decides the outcome; the others
//! find nothing and do nothing.
//!
//! ```text
//!             resolve()          +----------+
//!          +-------------------> | Resolved |
//!          |                     +----------+
//!  +---------+  timer / expire() +----------+
//!  | Pending | ----------------> | Expired  |
//!  +---------+                   +----------+
//!          |  fail() / cancel_*  +----------+
//!          +-------------------> | Failed / |
//!                                | Cancelled|
//!                                +----------+
//! ```

use crate::error::{BridgeError, BridgeResult};
use crate::fanout::SessionId;
use crate::protocol::{CommandId, Feedback};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tracing::debug;

/// Who receives the outcome of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Requester {
    /// One connected client.
    Session(SessionId),
    /// Every connected client (poller, requester-less sends).
    Broadcast,
}

/// A command waiting for FEEDBACK.
#[derive(Debug, Clone)]
pub struct PendingRequest {
    pub command_id: CommandId,
    pub requester: Requester,
    pub deadline: Instant,
}

/// Final outcome of a pending command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Feedback(Feedback),
    TimedOut,
    Failed(String),
    /// Entry dropped without delivery (client gone or shutdown).
    Cancelled,
}

struct PendingEntry {
    request: PendingRequest,
    reply: oneshot::Sender<Resolution>,
    expiry: AbortHandle,
}

/// Single-resolution handle returned by [`CorrelationTable::register`].
#[derive(Debug)]
pub struct PendingReply {
    request: PendingRequest,
    rx: oneshot::Receiver<Resolution>,
}

impl PendingReply {
    pub fn command_id(&self) -> CommandId {
        self.request.command_id
    }

    pub fn requester(&self) -> Requester {
        self.request.requester
    }

    /// Wait for the outcome. Resolves exactly once.
    pub async fn wait(self) -> Resolution {
        self.rx.await.unwrap_or(Resolution::Cancelled)
    }
}

/// Outstanding commands keyed by command id.
#[derive(Default)]
pub struct CorrelationTable {
    pending: DashMap<CommandId, PendingEntry>,
}

impl CorrelationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a command and arm its expiry timer.
    ///
    /// Must be called from within a tokio runtime.
    pub fn register(
        self: &Arc<Self>,
        command_id: CommandId,
        requester: Requester,
        timeout: Duration,
    ) -> BridgeResult<PendingReply> {
        match self.pending.entry(command_id) {
            Entry::Occupied(_) => Err(BridgeError::DuplicateCommandId(command_id)),
            Entry::Vacant(slot) => {
                let (tx, rx) = oneshot::channel();
                let request = PendingRequest {
                    command_id,
                    requester,
                    deadline: Instant::now() + timeout,
                };

                let table = Arc::downgrade(self);
                let expiry = tokio::spawn(async move {
                    tokio::time::sleep(timeout).await;
                    if let Some(table) = table.upgrade() {
                        if table.expire(command_id).is_some() {
                            debug!("Command {} expired", command_id);
                        }
                    }
                })
                .abort_handle();

                slot.insert(PendingEntry {
                    request: request.clone(),
                    reply: tx,
                    expiry,
                });

                Ok(PendingReply { request, rx })
            }
        }
    }

    /// Hand FEEDBACK to its pending command.
    ///
    /// Returns `None` for late or unknown command ids.
    pub fn resolve(&self, feedback: Feedback) -> Option<PendingRequest> {
        let command_id = feedback.command_id;
        self.finish(command_id, Resolution::Feedback(feedback))
    }

    /// Expire a command whose deadline has passed.
    pub fn expire(&self, command_id: CommandId) -> Option<PendingRequest> {
        self.finish(command_id, Resolution::TimedOut)
    }

    /// Fail a command, e.g. when its datagram could not be sent.
    pub fn fail(&self, command_id: CommandId, reason: impl Into<String>) -> Option<PendingRequest> {
        self.finish(command_id, Resolution::Failed(reason.into()))
    }

    /// Drop one command without delivering anything.
    pub fn cancel(&self, command_id: CommandId) -> Option<PendingRequest> {
        let (_, entry) = self.pending.remove(&command_id)?;
        entry.expiry.abort();
        Some(entry.request)
    }

    /// Drop every command issued by `session`. Other sessions are untouched.
    pub fn cancel_session(&self, session: SessionId) -> usize {
        let mut cancelled = 0;
        self.pending.retain(|_, entry| {
            if entry.request.requester == Requester::Session(session) {
                entry.expiry.abort();
                cancelled += 1;
                false
            } else {
                true
            }
        });
        cancelled
    }

    /// Drop every command (shutdown).
    pub fn cancel_all(&self) -> usize {
        let mut cancelled = 0;
        self.pending.retain(|_, entry| {
            entry.expiry.abort();
            cancelled += 1;
            false
        });
        cancelled
    }

    pub fn contains(&self, command_id: CommandId) -> bool {
        self.pending.contains_key(&command_id)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    fn finish(&self, command_id: CommandId, resolution: Resolution) -> Option<PendingRequest> {
        let (_, entry) = self.pending.remove(&command_id)?;
        entry.expiry.abort();
        // Receiver may be gone if its delivery task was aborted.
        drop(entry.reply.send(resolution));
        Some(entry.request)
    }
}

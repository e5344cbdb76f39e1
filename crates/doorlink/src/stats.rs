// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Bridge statistics.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Counters updated by the transport, router and poller.
#[derive(Debug)]
pub struct BridgeStats {
    /// COMMAND datagrams sent.
    pub commands_sent: AtomicU64,

    /// Raw datagrams sent on behalf of clients.
    pub raw_sent: AtomicU64,

    /// Datagrams received from the hub.
    pub datagrams_received: AtomicU64,

    /// FEEDBACK matched to a pending command.
    pub feedback_matched: AtomicU64,

    /// FEEDBACK with no pending command (late, duplicate or unknown).
    pub feedback_dropped: AtomicU64,

    /// Commands that got no FEEDBACK in time.
    pub timeouts: AtomicU64,

    /// Encoding or transport failures.
    pub send_errors: AtomicU64,

    /// EVENT / HEARTBEAT / HELLO / raw messages fanned out.
    pub unsolicited: AtomicU64,

    /// Bridge creation time.
    pub created: Instant,
}

impl BridgeStats {
    pub fn new() -> Self {
        Self {
            commands_sent: AtomicU64::new(0),
            raw_sent: AtomicU64::new(0),
            datagrams_received: AtomicU64::new(0),
            feedback_matched: AtomicU64::new(0),
            feedback_dropped: AtomicU64::new(0),
            timeouts: AtomicU64::new(0),
            send_errors: AtomicU64::new(0),
            unsolicited: AtomicU64::new(0),
            created: Instant::now(),
        }
    }

    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot of current stats.
    pub fn snapshot(&self) -> BridgeStatsSnapshot {
        BridgeStatsSnapshot {
            commands_sent: self.commands_sent.load(Ordering::Relaxed),
            raw_sent: self.raw_sent.load(Ordering::Relaxed),
            datagrams_received: self.datagrams_received.load(Ordering::Relaxed),
            feedback_matched: self.feedback_matched.load(Ordering::Relaxed),
            feedback_dropped: self.feedback_dropped.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            send_errors: self.send_errors.load(Ordering::Relaxed),
            unsolicited: self.unsolicited.load(Ordering::Relaxed),
            uptime_secs: self.created.elapsed().as_secs(),
        }
    }
}

impl Default for BridgeStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of bridge statistics.
#[derive(Debug, Clone, Serialize)]
pub struct BridgeStatsSnapshot {
    pub commands_sent: u64,
    pub raw_sent: u64,
    pub datagrams_received: u64,
    pub feedback_matched: u64,
    pub feedback_dropped: u64,
    pub timeouts: u64,
    pub send_errors: u64,
    pub unsolicited: u64,
    pub uptime_secs: u64,
}

impl BridgeStatsSnapshot {
    /// Share of sent commands that never got FEEDBACK.
    pub fn timeout_ratio(&self) -> f64 {
        if self.commands_sent > 0 {
            self.timeouts as f64 / self.commands_sent as f64
        } else {
            0.0
        }
    }
}

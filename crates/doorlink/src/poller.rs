// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Periodic STATUS poll.
//!
//! Polls have no requester: FEEDBACK and timeouts go to every client.

use crate::bridge::HubBridge;
use crate::correlation::Requester;
use crate::router::CommandCall;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

/// Send STATUS to every configured module each `period` until shutdown.
pub(crate) async fn run(bridge: Arc<HubBridge>, period: Duration, mut shutdown: watch::Receiver<bool>) {
    let modules = bridge.config().poll_modules.clone();
    info!("Polling {:?} every {:?}", modules, period);

    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        if *shutdown.borrow() {
            break;
        }

        tokio::select! {
            _ = interval.tick() => {
                poll_once(&bridge, &modules).await;
            }
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    debug!("Poller stopped");
}

async fn poll_once(bridge: &HubBridge, modules: &[String]) {
    for module in modules {
        // Failures are broadcast by the router.
        if let Err(e) = bridge
            .send_command(Requester::Broadcast, CommandCall::status(module.as_str()))
            .await
        {
            debug!("Poll of {} failed: {}", module, e);
        }
    }
}

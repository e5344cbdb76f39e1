// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Doorlink: WebSocket to UDP door-hub bridge
//!
//! Relays lock/unlock/status requests from browser clients to a door hub
//! speaking a line-based UDP protocol, and relays the hub's replies and
//! events back.
//!
//! # Features
//!
//! - **Command correlation**: every COMMAND gets a fresh id; the matching
//!   FEEDBACK goes back to the client that asked
//! - **Timeouts**: unanswered commands report "no response from hub"
//! - **Fan-out**: EVENT / HEARTBEAT / HELLO datagrams reach every client
//! - **Polling**: optional periodic STATUS queries, broadcast to everyone
//!
//! # Wire Format
//!
//! ```text
//! D1 COMMAND 7 D0 LOCK          bridge -> hub
//! D1 FEEDBACK 7 D0 LOCKED       hub -> bridge, back to the requester
//! D3 EVENT D0 DOOR OPEN         hub -> bridge, broadcast
//! D1 HEARTBEAT                  hub -> bridge, broadcast
//! ```
//!
//! # Quick Start
//!
//! ```no_run
//! use doorlink::{BridgeConfig, HubBridge};
//!
//! # async fn run() -> Result<(), doorlink::BridgeError> {
//! let bridge = HubBridge::new(BridgeConfig::default())?;
//! bridge.start().await?;
//!
//! let (session, mut outbox) = bridge.connect();
//! let request = serde_json::from_str(r#"{"type": "lock-door", "moduleId": 1}"#)
//!     .expect("valid request");
//! bridge.handle_request(session, request).await;
//! while let Some(msg) = outbox.recv().await {
//!     println!("{}", msg.event_name());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration File
//!
//! ```toml
//! hub_host = "192.168.8.108"
//! hub_port = 12345
//! request_timeout_ms = 1500
//! poll_interval_ms = 1000
//! poll_modules = ["D1", "D2"]
//! ```

pub mod bridge;
pub mod config;
pub mod correlation;
pub mod error;
pub mod fanout;
pub mod messages;
mod poller;
pub mod protocol;
pub mod router;
pub mod stats;
pub mod status;
pub mod transport;

pub use bridge::HubBridge;
pub use config::{BridgeConfig, ConfigError};
pub use correlation::{CorrelationTable, PendingReply, PendingRequest, Requester, Resolution};
pub use error::{BridgeError, BridgeResult};
pub use fanout::{ClientRegistry, SessionId};
pub use messages::{ClientRequest, ErrorCode, ServerMessage};
pub use protocol::{CommandId, Feedback, InboundMessage, OutboundCommand};
pub use router::{CommandCall, ReplyKind, RoutePlan};
pub use stats::{BridgeStats, BridgeStatsSnapshot};
pub use status::DoorStatus;

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Client request routing.
//!
//! Requests are first planned (pure mapping to module/target/action and the
//! expected reply shape), then dispatched: a correlation entry is
//! registered before the datagram leaves so a fast FEEDBACK cannot race
//! it, and a delivery task turns the [`Resolution`] into a client message.

use crate::bridge::HubBridge;
use crate::correlation::{PendingReply, Requester, Resolution};
use crate::error::{BridgeError, BridgeResult};
use crate::fanout::{ClientRegistry, SessionId};
use crate::messages::{ClientRequest, ErrorCode, ModuleRef, ServerMessage};
use crate::protocol::{
    encode, CommandId, Feedback, OutboundCommand, DEFAULT_ACTION, DEFAULT_MODULE, DEFAULT_TARGET,
};
use crate::stats::BridgeStats;
use crate::status::DoorStatus;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Shape of the reply a command expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyKind {
    /// `command-feedback`
    Feedback,
    /// `door-info`
    DoorInfo,
    /// `door-action`
    DoorAction,
}

/// A command to send and how to answer it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandCall {
    pub module_id: String,
    pub target: String,
    pub action: String,
    pub reply: ReplyKind,
    pub request_id: Option<u64>,
}

impl CommandCall {
    pub fn new(
        module_id: impl Into<String>,
        target: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            module_id: module_id.into(),
            target: target.into(),
            action: action.into(),
            reply: ReplyKind::Feedback,
            request_id: None,
        }
    }

    /// STATUS query for `module_id` on the default target.
    pub fn status(module_id: impl Into<String>) -> Self {
        Self::new(module_id, DEFAULT_TARGET, DEFAULT_ACTION)
    }

    pub fn with_reply(mut self, reply: ReplyKind) -> Self {
        self.reply = reply;
        self
    }

    pub fn with_request_id(mut self, request_id: Option<u64>) -> Self {
        self.request_id = request_id;
        self
    }
}

/// What to do with one client request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutePlan {
    Command(CommandCall),
    Raw {
        text: String,
        request_id: Option<u64>,
    },
    Pong {
        id: Option<u64>,
    },
}

fn given_or(value: Option<String>, default: &str) -> String {
    match value {
        Some(v) if !v.is_empty() => v,
        _ => default.to_string(),
    }
}

fn legacy_module(module_id: Option<ModuleRef>) -> String {
    module_id
        .map(|m| m.normalized())
        .unwrap_or_else(|| DEFAULT_MODULE.to_string())
}

/// Map a request to the command it sends. Empty strings count as absent.
pub fn plan(request: ClientRequest) -> RoutePlan {
    match request {
        ClientRequest::SendCommand {
            module,
            target,
            action,
            request_id,
        } => RoutePlan::Command(
            CommandCall::new(
                given_or(module, DEFAULT_MODULE),
                given_or(target, DEFAULT_TARGET),
                given_or(action, DEFAULT_ACTION),
            )
            .with_request_id(request_id),
        ),
        ClientRequest::RawSend { text, request_id } => RoutePlan::Raw { text, request_id },
        ClientRequest::GetDoorInfo {
            module_id,
            request_id,
        } => RoutePlan::Command(
            CommandCall::status(legacy_module(module_id))
                .with_reply(ReplyKind::DoorInfo)
                .with_request_id(request_id),
        ),
        ClientRequest::LockDoor {
            module_id,
            request_id,
        } => RoutePlan::Command(
            CommandCall::new(legacy_module(module_id), DEFAULT_TARGET, "LOCK")
                .with_reply(ReplyKind::DoorAction)
                .with_request_id(request_id),
        ),
        ClientRequest::UnlockDoor {
            module_id,
            request_id,
        } => RoutePlan::Command(
            CommandCall::new(legacy_module(module_id), DEFAULT_TARGET, "UNLOCK")
                .with_reply(ReplyKind::DoorAction)
                .with_request_id(request_id),
        ),
        ClientRequest::Ping { id } => RoutePlan::Pong { id },
    }
}

/// Everything the delivery task needs once the command is out.
struct ReplyContext {
    call: CommandCall,
    command_id: CommandId,
    requester: Requester,
}

impl HubBridge {
    /// Handle one request from a connected client.
    ///
    /// Failures are delivered to the client, never returned.
    pub async fn handle_request(&self, session: SessionId, request: ClientRequest) {
        match plan(request) {
            RoutePlan::Command(call) => {
                // Outcome already delivered to the client.
                let _ = self.send_command(Requester::Session(session), call).await;
            }
            RoutePlan::Raw { text, request_id } => {
                self.raw_send(session, text, request_id).await;
            }
            RoutePlan::Pong { id } => {
                self.clients.send_to(session, ServerMessage::Pong { id });
            }
        }
    }

    /// Send a command to the hub and deliver its outcome to `requester`.
    ///
    /// Exactly one reply or error reaches the requester unless it
    /// disconnects first. The returned id is the one on the wire.
    pub async fn send_command(
        &self,
        requester: Requester,
        call: CommandCall,
    ) -> BridgeResult<CommandId> {
        let command_id = self.next_command_id();
        let cmd = OutboundCommand::new(
            call.module_id.clone(),
            command_id,
            call.target.clone(),
            call.action.clone(),
        );
        let ctx = ReplyContext {
            call,
            command_id,
            requester,
        };

        if let Err(e) = encode(&cmd) {
            BridgeStats::bump(&self.stats.send_errors);
            warn!("Rejected command {}: {}", command_id, e);
            deliver_failure(&self.clients, &ctx, e.code(), e.to_string());
            return Err(e);
        }

        if let Err(e) = self.start_transport().await {
            BridgeStats::bump(&self.stats.send_errors);
            warn!("Cannot send command {}: {}", command_id, e);
            deliver_failure(&self.clients, &ctx, e.code(), e.to_string());
            return Err(e);
        }

        let pending =
            match self
                .table
                .register(command_id, requester, self.config.request_timeout())
            {
                Ok(pending) => pending,
                Err(e) => {
                    error!("Correlation table corrupted: {}", e);
                    deliver_failure(&self.clients, &ctx, e.code(), e.to_string());
                    return Err(e);
                }
            };

        // disconnect/shutdown may have swept the table before this entry landed
        let orphaned = if self.is_shut_down() {
            Some(BridgeError::Shutdown)
        } else {
            match requester {
                Requester::Session(id) if !self.clients.contains(id) => {
                    Some(BridgeError::Disconnected(id))
                }
                _ => None,
            }
        };
        if let Some(e) = orphaned {
            self.table.cancel(command_id);
            debug!("Command {} not sent: {}", command_id, e);
            return Err(e);
        }

        spawn_delivery(
            pending,
            ctx,
            Arc::clone(&self.clients),
            Arc::clone(&self.stats),
        );

        match self.transport.send(&cmd).await {
            Ok(_) => {
                BridgeStats::bump(&self.stats.commands_sent);
                info!("COMMAND {} -> hub ({:?})", cmd, requester);
                Ok(command_id)
            }
            Err(e) => {
                BridgeStats::bump(&self.stats.send_errors);
                warn!("Send of command {} failed: {}", command_id, e);
                self.table.fail(command_id, e.to_string());
                Err(e)
            }
        }
    }

    /// Send text to the hub unchanged and acknowledge with `raw-sent`.
    pub async fn raw_send(&self, session: SessionId, text: String, request_id: Option<u64>) {
        if text.is_empty() {
            debug!("[{}] Ignoring empty raw-send", session);
            return;
        }

        let result = match self.start_transport().await {
            Ok(_) => self.transport.send_raw(&text).await,
            Err(e) => Err(e),
        };

        let reply = match result {
            Ok(_) => {
                BridgeStats::bump(&self.stats.raw_sent);
                ServerMessage::RawSent {
                    request_id,
                    raw: text,
                }
            }
            Err(e) => {
                BridgeStats::bump(&self.stats.send_errors);
                warn!("[{}] raw-send failed: {}", session, e);
                ServerMessage::CommandError {
                    request_id,
                    module: None,
                    command_id: None,
                    code: e.code(),
                    error: e.to_string(),
                }
            }
        };
        self.clients.send_to(session, reply);
    }
}

fn spawn_delivery(
    pending: PendingReply,
    ctx: ReplyContext,
    clients: Arc<ClientRegistry>,
    stats: Arc<BridgeStats>,
) {
    tokio::spawn(async move {
        match pending.wait().await {
            Resolution::Feedback(feedback) => {
                let msg = success_message(&clients, &ctx, feedback);
                clients.deliver(ctx.requester, msg);
            }
            Resolution::TimedOut => {
                BridgeStats::bump(&stats.timeouts);
                let e = BridgeError::Timeout(ctx.command_id);
                warn!("{} ({} {})", e, ctx.call.module_id, ctx.call.action);
                deliver_failure(&clients, &ctx, e.code(), e.to_string());
            }
            Resolution::Failed(reason) => {
                deliver_failure(&clients, &ctx, ErrorCode::TransportFailed, reason);
            }
            Resolution::Cancelled => {
                debug!("Command {} cancelled", ctx.command_id);
            }
        }
    });
}

fn success_message(clients: &ClientRegistry, ctx: &ReplyContext, feedback: Feedback) -> ServerMessage {
    let request_id = ctx.call.request_id;
    match ctx.call.reply {
        ReplyKind::Feedback => ServerMessage::CommandFeedback {
            request_id,
            module: feedback.module_id,
            command_id: feedback.command_id,
            target: feedback.target,
            action: feedback.action,
            raw: feedback.raw,
        },
        ReplyKind::DoorInfo => ServerMessage::DoorInfo {
            request_id,
            state: door_state(clients, ctx, &feedback.action),
            module_id: feedback.module_id,
            target: feedback.target,
            status: feedback.action,
            success: true,
        },
        ReplyKind::DoorAction => ServerMessage::DoorAction {
            request_id,
            module_id: ctx.call.module_id.clone(),
            action: ctx.call.action.clone(),
            state: door_state(clients, ctx, &feedback.action),
            success: true,
        },
    }
}

fn door_state(clients: &ClientRegistry, ctx: &ReplyContext, action: &str) -> DoorStatus {
    match ctx.requester {
        Requester::Session(id) => clients.update_door_status(id, &ctx.call.module_id, action),
        Requester::Broadcast => {
            let mut status = DoorStatus::default();
            status.apply(action);
            status
        }
    }
}

fn deliver_failure(clients: &ClientRegistry, ctx: &ReplyContext, code: ErrorCode, error: String) {
    let msg = ServerMessage::CommandError {
        request_id: ctx.call.request_id,
        module: Some(ctx.call.module_id.clone()),
        command_id: Some(ctx.command_id),
        code,
        error,
    };
    clients.deliver(ctx.requester, msg);
}

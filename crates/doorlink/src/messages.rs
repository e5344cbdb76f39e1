// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! WebSocket protocol messages for the hub bridge.
//!
//! JSON objects tagged by `type` (kebab-case), fields in camelCase:
//!
//! ```json
//! {"type": "lock-door", "moduleId": "D1", "requestId": 4}
//! {"type": "door-action", "requestId": 4, "moduleId": "D1", "action": "LOCK",
//!  "success": true, "state": {"doorOpen": false, "lockLocked": true}}
//! ```
//!
//! Every request may carry a `requestId`, echoed on its reply.

use crate::protocol::{normalize_module_id, CommandId, InboundMessage};
use crate::status::DoorStatus;
use serde::{Deserialize, Serialize};

/// Module reference as sent by browsers: `2`, `"2"` or `"D2"`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ModuleRef {
    Number(u64),
    Text(String),
}

impl ModuleRef {
    /// Normalized module id (`D<n>`).
    pub fn normalized(&self) -> String {
        match self {
            Self::Number(n) => normalize_module_id(&n.to_string()),
            Self::Text(s) => normalize_module_id(s),
        }
    }
}

/// Client → Server messages
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ClientRequest {
    /// Send an arbitrary COMMAND and wait for its FEEDBACK
    SendCommand {
        #[serde(default, alias = "moduleId")]
        module: Option<String>,
        #[serde(default)]
        target: Option<String>,
        #[serde(default)]
        action: Option<String>,
        #[serde(default)]
        request_id: Option<u64>,
    },

    /// Send text to the hub unchanged (no reply expected)
    RawSend {
        #[serde(alias = "raw")]
        text: String,
        #[serde(default)]
        request_id: Option<u64>,
    },

    /// Query door/lock state of a module
    GetDoorInfo {
        #[serde(default)]
        module_id: Option<ModuleRef>,
        #[serde(default)]
        request_id: Option<u64>,
    },

    /// Lock a module's door
    LockDoor {
        #[serde(default)]
        module_id: Option<ModuleRef>,
        #[serde(default)]
        request_id: Option<u64>,
    },

    /// Unlock a module's door
    UnlockDoor {
        #[serde(default)]
        module_id: Option<ModuleRef>,
        #[serde(default)]
        request_id: Option<u64>,
    },

    /// Ping (keepalive)
    Ping {
        #[serde(default)]
        id: Option<u64>,
    },
}

/// Server → Client messages
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// Welcome message on connection
    Welcome { version: String, hub: String },

    /// FEEDBACK for a `send-command` or a poll
    CommandFeedback {
        #[serde(skip_serializing_if = "Option::is_none")]
        request_id: Option<u64>,
        module: String,
        command_id: CommandId,
        target: String,
        action: String,
        raw: String,
    },

    /// A command failed (timeout, encoding or transport)
    CommandError {
        #[serde(skip_serializing_if = "Option::is_none")]
        request_id: Option<u64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        module: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        command_id: Option<CommandId>,
        code: ErrorCode,
        error: String,
    },

    /// Unsolicited EVENT from the hub
    HubEvent {
        module: String,
        target: String,
        event: String,
        raw: String,
    },

    /// Module heartbeat
    HubHeartbeat { module: String, raw: String },

    /// Module hello
    HubHello { module: String, raw: String },

    /// Anything the bridge could not classify
    HubRaw { raw: String },

    /// `raw-send` was transmitted
    RawSent {
        #[serde(skip_serializing_if = "Option::is_none")]
        request_id: Option<u64>,
        raw: String,
    },

    /// Reply to `get-door-info`. Failures arrive as `command-error`.
    DoorInfo {
        #[serde(skip_serializing_if = "Option::is_none")]
        request_id: Option<u64>,
        module_id: String,
        target: String,
        /// FEEDBACK action text, e.g. `CLOSED,UNLOCKED`
        status: String,
        state: DoorStatus,
        success: bool,
    },

    /// Reply to `lock-door` / `unlock-door`. Failures arrive as `command-error`.
    DoorAction {
        #[serde(skip_serializing_if = "Option::is_none")]
        request_id: Option<u64>,
        module_id: String,
        action: String,
        state: DoorStatus,
        success: bool,
    },

    /// Pong response
    Pong {
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<u64>,
    },

    /// Request could not be processed
    Error { code: ErrorCode, message: String },
}

/// Error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Invalid message format
    InvalidMessage,
    /// Command fields cannot be put on the wire
    EncodingFailed,
    /// Datagram could not be sent
    TransportFailed,
    /// No FEEDBACK within the deadline
    Timeout,
    /// Internal error
    InternalError,
}

impl ServerMessage {
    /// Create a welcome message
    pub fn welcome(hub: impl Into<String>) -> Self {
        Self::Welcome {
            version: env!("CARGO_PKG_VERSION").to_string(),
            hub: hub.into(),
        }
    }

    /// Create an error message
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Error {
            code,
            message: message.into(),
        }
    }

    /// Broadcast form of an unsolicited hub message. FEEDBACK has none.
    pub fn unsolicited(message: &InboundMessage, raw: &str) -> Option<Self> {
        let raw = raw.to_string();
        match message {
            InboundMessage::Feedback(_) => None,
            InboundMessage::Event {
                module_id,
                target,
                event,
            } => Some(Self::HubEvent {
                module: module_id.clone(),
                target: target.clone(),
                event: event.clone(),
                raw,
            }),
            InboundMessage::Heartbeat { module_id } => Some(Self::HubHeartbeat {
                module: module_id.clone(),
                raw,
            }),
            InboundMessage::Hello { module_id } => Some(Self::HubHello {
                module: module_id.clone(),
                raw,
            }),
            InboundMessage::Raw { .. } => Some(Self::HubRaw { raw }),
        }
    }

    /// Wire name of this message
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Welcome { .. } => "welcome",
            Self::CommandFeedback { .. } => "command-feedback",
            Self::CommandError { .. } => "command-error",
            Self::HubEvent { .. } => "hub-event",
            Self::HubHeartbeat { .. } => "hub-heartbeat",
            Self::HubHello { .. } => "hub-hello",
            Self::HubRaw { .. } => "hub-raw",
            Self::RawSent { .. } => "raw-sent",
            Self::DoorInfo { .. } => "door-info",
            Self::DoorAction { .. } => "door-action",
            Self::Pong { .. } => "pong",
            Self::Error { .. } => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_send_command() {
        let json = r#"{"type": "send-command", "module": "D2", "action": "LOCK", "requestId": 5}"#;
        let msg: ClientRequest = serde_json::from_str(json).unwrap();
        match msg {
            ClientRequest::SendCommand {
                module,
                target,
                action,
                request_id,
            } => {
                assert_eq!(module.as_deref(), Some("D2"));
                assert_eq!(target, None);
                assert_eq!(action.as_deref(), Some("LOCK"));
                assert_eq!(request_id, Some(5));
            }
            _ => panic!("Expected SendCommand"),
        }
    }

    #[test]
    fn parse_legacy_module_ids() {
        let msg: ClientRequest =
            serde_json::from_str(r#"{"type": "get-door-info", "moduleId": 2}"#).unwrap();
        match msg {
            ClientRequest::GetDoorInfo { module_id, .. } => {
                assert_eq!(module_id, Some(ModuleRef::Number(2)));
                assert_eq!(module_id.unwrap().normalized(), "D2");
            }
            _ => panic!("Expected GetDoorInfo"),
        }

        let msg: ClientRequest =
            serde_json::from_str(r#"{"type": "unlock-door", "moduleId": "d4"}"#).unwrap();
        match msg {
            ClientRequest::UnlockDoor { module_id, .. } => {
                assert_eq!(module_id.unwrap().normalized(), "D4");
            }
            _ => panic!("Expected UnlockDoor"),
        }
    }

    #[test]
    fn parse_raw_send_alias() {
        let msg: ClientRequest =
            serde_json::from_str(r#"{"type": "raw-send", "raw": "D1 HELLO"}"#).unwrap();
        assert!(matches!(msg, ClientRequest::RawSend { text, .. } if text == "D1 HELLO"));
    }

    #[test]
    fn reject_unknown_type() {
        assert!(serde_json::from_str::<ClientRequest>(r#"{"type": "open-sesame"}"#).is_err());
    }

    #[test]
    fn serialize_door_action() {
        let msg = ServerMessage::DoorAction {
            request_id: Some(1),
            module_id: "D1".into(),
            action: "LOCK".into(),
            state: DoorStatus {
                door_open: false,
                lock_locked: true,
            },
            success: true,
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "door-action");
        assert_eq!(json["requestId"], 1);
        assert_eq!(json["moduleId"], "D1");
        assert_eq!(json["success"], true);
        assert_eq!(json["state"]["lockLocked"], true);
    }

    #[test]
    fn serialize_command_error() {
        let msg = ServerMessage::CommandError {
            request_id: None,
            module: Some("D2".into()),
            command_id: Some(CommandId(3)),
            code: ErrorCode::Timeout,
            error: "No response from hub for command 3".into(),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "command-error");
        assert_eq!(json["commandId"], 3);
        assert_eq!(json["code"], "TIMEOUT");
    }

    #[test]
    fn unsolicited_event() {
        let inbound = crate::protocol::decode_line("D3 EVENT D0 DOOR OPEN");
        let msg = ServerMessage::unsolicited(&inbound, "D3 EVENT D0 DOOR OPEN").unwrap();
        assert_eq!(msg.event_name(), "hub-event");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["target"], "D0");
        assert_eq!(json["event"], "DOOR OPEN");
    }
}

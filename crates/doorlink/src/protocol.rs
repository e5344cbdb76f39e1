// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Hub datagram text protocol.
//!
//! Every datagram carries a single line:
//!
//! ```text
//! <MODULE> COMMAND  <CMDID> <TARGET> <ACTION>     (bridge -> hub)
//! <MODULE> FEEDBACK <CMDID> <TARGET> <ACTION...>  (hub -> bridge)
//! <MODULE> EVENT    <TARGET> <EVENT...>
//! <MODULE> HEARTBEAT
//! <MODULE> HELLO
//! ```
//!
//! Decoding never fails: anything that does not match a known shape is
//! returned as [`InboundMessage::Raw`].

use crate::error::BridgeError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Module addressed when the caller does not name one.
pub const DEFAULT_MODULE: &str = "D1";

/// Sub-target addressed when the caller does not name one.
pub const DEFAULT_TARGET: &str = "D0";

/// Action sent by `send-command` when none is given.
pub const DEFAULT_ACTION: &str = "STATUS";

/// Letter prefixed to bare numeric module ids.
pub const MODULE_PREFIX: char = 'D';

/// Identifier correlating a COMMAND with its FEEDBACK.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandId(pub u64);

impl CommandId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A command line addressed to the hub.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundCommand {
    pub module_id: String,
    pub command_id: CommandId,
    pub target: String,
    pub action: String,
}

impl OutboundCommand {
    pub fn new(
        module_id: impl Into<String>,
        command_id: CommandId,
        target: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            module_id: module_id.into(),
            command_id,
            target: target.into(),
            action: action.into(),
        }
    }
}

impl fmt::Display for OutboundCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} COMMAND {} {} {}",
            self.module_id, self.command_id, self.target, self.action
        )
    }
}

/// Reply to a specific command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Feedback {
    pub module_id: String,
    pub command_id: CommandId,
    pub target: String,
    pub action: String,
    /// The full line as received (terminator stripped).
    pub raw: String,
}

/// A decoded hub datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundMessage {
    Feedback(Feedback),
    Event {
        module_id: String,
        target: String,
        event: String,
    },
    Heartbeat {
        module_id: String,
    },
    Hello {
        module_id: String,
    },
    Raw {
        text: String,
    },
}

impl InboundMessage {
    /// Short kind name, used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Feedback(_) => "FEEDBACK",
            Self::Event { .. } => "EVENT",
            Self::Heartbeat { .. } => "HEARTBEAT",
            Self::Hello { .. } => "HELLO",
            Self::Raw { .. } => "RAW",
        }
    }
}

/// Encode a command as a terminated datagram payload.
///
/// Module and target are single wire tokens, so they must be non-empty and
/// free of whitespace. The action may hold spaces but no line terminator.
pub fn encode(cmd: &OutboundCommand) -> Result<Vec<u8>, BridgeError> {
    check_token("module id", &cmd.module_id)?;
    check_token("target", &cmd.target)?;
    if cmd.action.contains(|c| c == '\n' || c == '\r') {
        return Err(BridgeError::Encoding(format!(
            "action {:?} contains a line terminator",
            cmd.action
        )));
    }

    let mut line = cmd.to_string();
    line.push('\n');
    Ok(line.into_bytes())
}

fn check_token(field: &str, value: &str) -> Result<(), BridgeError> {
    if value.is_empty() {
        return Err(BridgeError::Encoding(format!("{} is empty", field)));
    }
    if value.chars().any(char::is_whitespace) {
        return Err(BridgeError::Encoding(format!(
            "{} {:?} contains whitespace or a line terminator",
            field, value
        )));
    }
    Ok(())
}

/// Datagram payload as a trimmed line. Invalid UTF-8 is replaced, not rejected.
pub fn datagram_text(datagram: &[u8]) -> String {
    String::from_utf8_lossy(datagram).trim().to_string()
}

/// Decode a raw datagram.
pub fn decode(datagram: &[u8]) -> InboundMessage {
    decode_line(&datagram_text(datagram))
}

/// Decode one protocol line.
pub fn decode_line(line: &str) -> InboundMessage {
    let line = line.trim();
    let tokens: Vec<&str> = line.split_whitespace().collect();

    let raw = || InboundMessage::Raw {
        text: line.to_string(),
    };

    if tokens.len() < 2 {
        return raw();
    }

    let module_id = tokens[0].to_string();
    match tokens[1] {
        "FEEDBACK" if tokens.len() >= 5 => match tokens[2].parse::<u64>() {
            Ok(id) => InboundMessage::Feedback(Feedback {
                module_id,
                command_id: CommandId(id),
                target: tokens[3].to_string(),
                action: tokens[4..].join(" "),
                raw: line.to_string(),
            }),
            Err(_) => raw(),
        },
        "EVENT" if tokens.len() >= 4 => InboundMessage::Event {
            module_id,
            target: tokens[2].to_string(),
            event: tokens[3..].join(" "),
        },
        "HEARTBEAT" => InboundMessage::Heartbeat { module_id },
        "HELLO" => InboundMessage::Hello { module_id },
        _ => raw(),
    }
}

/// Parse a COMMAND line, as the hub would.
pub fn decode_command(datagram: &[u8]) -> Option<OutboundCommand> {
    let text = datagram_text(datagram);
    let tokens: Vec<&str> = text.split_whitespace().collect();
    if tokens.len() < 4 || tokens[1] != "COMMAND" {
        return None;
    }
    let id = tokens[2].parse::<u64>().ok()?;
    Some(OutboundCommand::new(
        tokens[0],
        CommandId(id),
        tokens[3],
        tokens[4..].join(" "),
    ))
}

/// Normalize a client-supplied module id.
///
/// `"2"` becomes `"D2"`, `"d3"` becomes `"D3"`, an empty id selects
/// [`DEFAULT_MODULE`] and any other form is passed through.
pub fn normalize_module_id(raw: &str) -> String {
    let id = raw.trim();
    if id.is_empty() {
        return DEFAULT_MODULE.to_string();
    }

    if id.bytes().all(|b| b.is_ascii_digit()) {
        return match id.parse::<u64>() {
            Ok(n) => format!("{}{}", MODULE_PREFIX, n),
            Err(_) => format!("{}{}", MODULE_PREFIX, id),
        };
    }

    let mut chars = id.chars();
    if let Some(first) = chars.next() {
        let rest = chars.as_str();
        if first.eq_ignore_ascii_case(&MODULE_PREFIX)
            && !rest.is_empty()
            && rest.bytes().all(|b| b.is_ascii_digit())
        {
            return id.to_ascii_uppercase();
        }
    }

    id.to_string()
}

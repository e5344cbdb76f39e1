// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Bridge error types.

use crate::config::ConfigError;
use crate::fanout::SessionId;
use crate::messages::ErrorCode;
use crate::protocol::CommandId;
use thiserror::Error;

/// Result alias for bridge operations.
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Errors raised by the bridge core.
///
/// Hub protocol decoding has no variant: unparseable datagrams degrade to
/// raw text instead of failing.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Transport error: {0}")]
    Transport(#[from] std::io::Error),

    #[error("No response from hub for command {0}")]
    Timeout(CommandId),

    #[error("Duplicate command id {0}")]
    DuplicateCommandId(CommandId),

    #[error("Transport not started")]
    NotStarted,

    #[error("Cannot resolve hub address '{0}'")]
    HubAddress(String),

    #[error("Bridge is shut down")]
    Shutdown,

    #[error("Client {0} is disconnected")]
    Disconnected(SessionId),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl BridgeError {
    /// Error code reported to web clients.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Encoding(_) => ErrorCode::EncodingFailed,
            Self::Transport(_) | Self::NotStarted | Self::HubAddress(_) => {
                ErrorCode::TransportFailed
            }
            Self::Timeout(_) => ErrorCode::Timeout,
            Self::DuplicateCommandId(_)
            | Self::Shutdown
            | Self::Disconnected(_)
            | Self::Config(_) => ErrorCode::InternalError,
        }
    }
}

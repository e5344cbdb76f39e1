// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Door state parsed from FEEDBACK action text.

use serde::Serialize;
use std::collections::HashMap;

/// Client-facing door state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DoorStatus {
    pub door_open: bool,
    pub lock_locked: bool,
}

impl DoorStatus {
    /// Update from action text such as `CLOSED,UNLOCKED` or `LOCKED`.
    ///
    /// Fields without a recognised token keep their current value.
    pub fn apply(&mut self, action: &str) {
        for token in action
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|t| !t.is_empty())
        {
            match token.to_ascii_uppercase().as_str() {
                "OPEN" => self.door_open = true,
                "CLOSED" => self.door_open = false,
                "LOCKED" => self.lock_locked = true,
                "UNLOCKED" => self.lock_locked = false,
                _ => {}
            }
        }
    }
}

/// Last known door state per module, kept for one client.
#[derive(Debug, Default)]
pub struct DoorStatusCache {
    doors: HashMap<String, DoorStatus>,
}

impl DoorStatusCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge new action text into the module's state and return the result.
    pub fn update(&mut self, module_id: &str, action: &str) -> DoorStatus {
        let status = self.doors.entry(module_id.to_string()).or_default();
        status.apply(action);
        *status
    }

    pub fn get(&self, module_id: &str) -> Option<DoorStatus> {
        self.doors.get(module_id).copied()
    }
}

/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! The per-slot mode word and the handshake directive word.

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;

/// Value of a slot's mode word. Encodes both the control mode chosen by the
/// scheduler and the completion status reported by the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum ProcStatus {
    Uninitialized = 0,
    /// The runtime has reported and is waiting for a mode.
    FirstEvent = 1,
    ReplayActive = 2,
    RecordActive = 3,
    ExploreActive = 4,
    /// The runtime has no tasks left. Informational only.
    Finished = -1,
    /// Replay is over; every waiter is released and never blocks again.
    ReplayEnded = -4,
}

impl ProcStatus {
    pub fn from_raw(raw: i32) -> Option<Self> {
        Some(match raw {
            0 => ProcStatus::Uninitialized,
            1 => ProcStatus::FirstEvent,
            2 => ProcStatus::ReplayActive,
            3 => ProcStatus::RecordActive,
            4 => ProcStatus::ExploreActive,
            -1 => ProcStatus::Finished,
            -4 => ProcStatus::ReplayEnded,
            _ => return None,
        })
    }

    /// Modes under which a reporting runtime blocks until granted.
    pub fn is_controlled(self) -> bool {
        matches!(self, ProcStatus::ReplayActive | ProcStatus::ExploreActive)
    }

    /// The scheduler may not leave this state.
    pub fn is_terminal(self) -> bool {
        self == ProcStatus::ReplayEnded
    }
}

impl fmt::Display for ProcStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// The modes a scheduler can select for a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ControlMode {
    Record,
    Replay,
    Explore,
}

impl From<ControlMode> for ProcStatus {
    fn from(mode: ControlMode) -> Self {
        match mode {
            ControlMode::Record => ProcStatus::RecordActive,
            ControlMode::Replay => ProcStatus::ReplayActive,
            ControlMode::Explore => ProcStatus::ExploreActive,
        }
    }
}

impl FromStr for ControlMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "record" => Ok(ControlMode::Record),
            "replay" => Ok(ControlMode::Replay),
            "explore" => Ok(ControlMode::Explore),
            _ => Err(format!(
                "unknown mode {:?}, expected record, replay or explore",
                s
            )),
        }
    }
}

impl fmt::Display for ControlMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ControlMode::Record => "record",
            ControlMode::Replay => "replay",
            ControlMode::Explore => "explore",
        };
        f.write_str(s)
    }
}

/// The instruction word of the handshake. The runtime raises `Requested`
/// when it wants a decision; the scheduler answers with `Proceed` after
/// writing the selected task; the runtime consumes it back to `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum Directive {
    Idle = 0,
    Requested = 1,
    Proceed = 2,
}

impl Directive {
    pub fn from_raw(raw: u32) -> Option<Self> {
        Some(match raw {
            0 => Directive::Idle,
            1 => Directive::Requested,
            2 => Directive::Proceed,
            _ => return None,
        })
    }
}

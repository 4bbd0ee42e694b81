/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Task descriptors and the task status state machine.

use std::fmt;

use bytemuck::Pod;
use bytemuck::Zeroable;
use serde::Deserialize;
use serde::Serialize;

use crate::consts::FUNC_INFO_LEN;
use crate::consts::NO_SYSCALL;
use crate::syscall::RawSyscall;
use crate::syscall::SyscallRecord;
use crate::value::padded_string;
use crate::value::read_padded;
use crate::value::write_padded;

/// Logical state of a task. The numbering matches the host runtime's own so
/// traces stay comparable; `MoribundUnused` and `EnqueueUnused` are never
/// entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum TaskStatus {
    Idle = 0,
    Runnable = 1,
    Running = 2,
    Syscall = 3,
    Waiting = 4,
    MoribundUnused = 5,
    Dead = 6,
    EnqueueUnused = 7,
    CopyStack = 8,
}

impl TaskStatus {
    pub fn from_raw(raw: u32) -> Option<Self> {
        Some(match raw {
            0 => TaskStatus::Idle,
            1 => TaskStatus::Runnable,
            2 => TaskStatus::Running,
            3 => TaskStatus::Syscall,
            4 => TaskStatus::Waiting,
            5 => TaskStatus::MoribundUnused,
            6 => TaskStatus::Dead,
            7 => TaskStatus::EnqueueUnused,
            8 => TaskStatus::CopyStack,
            _ => return None,
        })
    }

    /// Whether a task may move from `self` to `to`. Staying put is always
    /// allowed.
    pub fn can_become(self, to: TaskStatus) -> bool {
        use TaskStatus::*;
        self == to
            || matches!(
                (self, to),
                (Idle, Dead)
                    | (Idle, Runnable)
                    | (Dead, Runnable)
                    | (Runnable, Running)
                    | (Running, Syscall)
                    | (Running, Waiting)
                    | (Running, Runnable)
                    | (Running, Dead)
                    | (Running, CopyStack)
                    | (Syscall, Running)
                    | (Syscall, Runnable)
                    | (Waiting, Runnable)
                    | (Waiting, CopyStack)
                    | (CopyStack, Running)
                    | (CopyStack, Waiting)
            )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// The raw status word: a [`TaskStatus`] with the concurrent-scan bit
/// possibly OR'd on top.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusWord(pub u32);

impl StatusWord {
    /// Set on a status observed during a concurrent scan.
    pub const SCAN: u32 = 0x1000;

    pub fn new(status: TaskStatus) -> Self {
        StatusWord(status as u32)
    }

    /// `status` with the scan bit set. Only the first five states carry it.
    pub fn scanning(status: TaskStatus) -> Self {
        debug_assert!((status as u32) <= TaskStatus::Waiting as u32);
        StatusWord(status as u32 | Self::SCAN)
    }

    pub fn is_scanning(self) -> bool {
        self.0 & Self::SCAN != 0
    }

    /// The logical state with the scan bit masked off.
    pub fn logical(self) -> Option<TaskStatus> {
        TaskStatus::from_raw(self.0 & !Self::SCAN)
    }
}

impl From<TaskStatus> for StatusWord {
    fn from(status: TaskStatus) -> Self {
        StatusWord::new(status)
    }
}

impl fmt::Display for StatusWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.logical() {
            Some(s) if self.is_scanning() => write!(f, "{}+scan", s),
            Some(s) => write!(f, "{}", s),
            None => write!(f, "status#{:#x}", self.0),
        }
    }
}

/// Metadata for one schedulable task.
///
/// `gid` is only unique within one run. The pair `(gpc, routine_count)` names
/// the same task across runs of the same program.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDescriptor {
    pub status: StatusWord,
    pub gid: i64,
    /// Program counter of the spawn site.
    pub gpc: u64,
    /// How many tasks were spawned from `gpc` before this one.
    pub routine_count: u64,
    /// The spawning function, at most [`FUNC_INFO_LEN`] bytes and no NUL.
    pub func_info: String,
    /// The call this task is blocked in, if any.
    pub syscall: Option<SyscallRecord>,
}

impl TaskDescriptor {
    /// A freshly spawned task.
    pub fn new(gid: i64, gpc: u64, routine_count: u64, func_info: impl Into<String>) -> Self {
        TaskDescriptor {
            status: StatusWord::new(TaskStatus::Idle),
            gid,
            gpc,
            routine_count,
            func_info: padded_string(func_info.into(), FUNC_INFO_LEN),
            syscall: None,
        }
    }

    /// The identity that is stable across runs.
    pub fn stable_id(&self) -> (u64, u64) {
        (self.gpc, self.routine_count)
    }

    pub fn encode(&self) -> RawTask {
        let mut raw = RawTask::zeroed();
        raw.status = self.status.0;
        raw.gid = self.gid;
        raw.gpc = self.gpc;
        raw.routine_count = self.routine_count;
        write_padded(&mut raw.func_info, &self.func_info);
        match &self.syscall {
            Some(rec) => {
                raw.syscall = rec.syscall;
                raw.syscall_info = rec.encode();
            }
            None => raw.syscall = NO_SYSCALL,
        }
        raw
    }

    pub fn decode(raw: &RawTask) -> Self {
        TaskDescriptor {
            status: StatusWord(raw.status),
            gid: raw.gid,
            gpc: raw.gpc,
            routine_count: raw.routine_count,
            func_info: read_padded(&raw.func_info),
            syscall: (raw.syscall != NO_SYSCALL).then(|| SyscallRecord::decode(&raw.syscall_info)),
        }
    }
}

impl fmt::Display for TaskDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "g{} [{}] {}@{:#x}#{}",
            self.gid, self.status, self.func_info, self.gpc, self.routine_count
        )?;
        if let Some(rec) = &self.syscall {
            write!(f, " in {}", rec)?;
        }
        Ok(())
    }
}

/// Shared-memory form of a [`TaskDescriptor`]. A zeroed record (gid 0) marks
/// an unused table slot.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct RawTask {
    pub status: u32,
    /// Blocking syscall id or [`NO_SYSCALL`].
    pub syscall: i32,
    pub gid: i64,
    pub gpc: u64,
    pub routine_count: u64,
    pub func_info: [u8; FUNC_INFO_LEN],
    pub syscall_info: RawSyscall,
}

impl RawTask {
    pub fn is_empty(&self) -> bool {
        self.gid == 0
    }
}

#[cfg(test)]
mod tests {
    use bytemuck::bytes_of;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    use super::*;
    use crate::syscall::SyscallId;
    use crate::value::GeneralValue;

    #[test_case(TaskStatus::Idle, TaskStatus::Dead, true)]
    #[test_case(TaskStatus::Dead, TaskStatus::Runnable, true)]
    #[test_case(TaskStatus::Runnable, TaskStatus::Running, true)]
    #[test_case(TaskStatus::Running, TaskStatus::Syscall, true)]
    #[test_case(TaskStatus::Syscall, TaskStatus::Runnable, true)]
    #[test_case(TaskStatus::Waiting, TaskStatus::CopyStack, true)]
    #[test_case(TaskStatus::Dead, TaskStatus::Running, false)]
    #[test_case(TaskStatus::Runnable, TaskStatus::Syscall, false)]
    #[test_case(TaskStatus::Idle, TaskStatus::MoribundUnused, false)]
    fn transitions(from: TaskStatus, to: TaskStatus, ok: bool) {
        assert_eq!(from.can_become(to), ok);
    }

    #[test]
    fn scan_bit_is_masked() {
        let w = StatusWord::scanning(TaskStatus::Waiting);
        assert_eq!(w.0, 0x1004);
        assert!(w.is_scanning());
        assert_eq!(w.logical(), Some(TaskStatus::Waiting));
        assert_ne!(w, StatusWord::new(TaskStatus::Waiting));
        assert_eq!(w.to_string(), "Waiting+scan");
        assert_eq!(StatusWord(0x77).logical(), None);
    }

    #[test]
    fn descriptor_round_trip() {
        let mut t = TaskDescriptor::new(17, 0x4a_5000, 1, "main.worker");
        t.status = StatusWord::new(TaskStatus::Syscall);
        t.syscall = Some(SyscallRecord::new(
            SyscallId::Getenv,
            [GeneralValue::String("HOME".into())],
            [GeneralValue::String("/root".into()), GeneralValue::Bool(true)],
        ));
        let raw = t.encode();
        assert_eq!(raw.syscall, SyscallId::Getenv as i32);
        let back = TaskDescriptor::decode(&raw);
        assert_eq!(back, t);
        assert_eq!(bytes_of(&back.encode()), bytes_of(&raw));
    }

    #[test]
    fn not_blocked_uses_sentinel() {
        let raw = TaskDescriptor::new(3, 0x10, 0, "f").encode();
        assert_eq!(raw.syscall, NO_SYSCALL);
        assert!(TaskDescriptor::decode(&raw).syscall.is_none());
        assert!(RawTask::zeroed().is_empty());
        assert!(!raw.is_empty());
    }

    #[test]
    fn func_info_is_bounded() {
        let t = TaskDescriptor::new(1, 0, 0, "x".repeat(100));
        assert_eq!(t.func_info.len(), FUNC_INFO_LEN);
        assert_eq!(TaskDescriptor::decode(&t.encode()), t);
    }

    #[test]
    fn func_info_with_nul_survives_the_table() {
        let t = TaskDescriptor::new(2, 0x20, 0, "main.worker\0junk");
        assert_eq!(t.func_info, "main.worker");
        let raw = t.encode();
        let back = TaskDescriptor::decode(&raw);
        assert_eq!(back, t);
        assert_eq!(bytes_of(&back.encode()), bytes_of(&raw));
    }
}

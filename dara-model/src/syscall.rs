/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Syscall identifiers and the fixed-capacity syscall record.

use std::fmt;

use bytemuck::Pod;
use bytemuck::Zeroable;
use serde::Deserialize;
use serde::Serialize;
use tracing::warn;

use crate::consts::SYSCALL_VALUE_CAPACITY;
use crate::value::GeneralValue;
use crate::value::RawValue;

macro_rules! syscall_ids {
    ($($(#[$doc:meta])* $name:ident = $num:expr, $str:expr;)+) => {
        /// The calls an instrumented runtime reports. These are library-level
        /// operations (`os.Getenv`, `net.Dial`, ...) rather than kernel syscall
        /// numbers, so the numbering is our own and part of the layout.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[repr(i32)]
        pub enum SyscallId {
            $($(#[$doc])* $name = $num,)+
        }

        impl SyscallId {
            /// Interpret a raw id. Ids outside the catalog yield `None`.
            pub fn from_raw(raw: i32) -> Option<Self> {
                match raw {
                    $($num => Some(SyscallId::$name),)+
                    _ => None,
                }
            }

            /// Upper-case name as printed in traces.
            pub fn name(self) -> &'static str {
                match self {
                    $(SyscallId::$name => $str,)+
                }
            }
        }
    };
}

syscall_ids! {
    // Files
    Open = 0, "OPEN";
    Close = 1, "CLOSE";
    Read = 2, "READ";
    ReadAt = 3, "READAT";
    Write = 4, "WRITE";
    WriteAt = 5, "WRITEAT";
    Seek = 6, "SEEK";
    Fstat = 7, "FSTAT";
    Stat = 8, "STAT";
    Lstat = 9, "LSTAT";
    Chmod = 10, "CHMOD";
    Fchmod = 11, "FCHMOD";
    Chown = 12, "CHOWN";
    Fchown = 13, "FCHOWN";
    Lchown = 14, "LCHOWN";
    Ftruncate = 15, "FTRUNCATE";
    Fsync = 16, "FSYNC";
    Utimes = 17, "UTIMES";
    Fchdir = 18, "FCHDIR";
    Readlink = 19, "READLINK";
    // Directories
    ReadDir = 20, "READDIR";
    ReadDirNames = 21, "READDIRNAMES";
    Mkdir = 22, "MKDIR";
    Remove = 23, "REMOVE";
    Rename = 24, "RENAME";
    Link = 25, "LINK";
    Symlink = 26, "SYMLINK";
    // Processes
    Exit = 30, "EXIT";
    Kill = 31, "KILL";
    Wait4 = 32, "WAIT4";
    Executable = 33, "EXECUTABLE";
    Getuid = 34, "GETUID";
    Geteuid = 35, "GETEUID";
    Getgid = 36, "GETGID";
    Getegid = 37, "GETEGID";
    Getgroups = 38, "GETGROUPS";
    // Environment
    Getenv = 40, "GETENV";
    Setenv = 41, "SETENV";
    Unsetenv = 42, "UNSETENV";
    Clearenv = 43, "CLEARENV";
    Environ = 44, "ENVIRON";
    // Time
    Sleep = 50, "SLEEP";
    // Network
    Listen = 60, "LISTEN";
    Dial = 61, "DIAL";
    Accept = 62, "ACCEPT";
    SetDeadline = 63, "SETDEADLINE";
    SetReadDeadline = 64, "SETREADDEADLINE";
    SetWriteDeadline = 65, "SETWRITEDEADLINE";
}

impl fmt::Display for SyscallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Render a raw id, naming it when it is in the catalog.
pub fn display_syscall(raw: i32) -> String {
    match SyscallId::from_raw(raw) {
        Some(id) => id.name().to_owned(),
        None => format!("SYSCALL#{}", raw),
    }
}

/// A reported call with its arguments and results.
///
/// At most [`SYSCALL_VALUE_CAPACITY`] arguments and as many returns are kept;
/// anything beyond is dropped when the record is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyscallRecord {
    /// Raw id, see [`SyscallId`]. Kept raw so unknown ids survive a round trip.
    pub syscall: i32,
    pub args: Vec<GeneralValue>,
    pub rets: Vec<GeneralValue>,
}

impl SyscallRecord {
    /// Build a record, dropping values beyond capacity.
    pub fn new(
        syscall: SyscallId,
        args: impl IntoIterator<Item = GeneralValue>,
        rets: impl IntoIterator<Item = GeneralValue>,
    ) -> Self {
        Self::from_raw_id(syscall as i32, args, rets)
    }

    /// Like [`SyscallRecord::new`] for ids outside the catalog.
    pub fn from_raw_id(
        syscall: i32,
        args: impl IntoIterator<Item = GeneralValue>,
        rets: impl IntoIterator<Item = GeneralValue>,
    ) -> Self {
        SyscallRecord {
            syscall,
            args: bounded(syscall, "arguments", args),
            rets: bounded(syscall, "returns", rets),
        }
    }

    /// The catalog entry for this record, if any.
    pub fn id(&self) -> Option<SyscallId> {
        SyscallId::from_raw(self.syscall)
    }

    /// Encode into the fixed-capacity shared-memory form. Slots past the
    /// declared counts stay zero.
    pub fn encode(&self) -> RawSyscall {
        let mut raw = RawSyscall::zeroed();
        raw.syscall_num = self.syscall;
        raw.num_args = self.args.len().min(SYSCALL_VALUE_CAPACITY) as u32;
        raw.num_rets = self.rets.len().min(SYSCALL_VALUE_CAPACITY) as u32;
        for (slot, v) in raw.args.iter_mut().zip(&self.args) {
            *slot = v.encode();
        }
        for (slot, v) in raw.rets.iter_mut().zip(&self.rets) {
            *slot = v.encode();
        }
        raw
    }

    /// Decode, reading no slot past the declared counts. Counts larger than
    /// the capacity are clamped.
    pub fn decode(raw: &RawSyscall) -> Self {
        let nargs = (raw.num_args as usize).min(SYSCALL_VALUE_CAPACITY);
        let nrets = (raw.num_rets as usize).min(SYSCALL_VALUE_CAPACITY);
        SyscallRecord {
            syscall: raw.syscall_num,
            args: raw.args[..nargs].iter().map(GeneralValue::decode).collect(),
            rets: raw.rets[..nrets].iter().map(GeneralValue::decode).collect(),
        }
    }
}

impl fmt::Display for SyscallRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", display_syscall(self.syscall))?;
        for (i, a) in self.args.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", a)?;
        }
        f.write_str(") -> (")?;
        for (i, r) in self.rets.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", r)?;
        }
        f.write_str(")")
    }
}

fn bounded(
    syscall: i32,
    what: &str,
    values: impl IntoIterator<Item = GeneralValue>,
) -> Vec<GeneralValue> {
    let mut values: Vec<GeneralValue> = values.into_iter().collect();
    if values.len() > SYSCALL_VALUE_CAPACITY {
        warn!(
            "{} reported {} {}, keeping the first {}",
            display_syscall(syscall),
            values.len(),
            what,
            SYSCALL_VALUE_CAPACITY
        );
        values.truncate(SYSCALL_VALUE_CAPACITY);
    }
    values
}

/// Shared-memory form of a [`SyscallRecord`].
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct RawSyscall {
    pub syscall_num: i32,
    pub num_args: u32,
    pub num_rets: u32,
    pub _pad: u32,
    pub args: [RawValue; SYSCALL_VALUE_CAPACITY],
    pub rets: [RawValue; SYSCALL_VALUE_CAPACITY],
}

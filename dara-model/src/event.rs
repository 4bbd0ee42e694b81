/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Events appended to a slot's log.
//!
//! The raw form is a fixed-size union in spirit: every payload record is
//! present, only the one named by the kind tag is meaningful, and the others
//! are zero.

use std::fmt;

use bytemuck::Pod;
use bytemuck::Zeroable;
use serde::Deserialize;
use serde::Serialize;
use tracing::warn;

use crate::consts::MAX_LOG_VARIABLES;
use crate::consts::VAR_BUF_LEN;
use crate::syscall::RawSyscall;
use crate::syscall::SyscallRecord;
use crate::task::RawTask;
use crate::task::TaskDescriptor;
use crate::value::GeneralValue;
use crate::value::padded_string;
use crate::value::read_padded;
use crate::value::write_padded;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum EventKind {
    Log = 0,
    Syscall = 1,
    Send = 2,
    Receive = 3,
    Schedule = 4,
}

impl EventKind {
    pub fn from_raw(raw: i32) -> Option<Self> {
        Some(match raw {
            0 => EventKind::Log,
            1 => EventKind::Syscall,
            2 => EventKind::Send,
            3 => EventKind::Receive,
            4 => EventKind::Schedule,
            _ => return None,
        })
    }
}

/// One named value in a variable dump. Each field holds at most
/// [`VAR_BUF_LEN`] bytes and no NUL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    pub value: String,
    pub type_name: String,
}

impl Variable {
    /// Render `value` and name its type.
    pub fn new(name: impl Into<String>, value: &GeneralValue) -> Self {
        Variable {
            name: padded_string(name.into(), VAR_BUF_LEN),
            value: padded_string(value.to_string(), VAR_BUF_LEN),
            type_name: value.tag().name().to_owned(),
        }
    }
}

/// A dump of variables at a labelled program point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub log_id: String,
    pub vars: Vec<Variable>,
}

impl LogEntry {
    /// Build an entry, keeping at most [`MAX_LOG_VARIABLES`] variables.
    pub fn new(log_id: impl Into<String>, vars: impl IntoIterator<Item = Variable>) -> Self {
        let log_id = padded_string(log_id.into(), VAR_BUF_LEN);
        let mut vars: Vec<Variable> = vars.into_iter().collect();
        if vars.len() > MAX_LOG_VARIABLES {
            warn!(
                "log point {} dumped {} variables, keeping the first {}",
                log_id,
                vars.len(),
                MAX_LOG_VARIABLES
            );
            vars.truncate(MAX_LOG_VARIABLES);
        }
        LogEntry { log_id, vars }
    }

    fn encode(&self) -> RawLogEntry {
        let mut raw = RawLogEntry::zeroed();
        let n = self.vars.len().min(MAX_LOG_VARIABLES);
        raw.length = n as u64;
        write_padded(&mut raw.log_id, &self.log_id);
        for (slot, v) in raw.vars.iter_mut().zip(&self.vars) {
            write_padded(&mut slot.name, &v.name);
            write_padded(&mut slot.value, &v.value);
            write_padded(&mut slot.type_name, &v.type_name);
        }
        raw
    }

    fn decode(raw: &RawLogEntry) -> Self {
        let n = usize::try_from(raw.length)
            .unwrap_or(MAX_LOG_VARIABLES)
            .min(MAX_LOG_VARIABLES);
        LogEntry {
            log_id: read_padded(&raw.log_id),
            vars: raw.vars[..n]
                .iter()
                .map(|v| Variable {
                    name: read_padded(&v.name),
                    value: read_padded(&v.value),
                    type_name: read_padded(&v.type_name),
                })
                .collect(),
        }
    }
}

/// A message body, at most [`VAR_BUF_LEN`] bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub body: Vec<u8>,
}

impl Message {
    /// Keeps the first [`VAR_BUF_LEN`] bytes of `body`.
    pub fn new(body: impl AsRef<[u8]>) -> Self {
        let body = body.as_ref();
        Message {
            body: body[..body.len().min(VAR_BUF_LEN)].to_vec(),
        }
    }

    fn encode(&self) -> RawMessage {
        let mut raw = RawMessage::zeroed();
        let n = self.body.len().min(VAR_BUF_LEN);
        raw.body_len = n as u32;
        raw.body[..n].copy_from_slice(&self.body[..n]);
        raw
    }

    fn decode(raw: &RawMessage) -> Self {
        let n = (raw.body_len as usize).min(VAR_BUF_LEN);
        Message {
            body: raw.body[..n].to_vec(),
        }
    }
}

/// What an event carries beyond its header.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EventPayload {
    Log(LogEntry),
    Syscall(SyscallRecord),
    Send(Message),
    Receive(Message),
    /// A scheduling decision; the header's task says which one ran.
    Schedule,
}

impl EventPayload {
    pub fn kind(&self) -> EventKind {
        match self {
            EventPayload::Log(_) => EventKind::Log,
            EventPayload::Syscall(_) => EventKind::Syscall,
            EventPayload::Send(_) => EventKind::Send,
            EventPayload::Receive(_) => EventKind::Receive,
            EventPayload::Schedule => EventKind::Schedule,
        }
    }
}

/// An entry of a slot's event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// The slot that reported it.
    pub proc_id: usize,
    /// The task the event concerns.
    pub task: TaskDescriptor,
    pub epoch: u64,
    /// Monotonic clock reading, in nanoseconds, taken when the event was
    /// reported. Orders events across slots.
    #[serde(default)]
    pub stamp: u64,
    pub payload: EventPayload,
}

impl Event {
    pub fn kind(&self) -> EventKind {
        self.payload.kind()
    }

    pub fn encode(&self) -> RawEvent {
        let mut raw = RawEvent::zeroed();
        raw.kind = self.kind() as i32;
        raw.proc_id = self.proc_id as i32;
        raw.task = self.task.encode();
        raw.epoch = self.epoch;
        raw.stamp = self.stamp;
        match &self.payload {
            EventPayload::Log(entry) => raw.log_entry = entry.encode(),
            EventPayload::Syscall(rec) => raw.syscall_info = rec.encode(),
            EventPayload::Send(msg) | EventPayload::Receive(msg) => raw.message = msg.encode(),
            EventPayload::Schedule => {}
        }
        raw
    }

    /// Decode by kind tag. Records with an unknown tag or a negative slot
    /// yield `None`.
    pub fn decode(raw: &RawEvent) -> Option<Self> {
        let payload = match EventKind::from_raw(raw.kind)? {
            EventKind::Log => EventPayload::Log(LogEntry::decode(&raw.log_entry)),
            EventKind::Syscall => EventPayload::Syscall(SyscallRecord::decode(&raw.syscall_info)),
            EventKind::Send => EventPayload::Send(Message::decode(&raw.message)),
            EventKind::Receive => EventPayload::Receive(Message::decode(&raw.message)),
            EventKind::Schedule => EventPayload::Schedule,
        };
        Some(Event {
            proc_id: usize::try_from(raw.proc_id).ok()?,
            task: TaskDescriptor::decode(&raw.task),
            epoch: raw.epoch,
            stamp: raw.stamp,
            payload,
        })
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[p{} e{}] ", self.proc_id, self.epoch)?;
        match &self.payload {
            EventPayload::Log(entry) => {
                write!(f, "log {} by g{}", entry.log_id, self.task.gid)?;
                for v in &entry.vars {
                    write!(f, " {}:{}={}", v.name, v.type_name, v.value)?;
                }
                Ok(())
            }
            EventPayload::Syscall(rec) => write!(f, "g{} {}", self.task.gid, rec),
            EventPayload::Send(m) => write!(f, "g{} send {} bytes", self.task.gid, m.body.len()),
            EventPayload::Receive(m) => {
                write!(f, "g{} recv {} bytes", self.task.gid, m.body.len())
            }
            EventPayload::Schedule => write!(f, "schedule {}", self.task),
        }
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct RawVariable {
    pub name: [u8; VAR_BUF_LEN],
    pub value: [u8; VAR_BUF_LEN],
    pub type_name: [u8; VAR_BUF_LEN],
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct RawLogEntry {
    pub length: u64,
    pub log_id: [u8; VAR_BUF_LEN],
    pub vars: [RawVariable; MAX_LOG_VARIABLES],
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct RawMessage {
    pub body_len: u32,
    pub _pad: u32,
    pub body: [u8; VAR_BUF_LEN],
}

/// Shared-memory form of an [`Event`].
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct RawEvent {
    pub kind: i32,
    pub proc_id: i32,
    pub task: RawTask,
    pub epoch: u64,
    pub stamp: u64,
    pub log_entry: RawLogEntry,
    pub syscall_info: RawSyscall,
    pub message: RawMessage,
}

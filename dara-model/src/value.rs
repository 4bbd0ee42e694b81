/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! The encoded value system used for syscall arguments, returns and logged
//! variables.
//!
//! [`GeneralValue`] is a closed sum type. Anything that does not map onto one
//! of its arms is encoded as [`GeneralValue::Unsupported`], which keeps the
//! structure of the trace intact at the cost of fidelity.

use std::any::Any;
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;
use std::time::SystemTime;

use bytemuck::Pod;
use bytemuck::Zeroable;
use nix::errno::Errno;
use nix::sys::signal::Signal;
use nix::unistd::Pid;
use serde::Deserialize;
use serde::Serialize;
use tracing::debug;

use crate::consts::UNSUPPORTED_VAL;
use crate::consts::VAR_BUF_LEN;

/// Numeric tag of every [`GeneralValue`] arm, as stored in shared memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum ValueTag {
    Integer = 0,
    Integer64 = 1,
    Bool = 2,
    Float = 3,
    String = 4,
    Array = 5,
    Error = 6,
    Pointer = 7,
    File = 8,
    FileInfo = 9,
    Connection = 10,
    Time = 11,
    Process = 12,
    Signal = 13,
    Context = 14,
    SockAddr = 15,
    Unsupported = 16,
}

impl ValueTag {
    const ALL: [ValueTag; 17] = [
        ValueTag::Integer,
        ValueTag::Integer64,
        ValueTag::Bool,
        ValueTag::Float,
        ValueTag::String,
        ValueTag::Array,
        ValueTag::Error,
        ValueTag::Pointer,
        ValueTag::File,
        ValueTag::FileInfo,
        ValueTag::Connection,
        ValueTag::Time,
        ValueTag::Process,
        ValueTag::Signal,
        ValueTag::Context,
        ValueTag::SockAddr,
        ValueTag::Unsupported,
    ];

    /// Interpret a raw tag word. Unknown values yield `None`.
    pub fn from_raw(raw: i32) -> Option<Self> {
        usize::try_from(raw)
            .ok()
            .and_then(|ix| Self::ALL.get(ix))
            .copied()
    }

    /// The type name written next to logged variables.
    pub fn name(self) -> &'static str {
        match self {
            ValueTag::Integer => "int",
            ValueTag::Integer64 => "int64",
            ValueTag::Bool => "bool",
            ValueTag::Float => "float",
            ValueTag::String => "string",
            ValueTag::Array => "array",
            ValueTag::Error => "error",
            ValueTag::Pointer => "pointer",
            ValueTag::File => "file",
            ValueTag::FileInfo => "fileinfo",
            ValueTag::Connection => "connection",
            ValueTag::Time => "time",
            ValueTag::Process => "process",
            ValueTag::Signal => "signal",
            ValueTag::Context => "context",
            ValueTag::SockAddr => "sockaddr",
            ValueTag::Unsupported => "unsupported",
        }
    }
}

/// A single syscall argument, return value, or logged variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GeneralValue {
    Integer(i64),
    Integer64(i64),
    Bool(bool),
    Float(f64),
    String(String),
    /// The length of an array-like value; contents are not captured.
    Array(u64),
    /// The rendered message of an error.
    Error(String),
    Pointer(u64),
    /// The name of an open file.
    File(String),
    /// The name of the file described by a metadata value.
    FileInfo(String),
    /// The peer of a connection.
    Connection(String),
    /// Nanoseconds, either a duration or since the unix epoch.
    Time(i64),
    /// A process id.
    Process(i64),
    /// The name of a signal.
    Signal(String),
    /// A description of a cancellation context.
    Context(String),
    SockAddr(String),
    /// A value with no representation. Encodes with [`UNSUPPORTED_VAL`].
    Unsupported,
}

impl GeneralValue {
    /// The tag this value is stored under.
    pub fn tag(&self) -> ValueTag {
        match self {
            GeneralValue::Integer(_) => ValueTag::Integer,
            GeneralValue::Integer64(_) => ValueTag::Integer64,
            GeneralValue::Bool(_) => ValueTag::Bool,
            GeneralValue::Float(_) => ValueTag::Float,
            GeneralValue::String(_) => ValueTag::String,
            GeneralValue::Array(_) => ValueTag::Array,
            GeneralValue::Error(_) => ValueTag::Error,
            GeneralValue::Pointer(_) => ValueTag::Pointer,
            GeneralValue::File(_) => ValueTag::File,
            GeneralValue::FileInfo(_) => ValueTag::FileInfo,
            GeneralValue::Connection(_) => ValueTag::Connection,
            GeneralValue::Time(_) => ValueTag::Time,
            GeneralValue::Process(_) => ValueTag::Process,
            GeneralValue::Signal(_) => ValueTag::Signal,
            GeneralValue::Context(_) => ValueTag::Context,
            GeneralValue::SockAddr(_) => ValueTag::SockAddr,
            GeneralValue::Unsupported => ValueTag::Unsupported,
        }
    }

    /// Encode into the fixed-size shared-memory record. Never fails: text is
    /// truncated to [`VAR_BUF_LEN`] bytes on a character boundary.
    pub fn encode(&self) -> RawValue {
        let mut raw = RawValue::zeroed();
        raw.tag = self.tag() as i32;
        match self {
            GeneralValue::Integer(i)
            | GeneralValue::Integer64(i)
            | GeneralValue::Time(i)
            | GeneralValue::Process(i) => raw.integer = *i,
            GeneralValue::Array(n) | GeneralValue::Pointer(n) => raw.integer = *n as i64,
            GeneralValue::Bool(b) => raw.boolean = u8::from(*b),
            GeneralValue::Float(f) => raw.float = *f,
            GeneralValue::String(s)
            | GeneralValue::Error(s)
            | GeneralValue::File(s)
            | GeneralValue::FileInfo(s)
            | GeneralValue::Connection(s)
            | GeneralValue::Signal(s)
            | GeneralValue::Context(s)
            | GeneralValue::SockAddr(s) => {
                raw.text_len = write_text(&mut raw.text, s) as u32;
            }
            GeneralValue::Unsupported => raw.marker = UNSUPPORTED_VAL,
        }
        raw
    }

    /// Decode a shared-memory record. Only the payload field selected by the
    /// tag is read; an unknown tag decodes as [`GeneralValue::Unsupported`].
    pub fn decode(raw: &RawValue) -> Self {
        let text = || read_text(&raw.text, raw.text_len as usize);
        match ValueTag::from_raw(raw.tag) {
            None | Some(ValueTag::Unsupported) => GeneralValue::Unsupported,
            Some(ValueTag::Integer) => GeneralValue::Integer(raw.integer),
            Some(ValueTag::Integer64) => GeneralValue::Integer64(raw.integer),
            Some(ValueTag::Bool) => GeneralValue::Bool(raw.boolean != 0),
            Some(ValueTag::Float) => GeneralValue::Float(raw.float),
            Some(ValueTag::String) => GeneralValue::String(text()),
            Some(ValueTag::Array) => GeneralValue::Array(raw.integer as u64),
            Some(ValueTag::Error) => GeneralValue::Error(text()),
            Some(ValueTag::Pointer) => GeneralValue::Pointer(raw.integer as u64),
            Some(ValueTag::File) => GeneralValue::File(text()),
            Some(ValueTag::FileInfo) => GeneralValue::FileInfo(text()),
            Some(ValueTag::Connection) => GeneralValue::Connection(text()),
            Some(ValueTag::Time) => GeneralValue::Time(raw.integer),
            Some(ValueTag::Process) => GeneralValue::Process(raw.integer),
            Some(ValueTag::Signal) => GeneralValue::Signal(text()),
            Some(ValueTag::Context) => GeneralValue::Context(text()),
            Some(ValueTag::SockAddr) => GeneralValue::SockAddr(text()),
        }
    }

    /// Map an arbitrary value onto a tag by its concrete type, falling back to
    /// [`GeneralValue::Unsupported`] for types with no representation.
    pub fn from_any(value: &dyn Any) -> Self {
        macro_rules! try_types {
            ($($t:ty),+ $(,)?) => {
                $(
                    if let Some(v) = value.downcast_ref::<$t>() {
                        return GeneralValue::from(v.clone());
                    }
                )+
            };
        }
        try_types!(
            i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, bool, f32, f64, String, &'static str,
            PathBuf, Duration, SystemTime, SocketAddr, Signal, Pid, Errno,
        );
        if let Some(e) = value.downcast_ref::<io::Error>() {
            return GeneralValue::from(e);
        }
        GeneralValue::Unsupported
    }

    /// Like [`GeneralValue::from_any`], but names the rejected type in the log.
    pub fn encode_any<T: Any>(value: &T) -> Self {
        let v = Self::from_any(value);
        if v == GeneralValue::Unsupported {
            debug!(
                "no encoding for value of type {}, recording it as unsupported",
                std::any::type_name::<T>()
            );
        }
        v
    }
}

impl fmt::Display for GeneralValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GeneralValue::Integer(i) | GeneralValue::Integer64(i) | GeneralValue::Process(i) => {
                write!(f, "{}", i)
            }
            GeneralValue::Bool(b) => write!(f, "{}", b),
            GeneralValue::Float(x) => write!(f, "{}", x),
            GeneralValue::Array(n) => write!(f, "array(len={})", n),
            GeneralValue::Pointer(p) => write!(f, "{:#x}", p),
            GeneralValue::Time(ns) => write!(f, "{}ns", ns),
            GeneralValue::String(s)
            | GeneralValue::Error(s)
            | GeneralValue::File(s)
            | GeneralValue::FileInfo(s)
            | GeneralValue::Connection(s)
            | GeneralValue::Signal(s)
            | GeneralValue::Context(s)
            | GeneralValue::SockAddr(s) => f.write_str(s),
            GeneralValue::Unsupported => write!(f, "unsupported({})", UNSUPPORTED_VAL),
        }
    }
}

macro_rules! from_small_int {
    ($($t:ty),+) => {
        $(
            impl From<$t> for GeneralValue {
                fn from(v: $t) -> Self {
                    GeneralValue::Integer(i64::from(v))
                }
            }
        )+
    };
}

from_small_int!(i8, i16, i32, u8, u16, u32);

impl From<i64> for GeneralValue {
    fn from(v: i64) -> Self {
        GeneralValue::Integer64(v)
    }
}

impl From<isize> for GeneralValue {
    fn from(v: isize) -> Self {
        GeneralValue::Integer(v as i64)
    }
}

/// Unsigned values above `i64::MAX` have no representation.
impl From<u64> for GeneralValue {
    fn from(v: u64) -> Self {
        i64::try_from(v).map_or(GeneralValue::Unsupported, GeneralValue::Integer64)
    }
}

impl From<usize> for GeneralValue {
    fn from(v: usize) -> Self {
        i64::try_from(v).map_or(GeneralValue::Unsupported, GeneralValue::Integer)
    }
}

impl From<bool> for GeneralValue {
    fn from(v: bool) -> Self {
        GeneralValue::Bool(v)
    }
}

impl From<f32> for GeneralValue {
    fn from(v: f32) -> Self {
        GeneralValue::Float(f64::from(v))
    }
}

impl From<f64> for GeneralValue {
    fn from(v: f64) -> Self {
        GeneralValue::Float(v)
    }
}

impl From<&str> for GeneralValue {
    fn from(v: &str) -> Self {
        GeneralValue::String(v.to_owned())
    }
}

impl From<String> for GeneralValue {
    fn from(v: String) -> Self {
        GeneralValue::String(v)
    }
}

impl From<&Path> for GeneralValue {
    fn from(v: &Path) -> Self {
        GeneralValue::File(v.to_string_lossy().into_owned())
    }
}

impl From<PathBuf> for GeneralValue {
    fn from(v: PathBuf) -> Self {
        GeneralValue::from(v.as_path())
    }
}

impl From<&io::Error> for GeneralValue {
    fn from(v: &io::Error) -> Self {
        GeneralValue::Error(v.to_string())
    }
}

impl From<Errno> for GeneralValue {
    fn from(v: Errno) -> Self {
        GeneralValue::Error(v.desc().to_owned())
    }
}

impl From<Duration> for GeneralValue {
    fn from(v: Duration) -> Self {
        i64::try_from(v.as_nanos()).map_or(GeneralValue::Unsupported, GeneralValue::Time)
    }
}

/// Times before the unix epoch have no representation.
impl From<SystemTime> for GeneralValue {
    fn from(v: SystemTime) -> Self {
        v.duration_since(SystemTime::UNIX_EPOCH)
            .map_or(GeneralValue::Unsupported, GeneralValue::from)
    }
}

impl From<SocketAddr> for GeneralValue {
    fn from(v: SocketAddr) -> Self {
        GeneralValue::SockAddr(v.to_string())
    }
}

impl From<Signal> for GeneralValue {
    fn from(v: Signal) -> Self {
        GeneralValue::Signal(v.as_str().to_owned())
    }
}

impl From<Pid> for GeneralValue {
    fn from(v: Pid) -> Self {
        GeneralValue::Process(i64::from(v.as_raw()))
    }
}

/// Shared-memory form of a [`GeneralValue`]. Only the field selected by `tag`
/// is meaningful; the others stay zero.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct RawValue {
    pub tag: i32,
    /// [`UNSUPPORTED_VAL`] when the tag is `Unsupported`, zero otherwise.
    pub marker: i32,
    pub integer: i64,
    pub float: f64,
    pub boolean: u8,
    pub _pad: [u8; 3],
    pub text_len: u32,
    pub text: [u8; VAR_BUF_LEN],
}

/// Copy `s` into `buf`, truncated on a character boundary. Returns the number
/// of bytes written; the rest of `buf` is left untouched.
pub(crate) fn write_text(buf: &mut [u8], s: &str) -> usize {
    let mut end = s.len().min(buf.len());
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    if end < s.len() {
        debug!("truncating {}-byte text to {} bytes", s.len(), end);
    }
    buf[..end].copy_from_slice(&s.as_bytes()[..end]);
    end
}

/// Read `len` bytes of text, clamped to the buffer.
pub(crate) fn read_text(buf: &[u8], len: usize) -> String {
    String::from_utf8_lossy(&buf[..len.min(buf.len())]).into_owned()
}

/// The part of `s` a zero-padded buffer of `cap` bytes keeps: everything
/// before the first NUL, cut back to a char boundary.
pub(crate) fn padded_prefix(s: &str, cap: usize) -> &str {
    let s = match s.find('\0') {
        Some(nul) => &s[..nul],
        None => s,
    };
    let mut end = s.len().min(cap);
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// `s` reduced to what survives a zero-padded buffer of `cap` bytes.
pub(crate) fn padded_string(mut s: String, cap: usize) -> String {
    let kept = padded_prefix(&s, cap).len();
    if kept == s.len() {
        return s;
    }
    debug!("cutting {}-byte text to {} bytes for a padded field", s.len(), kept);
    s.truncate(kept);
    s
}

/// Write the [`padded_prefix`] of `s` into `buf`.
pub(crate) fn write_padded(buf: &mut [u8], s: &str) -> usize {
    let kept = padded_prefix(s, buf.len());
    buf[..kept.len()].copy_from_slice(kept.as_bytes());
    kept.len()
}

/// Read a zero-padded buffer up to its first NUL.
pub(crate) fn read_padded(buf: &[u8]) -> String {
    let end = buf.iter().position(|b| *b == 0).unwrap_or(buf.len());
    read_text(buf, end)
}

/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Types shared by the instrumented runtime, the global scheduler and the
//! tooling around them.
//!
//! Every record that lives in shared memory has an owned form, used by the
//! rest of the code, and a `Raw*` twin with a fixed `#[repr(C)]` layout that
//! both sides of the region read by offset.

#![deny(clippy::all)]
#![allow(clippy::uninlined_format_args)]

pub mod config;
pub mod consts;
pub mod coverage;
pub mod event;
pub mod mode;
pub mod schedule;
pub mod syscall;
pub mod task;
pub mod value;

pub use config::RuntimeConfig;
pub use coverage::Coverage;
pub use event::Event;
pub use event::EventKind;
pub use event::EventPayload;
pub use event::LogEntry;
pub use event::Message;
pub use event::Variable;
pub use mode::ControlMode;
pub use mode::Directive;
pub use mode::ProcStatus;
pub use schedule::Schedule;
pub use syscall::SyscallId;
pub use syscall::SyscallRecord;
pub use task::StatusWord;
pub use task::TaskDescriptor;
pub use task::TaskStatus;
pub use value::GeneralValue;

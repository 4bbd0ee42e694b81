/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Daracore is the shared-memory control plane between instrumented runtimes
//! and a global scheduler.
//!
//! Each monitored process owns one slot of a [`SharedRegion`]. The runtime
//! reports its scheduling points and calls through a [`RuntimeSlot`] (usually
//! via the lazily mapped [`Instrumentation`]); the scheduler inspects and
//! drives the slots through a [`Controller`], recording runs with a
//! [`Recorder`] and replaying them with a [`Replayer`].

#![deny(clippy::all)]
#![allow(clippy::uninlined_format_args)]

mod error;
mod instrument;
mod layout;
mod log;
mod region;
mod runtime;
mod scheduler;
mod spinlock;

pub use error::Error;
pub use error::Result;
pub use instrument::Instrumentation;
pub use layout::ProcControlBlock;
pub use layout::REGION_LEN;
pub use log::Drained;
pub use log::EventLog;
pub use region::SharedRegion;
pub use runtime::Resume;
pub use runtime::RuntimeSlot;
pub use runtime::RuntimeStats;
pub use scheduler::Controller;
pub use scheduler::Policy;
pub use scheduler::RoundSummary;
pub use scheduler::RunReporter;
pub use scheduler::SlotGuard;
pub use scheduler::recorder::Recorder;
pub use scheduler::replay_cursor::ReplayCursor;
pub use scheduler::replayer::Replayer;
pub use spinlock::Backoff;
pub use spinlock::SpinGuard;
pub use spinlock::SpinLock;

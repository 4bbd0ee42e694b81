/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

use std::io;

use dara_model::ProcStatus;
use thiserror::Error;

/// Failures of the control plane. Mapping errors are fatal for a monitored
/// process; the rest are returned to the caller.
#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to map the shared region: {0}")]
    Map(#[from] nix::Error),

    #[error("shared region is {actual} bytes, expected {expected}")]
    SizeMismatch { expected: usize, actual: usize },

    #[error("slot {slot} carries layout version {found}, expected {expected}")]
    LayoutMismatch { slot: usize, found: u32, expected: u32 },

    #[error("the inherited shared region is already mapped in this process")]
    AlreadyMapped,

    #[error("no slot index was given to the instrumented runtime")]
    MissingProcId,

    #[error("slot {slot} is out of range, the region has {channels} slots")]
    SlotOutOfRange { slot: usize, channels: usize },

    #[error("cannot move slot from {from} to {to}")]
    InvalidTransition { from: ProcStatus, to: ProcStatus },

    #[error("unexpected mode word {0}")]
    UnknownMode(i32),

    #[error("no task with gid {0} in the task table")]
    UnknownTask(i64),

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

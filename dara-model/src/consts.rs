/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Constants shared by the instrumented runtime and the global scheduler.
//!
//! Both sides interpret the same raw bytes by offset, so every value here is
//! part of the shared-memory layout. Changing any of them requires bumping
//! [`LAYOUT_VERSION`].

/// Version stamped into every process control block by the creator of the
/// region. An attacher that finds a different value refuses to map.
pub const LAYOUT_VERSION: u32 = 2;

/// The number of preallocated control blocks in shared memory.
/// Invariant: `CHANNELS > PROCS`.
pub const CHANNELS: usize = 4;

/// The maximum number of concurrently monitored processes.
pub const PROCS: usize = 3;

/// Descriptor number the shared region is inherited on, set up before launch.
pub const DARA_FD: i32 = 666;

/// Spinlock word states.
pub const UNLOCKED: u32 = 0;
/// See [`UNLOCKED`].
pub const LOCKED: u32 = 1;

/// Size of the task table in every control block.
pub const MAX_TASKS: usize = 4096;

/// Capacity of the per-process event ring.
pub const MAX_LOG_ENTRIES: usize = 4096;

/// Maximum number of variables in one variable dump.
pub const MAX_LOG_VARIABLES: usize = 128;

/// Length of every fixed text buffer in an encoded event.
pub const VAR_BUF_LEN: usize = 64;

/// Length of the spawning-function description of a task.
pub const FUNC_INFO_LEN: usize = 64;

/// Capacity of the per-process basic-block coverage table.
pub const MAX_BLOCKS: usize = 4096;

/// Length of a basic-block id in the coverage table.
pub const BLOCK_ID_LEN: usize = 256;

/// Argument and return capacity of a syscall record.
pub const SYSCALL_VALUE_CAPACITY: usize = 10;

/// Marker carried by values that could not be encoded.
pub const UNSUPPORTED_VAL: i32 = 2440;

/// Value of the blocking-syscall word when the process is not blocked.
pub const NO_SYSCALL: i32 = -1;

/// Granularity the region length is rounded up to.
pub const PAGE_SIZE: usize = 4096;

static_assertions::const_assert!(CHANNELS > PROCS);

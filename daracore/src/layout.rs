/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! The process control block, as laid out in shared memory.
//!
//! Both sides of the region read these bytes by offset, so the field order,
//! record sizes and offsets below are fixed for [`LAYOUT_VERSION`] and checked
//! at compile time.

use std::cell::UnsafeCell;
use std::mem::offset_of;
use std::mem::size_of;
use std::ptr;
use std::sync::atomic::AtomicI32;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use bytemuck::Zeroable;
use dara_model::Coverage;
use dara_model::Directive;
use dara_model::ProcStatus;
use dara_model::consts::CHANNELS;
use dara_model::consts::MAX_BLOCKS;
use dara_model::consts::LAYOUT_VERSION;
use dara_model::consts::MAX_LOG_ENTRIES;
use dara_model::consts::MAX_TASKS;
use dara_model::consts::NO_SYSCALL;
use dara_model::consts::PAGE_SIZE;
use dara_model::coverage::RawBlock;
use dara_model::event::RawEvent;
use dara_model::syscall::RawSyscall;
use dara_model::task::RawTask;
use dara_model::value::RawValue;
use static_assertions::const_assert_eq;

use crate::log::EventLog;
use crate::spinlock::SpinLock;

/// One monitored process's slot.
///
/// `lock` serializes the handshake, `syscall_lock` guards the blocking
/// syscall word. The non-atomic records are written by exactly one side at a
/// time under the protocol and are always accessed with volatile copies.
#[repr(C)]
pub struct ProcControlBlock {
    pub(crate) lock: SpinLock,
    pub(crate) syscall_lock: SpinLock,
    pub(crate) run: AtomicI32,
    pub(crate) syscall: AtomicI32,
    pub(crate) layout_version: AtomicU32,
    pub(crate) directive: AtomicU32,
    pub(crate) running_routine: UnsafeCell<RawTask>,
    pub(crate) routines: [UnsafeCell<RawTask>; MAX_TASKS],
    pub(crate) epoch: AtomicU64,
    pub(crate) log_index: AtomicU64,
    pub(crate) log: [UnsafeCell<RawEvent>; MAX_LOG_ENTRIES],
    pub(crate) block_count: AtomicU64,
    pub(crate) blocks: [BlockSlot; MAX_BLOCKS],
}

/// One row of the coverage table. The id is written once, before the row
/// is published through `block_count`.
#[repr(C)]
pub(crate) struct BlockSlot {
    pub(crate) hits: AtomicU64,
    pub(crate) id: UnsafeCell<RawBlock>,
}

// Safety: every field is either atomic or a plain-old-data record whose
// accesses are ordered by the spinlock or by the log cursor.
unsafe impl Sync for ProcControlBlock {}

const_assert_eq!(size_of::<RawValue>(), 96);
const_assert_eq!(size_of::<RawSyscall>(), 1936);
const_assert_eq!(size_of::<RawTask>(), 2032);
const_assert_eq!(size_of::<RawEvent>(), 28712);
const_assert_eq!(size_of::<RawBlock>(), 264);
const_assert_eq!(offset_of!(ProcControlBlock, run), 8);
const_assert_eq!(offset_of!(ProcControlBlock, directive), 20);
const_assert_eq!(offset_of!(ProcControlBlock, running_routine), 24);
const_assert_eq!(offset_of!(ProcControlBlock, routines), 2056);
const_assert_eq!(offset_of!(ProcControlBlock, epoch), 8_325_128);
const_assert_eq!(offset_of!(ProcControlBlock, log), 8_325_144);
const_assert_eq!(offset_of!(ProcControlBlock, block_count), 125_929_496);
const_assert_eq!(offset_of!(ProcControlBlock, blocks), 125_929_504);

/// Length of the shared mapping: every slot, rounded up to a page.
pub const REGION_LEN: usize =
    (CHANNELS * size_of::<ProcControlBlock>()).div_ceil(PAGE_SIZE) * PAGE_SIZE;

impl ProcControlBlock {
    /// Prepare a zeroed slot for first use.
    pub(crate) fn stamp(&self) {
        self.syscall.store(NO_SYSCALL, Ordering::Relaxed);
        let mut idle = RawTask::zeroed();
        idle.syscall = NO_SYSCALL;
        self.write_running(&idle);
        self.layout_version.store(LAYOUT_VERSION, Ordering::Release);
    }

    pub fn layout_version(&self) -> u32 {
        self.layout_version.load(Ordering::Acquire)
    }

    pub(crate) fn mode_word(&self) -> i32 {
        self.run.load(Ordering::Acquire)
    }

    pub(crate) fn mode(&self) -> Option<ProcStatus> {
        ProcStatus::from_raw(self.mode_word())
    }

    pub(crate) fn set_mode(&self, status: ProcStatus) {
        self.run.store(status as i32, Ordering::Release);
    }

    pub(crate) fn directive(&self) -> Option<Directive> {
        Directive::from_raw(self.directive.load(Ordering::Acquire))
    }

    pub(crate) fn set_directive(&self, d: Directive) {
        self.directive.store(d as u32, Ordering::Release);
    }

    pub(crate) fn read_running(&self) -> RawTask {
        // Safety: `running_routine` is inside the mapping and `RawTask` is
        // valid for any bit pattern.
        unsafe { ptr::read_volatile(self.running_routine.get()) }
    }

    pub(crate) fn write_running(&self, task: &RawTask) {
        // Safety: see `read_running`.
        unsafe { ptr::write_volatile(self.running_routine.get(), *task) }
    }

    pub(crate) fn read_routine(&self, index: usize) -> RawTask {
        // Safety: see `read_running`.
        unsafe { ptr::read_volatile(self.routines[index % MAX_TASKS].get()) }
    }

    pub(crate) fn write_routine(&self, index: usize, task: &RawTask) {
        // Safety: see `read_running`.
        unsafe { ptr::write_volatile(self.routines[index % MAX_TASKS].get(), *task) }
    }

    pub(crate) fn event_log(&self) -> EventLog<'_> {
        EventLog::new(&self.log, &self.log_index)
    }

    /// Number of published coverage rows.
    pub(crate) fn blocks_published(&self) -> usize {
        (self.block_count.load(Ordering::Acquire) as usize).min(MAX_BLOCKS)
    }

    pub(crate) fn read_block_id(&self, index: usize) -> RawBlock {
        // Safety: see `read_running`.
        unsafe { ptr::read_volatile(self.blocks[index % MAX_BLOCKS].id.get()) }
    }

    /// Fill row `index` and publish every row up to it. Only the slot's
    /// runtime writes rows, one at a time.
    pub(crate) fn publish_block(&self, index: usize, id: &RawBlock, hits: u64) {
        let row = &self.blocks[index % MAX_BLOCKS];
        // Safety: see `read_running`. The row is not published yet, so no
        // reader looks at it.
        unsafe { ptr::write_volatile(row.id.get(), *id) }
        row.hits.store(hits, Ordering::Relaxed);
        self.block_count.store(index as u64 + 1, Ordering::Release);
    }

    pub(crate) fn add_block_hit(&self, index: usize) {
        self.blocks[index % MAX_BLOCKS]
            .hits
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshot of the coverage table.
    pub(crate) fn coverage(&self) -> Coverage {
        (0..self.blocks_published())
            .map(|i| {
                let hits = self.blocks[i].hits.load(Ordering::Relaxed);
                (self.read_block_id(i).id(), hits)
            })
            .collect()
    }
}

/// Table index of a task id.
pub(crate) fn routine_index(gid: i64) -> usize {
    gid.rem_euclid(MAX_TASKS as i64) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn region_is_page_aligned() {
        assert_eq!(REGION_LEN % PAGE_SIZE, 0);
        assert!(REGION_LEN >= CHANNELS * size_of::<ProcControlBlock>());
        assert_eq!(size_of::<ProcControlBlock>() % 8, 0);
    }

    #[test]
    fn task_slots_wrap() {
        assert_eq!(routine_index(1), 1);
        assert_eq!(routine_index(MAX_TASKS as i64 + 3), 3);
        assert_eq!(routine_index(-1), MAX_TASKS - 1);
    }
}

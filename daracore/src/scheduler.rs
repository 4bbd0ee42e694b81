/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! The global scheduler's side of the handshake.
//!
//! The scheduler owns every mode transition except the two the runtime makes
//! for itself (first event and finished). Which task runs next is decided by
//! a [`Policy`]; this module only carries the decision into the slot.
//!
//! Slot locks are only ever held through a [`SlotGuard`], so a lock taken by
//! the scheduler is released on every path out of a round, panics included.
//! A lock that is never released hangs the monitored process for good.

pub mod recorder;
pub mod replay_cursor;
pub mod replayer;

use std::sync::Arc;
use std::sync::atomic::Ordering;

use dara_model::ControlMode;
use dara_model::Coverage;
use dara_model::Directive;
use dara_model::ProcStatus;
use dara_model::TaskDescriptor;
use dara_model::consts::CHANNELS;
use dara_model::consts::MAX_TASKS;
use dara_model::consts::NO_SYSCALL;
use serde::Serialize;
use tracing::debug;
use tracing::info;
use tracing::trace;

use crate::error::Error;
use crate::error::Result;
use crate::layout::ProcControlBlock;
use crate::layout::routine_index;
use crate::log::Drained;
use crate::log::EventLog;
use crate::region::SharedRegion;
use crate::spinlock::SpinGuard;

/// Chooses which task a waiting slot runs next.
pub trait Policy {
    /// Called with the slot locked and a request pending. Returning `None`
    /// leaves the runtime waiting until a later round.
    fn choose(&mut self, proc_id: usize, slot: &SlotGuard<'_>) -> Option<TaskDescriptor>;
}

/// Grants every request with the task that reported it, which lets the
/// monitored program run in its natural order.
#[derive(Debug, Default)]
pub struct RunReporter;

impl Policy for RunReporter {
    fn choose(&mut self, _proc_id: usize, slot: &SlotGuard<'_>) -> Option<TaskDescriptor> {
        Some(slot.running_routine())
    }
}

/// The result of one [`Controller::round`].
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct RoundSummary {
    /// Slots that were granted a task this round.
    pub granted: Vec<(usize, TaskDescriptor)>,
    /// Slots left waiting for a later round.
    pub waiting: usize,
}

/// Drives every slot of a region.
#[derive(Debug, Clone)]
pub struct Controller {
    region: Arc<SharedRegion>,
}

impl Controller {
    pub fn new(region: Arc<SharedRegion>) -> Self {
        Controller { region }
    }

    pub fn region(&self) -> &Arc<SharedRegion> {
        &self.region
    }

    /// Lock slot `proc_id`, spinning until its runtime lets go.
    pub fn lock(&self, proc_id: usize) -> Result<SlotGuard<'_>> {
        let pcb = self.region.slot(proc_id)?;
        let lock = pcb.lock.lock();
        Ok(SlotGuard {
            proc_id,
            pcb,
            _lock: lock,
        })
    }

    /// Lock slot `proc_id` if it is free.
    pub fn try_lock(&self, proc_id: usize) -> Result<Option<SlotGuard<'_>>> {
        let pcb = self.region.slot(proc_id)?;
        Ok(pcb.lock.try_lock().map(|lock| SlotGuard {
            proc_id,
            pcb,
            _lock: lock,
        }))
    }

    /// The mode word of slot `proc_id`, read without locking.
    pub fn mode(&self, proc_id: usize) -> Result<ProcStatus> {
        let pcb = self.region.slot(proc_id)?;
        pcb.mode().ok_or(Error::UnknownMode(pcb.mode_word()))
    }

    /// Select the control mode of slot `proc_id`. Returns the previous mode.
    /// Once a slot has seen the end of replay it stays there, and a finished
    /// slot can only move to recording.
    pub fn set_mode(&self, proc_id: usize, mode: ControlMode) -> Result<ProcStatus> {
        let guard = self.lock(proc_id)?;
        let from = guard.mode()?;
        let to = ProcStatus::from(mode);
        if from.is_terminal() || (from == ProcStatus::Finished && to.is_controlled()) {
            return Err(Error::InvalidTransition { from, to });
        }
        guard.pcb.set_mode(to);
        info!("[p{}] mode {} -> {}", proc_id, from, to);
        Ok(from)
    }

    /// Select `mode` for every slot.
    pub fn set_mode_all(&self, mode: ControlMode) -> Result<()> {
        for proc_id in 0..CHANNELS {
            self.set_mode(proc_id, mode)?;
        }
        Ok(())
    }

    /// End the replay in every slot, releasing every waiting runtime. Does
    /// not take the slot locks, so it works even if a lock is stuck.
    pub fn end_replay(&self) {
        for pcb in self.region.slots() {
            pcb.set_mode(ProcStatus::ReplayEnded);
        }
        info!("replay ended in all {} slots", CHANNELS);
    }

    /// One scheduling round: every controlled slot with a pending request is
    /// offered to `policy`.
    pub fn round(&self, policy: &mut impl Policy) -> RoundSummary {
        let mut summary = RoundSummary::default();
        for proc_id in 0..CHANNELS {
            let Ok(guard) = self.lock(proc_id) else {
                continue;
            };
            let controlled = guard.mode().is_ok_and(ProcStatus::is_controlled);
            if !controlled || !guard.pending_request() {
                continue;
            }
            match policy.choose(proc_id, &guard) {
                Some(task) => {
                    guard.grant(&task);
                    summary.granted.push((proc_id, task));
                }
                None => summary.waiting += 1,
            }
        }
        trace!(
            "round granted {} slots, {} waiting",
            summary.granted.len(),
            summary.waiting
        );
        summary
    }

    /// The event log of slot `proc_id`. Reading it needs no lock.
    pub fn log(&self, proc_id: usize) -> Result<EventLog<'_>> {
        Ok(self.region.slot(proc_id)?.event_log())
    }

    /// Events slot `proc_id` appended at or after `from`.
    pub fn drain(&self, proc_id: usize, from: u64) -> Result<Drained> {
        Ok(self.log(proc_id)?.read_since(from))
    }

    /// Block coverage slot `proc_id` has reported so far. Reading it needs
    /// no lock.
    pub fn coverage(&self, proc_id: usize) -> Result<Coverage> {
        Ok(self.region.slot(proc_id)?.coverage())
    }
}

/// A locked slot. The lock is released on drop.
pub struct SlotGuard<'a> {
    proc_id: usize,
    pcb: &'a ProcControlBlock,
    _lock: SpinGuard<'a>,
}

impl SlotGuard<'_> {
    pub fn proc_id(&self) -> usize {
        self.proc_id
    }

    pub fn mode(&self) -> Result<ProcStatus> {
        self.pcb
            .mode()
            .ok_or(Error::UnknownMode(self.pcb.mode_word()))
    }

    /// Whether the runtime is waiting for a decision.
    pub fn pending_request(&self) -> bool {
        self.pcb.directive() == Some(Directive::Requested)
    }

    /// The task that reported last, or that was granted last.
    pub fn running_routine(&self) -> TaskDescriptor {
        TaskDescriptor::decode(&self.pcb.read_running())
    }

    /// The table entry for `gid`.
    pub fn task(&self, gid: i64) -> Option<TaskDescriptor> {
        let raw = self.pcb.read_routine(routine_index(gid));
        (!raw.is_empty() && raw.gid == gid).then(|| TaskDescriptor::decode(&raw))
    }

    /// Every occupied entry of the task table.
    pub fn tasks(&self) -> Vec<TaskDescriptor> {
        (0..MAX_TASKS)
            .map(|i| self.pcb.read_routine(i))
            .filter(|raw| !raw.is_empty())
            .map(|raw| TaskDescriptor::decode(&raw))
            .collect()
    }

    /// The task spawned as number `routine_count` from `gpc`.
    pub fn find_task(&self, gpc: u64, routine_count: u64) -> Option<TaskDescriptor> {
        (0..MAX_TASKS)
            .map(|i| self.pcb.read_routine(i))
            .find(|raw| !raw.is_empty() && raw.gpc == gpc && raw.routine_count == routine_count)
            .map(|raw| TaskDescriptor::decode(&raw))
    }

    /// The syscall the process is blocked in, if any.
    pub fn blocking_syscall(&self) -> Option<i32> {
        let _syscall = self.pcb.syscall_lock.lock();
        let id = self.pcb.syscall.load(Ordering::Acquire);
        (id != NO_SYSCALL).then_some(id)
    }

    pub fn epoch(&self) -> u64 {
        self.pcb.epoch.load(Ordering::Acquire)
    }

    pub fn log_cursor(&self) -> u64 {
        self.pcb.event_log().cursor()
    }

    /// Let the waiting runtime resume `task`, and advance the epoch.
    pub fn grant(&self, task: &TaskDescriptor) {
        self.pcb.write_running(&task.encode());
        let epoch = self.pcb.epoch.fetch_add(1, Ordering::AcqRel) + 1;
        self.pcb.set_directive(Directive::Proceed);
        debug!("[p{}] epoch {}: granted {}", self.proc_id, epoch, task);
    }
}

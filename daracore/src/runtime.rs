/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! The instrumented runtime's side of the handshake.
//!
//! Every report is appended to the slot's log and published as the running
//! task. Whether the report then waits depends on the slot's mode: under
//! record the runtime never waits, under replay and exploration it spins
//! until the scheduler grants a task or ends the replay.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use dara_model::Coverage;
use dara_model::Directive;
use dara_model::Event;
use dara_model::EventKind;
use dara_model::EventPayload;
use dara_model::LogEntry;
use dara_model::Message;
use dara_model::ProcStatus;
use dara_model::StatusWord;
use dara_model::SyscallRecord;
use dara_model::TaskDescriptor;
use dara_model::config::DEFAULT_SPIN_LIMIT;
use dara_model::consts::MAX_BLOCKS;
use dara_model::consts::NO_SYSCALL;
use dara_model::coverage::RawBlock;
use dara_model::syscall::display_syscall;
use nix::time::ClockId;
use nix::time::clock_gettime;
use serde::Serialize;
use tracing::debug;
use tracing::info;
use tracing::trace;
use tracing::warn;

use crate::error::Error;
use crate::error::Result;
use crate::layout::ProcControlBlock;
use crate::layout::routine_index;
use crate::region::SharedRegion;
use crate::spinlock::Backoff;

/// What a reporting task does next.
#[derive(Debug, Clone, PartialEq)]
pub enum Resume {
    /// Carry on; the report did not wait.
    Continue,
    /// The scheduler selected this task to run.
    Run(TaskDescriptor),
    /// Replay has ended. Carry on uncontrolled.
    Released,
}

/// Counters kept by a runtime about its own reports.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RuntimeStats {
    pub reports: u64,
    /// Reports that waited for the scheduler.
    pub suspensions: u64,
    /// Back-off steps taken while waiting.
    pub spins: u64,
    /// Messages reported sent.
    pub sends: u64,
    /// Messages reported delivered.
    pub receives: u64,
    /// Block hits dropped because the coverage table was full.
    pub dropped_blocks: u64,
}

/// A runtime attached to its slot.
#[derive(Debug)]
pub struct RuntimeSlot {
    region: Arc<SharedRegion>,
    proc_id: usize,
    enforcing: bool,
    spin_limit: u32,
    spawn_counts: HashMap<u64, u64>,
    /// Coverage table row of every block id reported so far.
    blocks: HashMap<String, usize>,
    stats: RuntimeStats,
}

impl RuntimeSlot {
    /// Attach to slot `proc_id`. The slot enforces the protocol by default.
    pub fn attach(region: Arc<SharedRegion>, proc_id: usize) -> Result<Self> {
        let pcb = region.slot(proc_id)?;
        let blocks: HashMap<String, usize> = (0..pcb.blocks_published())
            .map(|i| (pcb.read_block_id(i).id(), i))
            .collect();
        if !blocks.is_empty() {
            debug!("[p{}] picking up {} covered blocks", proc_id, blocks.len());
        }
        Ok(RuntimeSlot {
            region,
            proc_id,
            enforcing: true,
            spin_limit: DEFAULT_SPIN_LIMIT,
            spawn_counts: HashMap::new(),
            blocks,
            stats: RuntimeStats::default(),
        })
    }

    /// Whether reports wait under replay and exploration. When off, every
    /// report is logged and returns immediately.
    pub fn enforcing(mut self, on: bool) -> Self {
        self.enforcing = on;
        self
    }

    pub fn with_spin_limit(mut self, limit: u32) -> Self {
        self.spin_limit = limit;
        self
    }

    pub fn proc_id(&self) -> usize {
        self.proc_id
    }

    pub fn stats(&self) -> RuntimeStats {
        self.stats
    }

    /// The current mode word, if it holds a known value.
    pub fn mode(&self) -> Option<ProcStatus> {
        self.pcb().mode()
    }

    fn pcb(&self) -> &ProcControlBlock {
        &self.region.slots()[self.proc_id]
    }

    /// Register a new task spawned from `gpc`. Tasks spawned from the same
    /// site are numbered 0, 1, ... in spawn order.
    pub fn spawn_task(&mut self, gid: i64, gpc: u64, func_info: &str) -> TaskDescriptor {
        if gid == 0 {
            warn!("task id 0 marks an empty table slot, task at {:#x} will not be found", gpc);
        }
        let count = self.spawn_counts.entry(gpc).or_insert(0);
        let task = TaskDescriptor::new(gid, gpc, *count, func_info);
        *count += 1;
        let index = routine_index(gid);
        let previous = self.pcb().read_routine(index);
        if !previous.is_empty() && previous.gid != gid {
            debug!("task {} takes over table slot {} from task {}", gid, index, previous.gid);
        }
        self.pcb().write_routine(index, &task.encode());
        trace!("[p{}] spawned {}", self.proc_id, task);
        task
    }

    /// The table entry for `gid`.
    pub fn task(&self, gid: i64) -> Option<TaskDescriptor> {
        let raw = self.pcb().read_routine(routine_index(gid));
        (!raw.is_empty() && raw.gid == gid).then(|| TaskDescriptor::decode(&raw))
    }

    /// Move task `gid` to `status`. Unexpected transitions are logged but
    /// still applied; the host runtime is the authority on task states.
    pub fn set_status(&mut self, gid: i64, status: StatusWord) -> Result<TaskDescriptor> {
        let mut task = self.task(gid).ok_or(Error::UnknownTask(gid))?;
        if let (Some(from), Some(to)) = (task.status.logical(), status.logical()) {
            if !from.can_become(to) {
                warn!("[p{}] task {} moved from {} to {}", self.proc_id, gid, from, to);
            }
        } else {
            warn!("[p{}] task {} has unknown status {} -> {}", self.proc_id, gid, task.status, status);
        }
        task.status = status;
        self.pcb().write_routine(routine_index(gid), &task.encode());
        Ok(task)
    }

    /// Report `payload` on behalf of task `gid` and wait if the mode asks for
    /// it.
    pub fn report(&mut self, gid: i64, payload: EventPayload) -> Result<Resume> {
        let mut task = self.task(gid).ok_or(Error::UnknownTask(gid))?;
        let kind = payload.kind();
        task.syscall = match &payload {
            EventPayload::Syscall(rec) => Some(rec.clone()),
            _ => None,
        };
        self.stats.reports += 1;

        let region = Arc::clone(&self.region);
        let pcb = &region.slots()[self.proc_id];
        let event = Event {
            proc_id: self.proc_id,
            task: task.clone(),
            epoch: pcb.epoch.load(Ordering::Acquire),
            stamp: monotonic_nanos(),
            payload,
        };
        pcb.event_log().append(&event.encode());
        let raw_task = task.encode();
        pcb.write_routine(routine_index(gid), &raw_task);
        {
            let _syscall = pcb.syscall_lock.lock();
            pcb.write_running(&raw_task);
            let id = task.syscall.as_ref().map_or(NO_SYSCALL, |rec| rec.syscall);
            pcb.syscall.store(id, Ordering::Release);
        }

        let mode = match pcb.mode() {
            Some(ProcStatus::Uninitialized) => {
                match pcb.run.compare_exchange(
                    ProcStatus::Uninitialized as i32,
                    ProcStatus::FirstEvent as i32,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                ) {
                    Ok(_) => {
                        info!("[p{}] first event reported, waiting for a mode", self.proc_id);
                        ProcStatus::FirstEvent
                    }
                    Err(now) => ProcStatus::from_raw(now).ok_or(Error::UnknownMode(now))?,
                }
            }
            Some(mode) => mode,
            None => return Err(Error::UnknownMode(pcb.mode_word())),
        };

        if mode == ProcStatus::RecordActive && kind == EventKind::Schedule {
            pcb.epoch.fetch_add(1, Ordering::AcqRel);
        }
        if !self.enforcing {
            return Ok(Resume::Continue);
        }
        match mode {
            ProcStatus::FirstEvent | ProcStatus::ReplayActive | ProcStatus::ExploreActive => {
                Ok(self.await_turn(pcb))
            }
            ProcStatus::Uninitialized
            | ProcStatus::RecordActive
            | ProcStatus::Finished
            | ProcStatus::ReplayEnded => Ok(Resume::Continue),
        }
    }

    pub fn report_syscall(&mut self, gid: i64, record: SyscallRecord) -> Result<Resume> {
        debug!("[p{}] g{} {}", self.proc_id, gid, display_syscall(record.syscall));
        self.report(gid, EventPayload::Syscall(record))
    }

    pub fn report_send(&mut self, gid: i64, body: &[u8]) -> Result<Resume> {
        let resume = self.report(gid, EventPayload::Send(Message::new(body)))?;
        self.stats.sends += 1;
        Ok(resume)
    }

    pub fn report_receive(&mut self, gid: i64, body: &[u8]) -> Result<Resume> {
        let resume = self.report(gid, EventPayload::Receive(Message::new(body)))?;
        self.stats.receives += 1;
        Ok(resume)
    }

    /// Count one execution of basic block `id`. Never waits. Once the
    /// coverage table is full, hits on blocks not yet in it are dropped.
    pub fn report_block(&mut self, id: &str) {
        let pcb = &self.region.slots()[self.proc_id];
        if let Some(&index) = self.blocks.get(id) {
            pcb.add_block_hit(index);
            return;
        }
        let index = self.blocks.len();
        if index >= MAX_BLOCKS {
            if self.stats.dropped_blocks == 0 {
                warn!(
                    "[p{}] coverage table is full at {} blocks, dropping {}",
                    self.proc_id, MAX_BLOCKS, id
                );
            }
            self.stats.dropped_blocks += 1;
            return;
        }
        pcb.publish_block(index, &RawBlock::new(id), 1);
        self.blocks.insert(id.to_owned(), index);
        trace!("[p{}] block {} is row {}", self.proc_id, id, index);
    }

    /// Block coverage reported through this slot so far.
    pub fn coverage(&self) -> Coverage {
        self.pcb().coverage()
    }

    pub fn report_log(&mut self, gid: i64, entry: LogEntry) -> Result<Resume> {
        self.report(gid, EventPayload::Log(entry))
    }

    /// Report that the runtime's own scheduler is about to run task `gid`.
    pub fn report_schedule(&mut self, gid: i64) -> Result<Resume> {
        self.report(gid, EventPayload::Schedule)
    }

    /// Tell the scheduler this runtime has no tasks left. Only meaningful
    /// under replay or exploration.
    pub fn finish(&mut self) -> Result<()> {
        let pcb = self.pcb();
        let from = pcb.mode().ok_or(Error::UnknownMode(pcb.mode_word()))?;
        if !from.is_controlled() {
            return Err(Error::InvalidTransition {
                from,
                to: ProcStatus::Finished,
            });
        }
        pcb.run
            .compare_exchange(
                from as i32,
                ProcStatus::Finished as i32,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map_err(|now| Error::InvalidTransition {
                from: ProcStatus::from_raw(now).unwrap_or(from),
                to: ProcStatus::Finished,
            })?;
        info!("[p{}] finished", self.proc_id);
        Ok(())
    }

    /// Raise a request and spin until the scheduler answers it or the mode
    /// stops calling for control.
    fn await_turn(&mut self, pcb: &ProcControlBlock) -> Resume {
        self.stats.suspensions += 1;
        let mut backoff = Backoff::new(self.spin_limit);
        {
            let _lock = pcb.lock.lock_with(&mut backoff);
            pcb.set_directive(Directive::Requested);
        }
        debug!("[p{}] waiting for the scheduler", self.proc_id);
        backoff.reset();
        let resume = loop {
            {
                let _lock = pcb.lock.lock_with(&mut backoff);
                match pcb.mode() {
                    Some(ProcStatus::ReplayEnded) => {
                        pcb.set_directive(Directive::Idle);
                        break Resume::Released;
                    }
                    Some(ProcStatus::ReplayActive | ProcStatus::ExploreActive) => {
                        if pcb.directive() == Some(Directive::Proceed) {
                            pcb.set_directive(Directive::Idle);
                            break Resume::Run(TaskDescriptor::decode(&pcb.read_running()));
                        }
                    }
                    Some(ProcStatus::FirstEvent) => {}
                    Some(
                        ProcStatus::RecordActive
                        | ProcStatus::Finished
                        | ProcStatus::Uninitialized,
                    )
                    | None => {
                        pcb.set_directive(Directive::Idle);
                        break Resume::Continue;
                    }
                }
            }
            backoff.snooze();
        };
        self.stats.spins += backoff.snoozes();
        match &resume {
            Resume::Run(task) => debug!("[p{}] granted {}", self.proc_id, task),
            Resume::Released => info!("[p{}] released, replay ended", self.proc_id),
            Resume::Continue => debug!("[p{}] released without a grant", self.proc_id),
        }
        resume
    }
}

/// Nanoseconds on the system-wide monotonic clock, comparable across the
/// processes sharing a region. Zero if the clock cannot be read.
fn monotonic_nanos() -> u64 {
    match clock_gettime(ClockId::CLOCK_MONOTONIC) {
        Ok(ts) => u64::try_from(ts.tv_sec())
            .unwrap_or(0)
            .saturating_mul(1_000_000_000)
            .saturating_add(u64::try_from(ts.tv_nsec()).unwrap_or(0)),
        Err(e) => {
            warn!("cannot read the monotonic clock: {}", e);
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use dara_model::SyscallId;
    use dara_model::TaskStatus;
    use dara_model::GeneralValue;
    use pretty_assertions::assert_eq;

    use super::*;

    fn slot() -> RuntimeSlot {
        let region = Arc::new(SharedRegion::create_anonymous().unwrap());
        RuntimeSlot::attach(region, 0).unwrap()
    }

    #[test]
    fn same_site_tasks_are_numbered() {
        let mut rt = slot();
        let a = rt.spawn_task(1, 0x4000, "main.main.func1");
        let b = rt.spawn_task(2, 0x4000, "main.main.func1");
        let c = rt.spawn_task(3, 0x5000, "main.other");
        assert_eq!((a.gpc, a.routine_count), (0x4000, 0));
        assert_eq!((b.gpc, b.routine_count), (0x4000, 1));
        assert_eq!(c.routine_count, 0);
        assert_eq!(rt.task(2), Some(b));
    }

    #[test]
    fn status_updates_keep_scan_bit() {
        let mut rt = slot();
        rt.spawn_task(7, 0x10, "f");
        rt.set_status(7, TaskStatus::Runnable.into()).unwrap();
        let t = rt.set_status(7, StatusWord::scanning(TaskStatus::Runnable)).unwrap();
        assert_eq!(t.status.0, 0x1001);
        assert_eq!(rt.task(7).unwrap().status.logical(), Some(TaskStatus::Runnable));
        assert!(matches!(
            rt.set_status(99, TaskStatus::Dead.into()),
            Err(Error::UnknownTask(99))
        ));
    }

    #[test]
    fn first_report_moves_to_first_event() {
        let mut rt = slot().enforcing(false);
        rt.spawn_task(1, 0x10, "main.main");
        assert_eq!(rt.mode(), Some(ProcStatus::Uninitialized));
        assert_eq!(rt.report_schedule(1).unwrap(), Resume::Continue);
        assert_eq!(rt.mode(), Some(ProcStatus::FirstEvent));
        assert_eq!(rt.stats().suspensions, 0);
    }

    #[test]
    fn syscall_word_tracks_reports() {
        let mut rt = slot().enforcing(false);
        rt.spawn_task(1, 0x10, "main.main");
        let rec = SyscallRecord::new(SyscallId::Sleep, [GeneralValue::Time(5)], []);
        rt.report_syscall(1, rec.clone()).unwrap();
        let pcb = rt.pcb();
        assert_eq!(pcb.syscall.load(Ordering::Acquire), SyscallId::Sleep as i32);
        assert_eq!(
            TaskDescriptor::decode(&pcb.read_running()).syscall,
            Some(rec)
        );
        rt.report_send(1, b"x").unwrap();
        assert_eq!(rt.pcb().syscall.load(Ordering::Acquire), NO_SYSCALL);
        assert_eq!(rt.pcb().event_log().cursor(), 2);
    }

    #[test]
    fn finish_requires_control() {
        let mut rt = slot();
        assert!(matches!(
            rt.finish(),
            Err(Error::InvalidTransition { .. })
        ));
        rt.pcb().set_mode(ProcStatus::ReplayActive);
        rt.finish().unwrap();
        assert_eq!(rt.mode(), Some(ProcStatus::Finished));
    }

    #[test]
    fn unknown_gid_is_rejected() {
        let mut rt = slot();
        assert!(matches!(rt.report_schedule(5), Err(Error::UnknownTask(5))));
        assert_eq!(rt.stats().reports, 0);
    }

    #[test]
    fn reports_are_stamped_in_order() {
        let mut rt = slot().enforcing(false);
        rt.spawn_task(1, 0x10, "main.main");
        for _ in 0..3 {
            rt.report_schedule(1).unwrap();
        }
        let stamps: Vec<u64> = rt
            .pcb()
            .event_log()
            .read_since(0)
            .events
            .iter()
            .map(|e| e.stamp)
            .collect();
        assert_eq!(stamps.len(), 3);
        assert!(stamps[0] > 0);
        assert!(stamps.windows(2).all(|w| w[0] <= w[1]), "{:?}", stamps);
    }

    #[test]
    fn message_counters() {
        let mut rt = slot().enforcing(false);
        rt.spawn_task(1, 0x10, "main.main");
        rt.report_send(1, b"a").unwrap();
        rt.report_send(1, b"b").unwrap();
        rt.report_receive(1, b"a").unwrap();
        assert!(rt.report_send(2, b"c").is_err());
        let stats = rt.stats();
        assert_eq!((stats.sends, stats.receives, stats.reports), (2, 1, 3));
    }

    #[test]
    fn coverage_table_fills_up() {
        let mut rt = slot();
        for i in 0..MAX_BLOCKS {
            rt.report_block(&format!("b{}", i));
        }
        rt.report_block("b0");
        rt.report_block("one too many");
        rt.report_block("one too many");
        let cov = rt.coverage();
        assert_eq!(cov.blocks(), MAX_BLOCKS);
        assert_eq!(cov.hits("b0"), 2);
        assert_eq!(cov.hits("one too many"), 0);
        assert_eq!(rt.stats().dropped_blocks, 2);
    }

    #[test]
    fn reattach_keeps_coverage_rows() {
        let region = Arc::new(SharedRegion::create_anonymous().unwrap());
        let mut first = RuntimeSlot::attach(region.clone(), 3).unwrap();
        first.report_block("loop");
        first.report_block("exit");
        drop(first);
        let mut second = RuntimeSlot::attach(region, 3).unwrap();
        second.report_block("loop");
        let cov = second.coverage();
        assert_eq!(cov.blocks(), 2);
        assert_eq!(cov.hits("loop"), 2);
    }
}

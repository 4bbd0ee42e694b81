/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! The runtime/scheduler handshake, with runtimes on their own threads.

use std::thread;

use dara_model::ControlMode;
use dara_model::EventPayload;
use dara_model::GeneralValue;
use dara_model::ProcStatus;
use dara_model::SyscallId;
use dara_model::SyscallRecord;
use daracore::Resume;
use daracore::RuntimeSlot;
use pretty_assertions::assert_eq;

use crate::testutils::assert_still_waiting;
use crate::testutils::controlled_region;
use crate::testutils::wait_for_request;

#[test]
fn first_event_waits_for_grant() {
    let (region, ctl) = controlled_region();
    let mut rt = RuntimeSlot::attach(region, 0).unwrap();
    rt.spawn_task(1, 0x100, "main.main");
    let worker = rt.spawn_task(2, 0x200, "main.worker");

    let handle = thread::spawn(move || {
        let resume = rt.report_schedule(1).unwrap();
        (rt, resume)
    });

    drop(wait_for_request(&ctl, 0));
    assert_eq!(ctl.mode(0).unwrap(), ProcStatus::FirstEvent);
    assert_still_waiting(&handle);

    // Choosing a mode alone does not release the runtime.
    assert_eq!(
        ctl.set_mode(0, ControlMode::Replay).unwrap(),
        ProcStatus::FirstEvent
    );
    assert_still_waiting(&handle);

    let guard = wait_for_request(&ctl, 0);
    assert_eq!(guard.running_routine().gid, 1);
    guard.grant(&worker);
    assert_eq!(guard.epoch(), 1);
    drop(guard);

    let (rt, resume) = handle.join().unwrap();
    assert_eq!(resume, Resume::Run(worker));
    assert_eq!(rt.stats().reports, 1);
    assert_eq!(rt.stats().suspensions, 1);
    assert!(!ctl.lock(0).unwrap().pending_request());
}

#[test]
fn record_never_suspends() {
    let (region, ctl) = controlled_region();
    ctl.set_mode(2, ControlMode::Record).unwrap();
    let mut rt = RuntimeSlot::attach(region, 2).unwrap();
    rt.spawn_task(1, 0x100, "main.main");
    rt.spawn_task(2, 0x200, "main.worker");

    for i in 0..50 {
        let gid = 1 + i % 2;
        assert_eq!(rt.report_schedule(gid).unwrap(), Resume::Continue);
        assert_eq!(rt.report_send(gid, b"ping").unwrap(), Resume::Continue);
    }

    assert_eq!(rt.stats().reports, 100);
    assert_eq!(rt.stats().suspensions, 0);
    let guard = ctl.lock(2).unwrap();
    assert_eq!(guard.epoch(), 50);
    assert_eq!(guard.log_cursor(), 100);
    assert_eq!(guard.mode().unwrap(), ProcStatus::RecordActive);
}

#[test]
fn end_replay_releases_every_waiter() {
    let (region, ctl) = controlled_region();
    ctl.set_mode_all(ControlMode::Replay).unwrap();

    let handles: Vec<_> = (0..2)
        .map(|proc_id| {
            let mut rt = RuntimeSlot::attach(region.clone(), proc_id).unwrap();
            rt.spawn_task(7, 0x100, "main.main");
            thread::spawn(move || {
                let resume = rt.report_schedule(7).unwrap();
                (rt, resume)
            })
        })
        .collect();

    for proc_id in 0..2 {
        drop(wait_for_request(&ctl, proc_id));
    }
    ctl.end_replay();

    for handle in handles {
        let (mut rt, resume) = handle.join().unwrap();
        assert_eq!(resume, Resume::Released);
        // Nothing waits once the replay is over.
        assert_eq!(rt.report_schedule(7).unwrap(), Resume::Continue);
        assert_eq!(rt.stats().suspensions, 1);
        assert_eq!(rt.mode(), Some(ProcStatus::ReplayEnded));
    }
}

#[test]
fn switching_to_record_lets_waiter_continue() {
    let (region, ctl) = controlled_region();
    ctl.set_mode(1, ControlMode::Explore).unwrap();
    let mut rt = RuntimeSlot::attach(region, 1).unwrap();
    rt.spawn_task(3, 0x100, "main.main");

    let handle = thread::spawn(move || rt.report_schedule(3).unwrap());
    drop(wait_for_request(&ctl, 1));
    assert_still_waiting(&handle);
    ctl.set_mode(1, ControlMode::Record).unwrap();
    assert_eq!(handle.join().unwrap(), Resume::Continue);
}

#[test]
fn explore_can_pick_another_task() {
    let (region, ctl) = controlled_region();
    ctl.set_mode(0, ControlMode::Explore).unwrap();
    let mut rt = RuntimeSlot::attach(region, 0).unwrap();
    rt.spawn_task(1, 0x100, "main.main");
    rt.spawn_task(2, 0x200, "main.worker");
    rt.spawn_task(3, 0x200, "main.worker");

    let handle = thread::spawn(move || {
        let first = rt.report_schedule(2).unwrap();
        let second = rt.report_schedule(3).unwrap();
        (first, second)
    });

    let guard = wait_for_request(&ctl, 0);
    assert_eq!(guard.running_routine().gid, 2);
    let pick = guard.find_task(0x200, 1).unwrap();
    guard.grant(&pick);
    drop(guard);

    let guard = wait_for_request(&ctl, 0);
    assert_eq!(guard.running_routine().gid, 3);
    let pick = guard.task(1).unwrap();
    guard.grant(&pick);
    drop(guard);

    let (first, second) = handle.join().unwrap();
    assert!(matches!(first, Resume::Run(t) if t.gid == 3));
    assert!(matches!(second, Resume::Run(t) if t.gid == 1));
}

#[test]
fn non_enforcing_runtime_reports_without_waiting() {
    let (region, ctl) = controlled_region();
    ctl.set_mode(3, ControlMode::Replay).unwrap();
    let mut rt = RuntimeSlot::attach(region, 3).unwrap().enforcing(false);
    rt.spawn_task(1, 0x100, "main.main");

    assert_eq!(rt.report_schedule(1).unwrap(), Resume::Continue);
    assert_eq!(rt.stats().suspensions, 0);
    let guard = ctl.lock(3).unwrap();
    assert!(!guard.pending_request());
    assert_eq!(guard.log_cursor(), 1);
}

#[test]
fn syscall_record_reaches_the_log() {
    let (region, ctl) = controlled_region();
    ctl.set_mode(0, ControlMode::Record).unwrap();
    let mut rt = RuntimeSlot::attach(region, 0).unwrap();
    rt.spawn_task(5, 0x100, "main.main");

    let record = SyscallRecord::new(
        SyscallId::Write,
        [
            GeneralValue::File("/tmp/out.txt".into()),
            GeneralValue::Array(12),
            GeneralValue::Integer(0),
        ],
        [GeneralValue::Integer(12)],
    );
    rt.report_syscall(5, record.clone()).unwrap();

    let events = ctl.log(0).unwrap().snapshot();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].task.gid, 5);
    assert_eq!(events[0].payload, EventPayload::Syscall(record.clone()));
    assert_eq!(events[0].task.syscall, Some(record));
    assert_eq!(
        ctl.lock(0).unwrap().blocking_syscall(),
        Some(SyscallId::Write as i32)
    );

    // A later non-syscall report clears the blocking syscall.
    rt.report_schedule(5).unwrap();
    assert_eq!(ctl.lock(0).unwrap().blocking_syscall(), None);
}

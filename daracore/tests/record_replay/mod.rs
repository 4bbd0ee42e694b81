/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Record a run, then replay it in a fresh region.

use std::thread;
use std::time::Duration;
use std::time::Instant;

use dara_model::ControlMode;
use dara_model::Event;
use dara_model::EventKind;
use dara_model::EventPayload;
use dara_model::GeneralValue;
use dara_model::LogEntry;
use dara_model::Schedule;
use dara_model::SyscallId;
use dara_model::SyscallRecord;
use dara_model::TaskDescriptor;
use dara_model::Variable;
use dara_model::consts::CHANNELS;
use dara_model::consts::MAX_LOG_ENTRIES;
use daracore::Controller;
use daracore::Recorder;
use daracore::Replayer;
use daracore::Resume;
use daracore::RuntimeSlot;
use pretty_assertions::assert_eq;
use test_case::test_case;

use crate::testutils::controlled_region;
use crate::testutils::wait_for_request;

const STEPS: usize = 5;

/// Attach to `proc_id` and spawn the same three tasks every run. Task ids
/// are offset by `base`, as they would differ between runs.
fn start(ctl: &Controller, proc_id: usize, base: i64) -> RuntimeSlot {
    let mut rt = RuntimeSlot::attach(ctl.region().clone(), proc_id).unwrap();
    rt.spawn_task(base + 1, 0x100, "main.main");
    rt.spawn_task(base + 2, 0x200, "main.worker");
    rt.spawn_task(base + 3, 0x200, "main.worker");
    rt
}

/// One step of the program. Returns the reporting task and the outcome.
fn step(rt: &mut RuntimeSlot, base: i64, n: usize) -> (i64, Resume) {
    let (gid, resume) = match n {
        0 => (base + 1, rt.report_schedule(base + 1)),
        1 => (
            base + 2,
            rt.report_syscall(
                base + 2,
                SyscallRecord::new(
                    SyscallId::Getenv,
                    [GeneralValue::from("HOME")],
                    [GeneralValue::from("/root")],
                ),
            ),
        ),
        2 => (base + 3, rt.report_send(base + 3, b"x")),
        3 => (
            base + 1,
            rt.report_log(
                base + 1,
                LogEntry::new(
                    "main.go:12",
                    [Variable::new("n", &GeneralValue::Integer(n as i64))],
                ),
            ),
        ),
        _ => (base + 3, rt.report_schedule(base + 3)),
    };
    (gid, resume.unwrap())
}

/// Record two slots taking turns. The recorder either drains after every
/// step or once at the end, as `dara dump` does.
fn record(drain_each_step: bool) -> Schedule {
    let (_region, ctl) = controlled_region();
    ctl.set_mode_all(ControlMode::Record).unwrap();
    let mut runtimes: Vec<_> = (0..2).map(|p| start(&ctl, p, 10 * p as i64)).collect();
    let mut recorder = Recorder::new();
    for n in 0..STEPS {
        for (p, rt) in runtimes.iter_mut().enumerate() {
            assert_eq!(step(rt, 10 * p as i64, n).1, Resume::Continue);
            if drain_each_step {
                assert_eq!(recorder.drain(&ctl).unwrap(), 1);
            }
        }
    }
    if !drain_each_step {
        assert_eq!(recorder.drain(&ctl).unwrap(), 2 * STEPS);
    }
    assert_eq!(recorder.lost(), 0);
    recorder.finish()
}

/// Run rounds until the replayer is exhausted, returning the granted slots in
/// order.
fn drive(ctl: &Controller, replayer: &mut Replayer) -> Vec<usize> {
    let start = Instant::now();
    let mut order = Vec::new();
    while !replayer.is_exhausted() {
        let summary = ctl.round(replayer);
        order.extend(summary.granted.iter().map(|(p, _)| *p));
        assert!(
            start.elapsed() < Duration::from_secs(20),
            "replay stalled after {:?}",
            order
        );
        thread::yield_now();
    }
    order
}

#[test_case(true; "drained every step")]
#[test_case(false; "drained once")]
fn recorded_order_is_replayed(drain_each_step: bool) {
    let schedule = record(drain_each_step);
    assert_eq!(schedule.events.len(), 2 * STEPS);
    let recorded: Vec<usize> = schedule.events.iter().map(|e| e.proc_id).collect();
    assert_eq!(recorded, [0usize, 1].repeat(STEPS));
    assert_eq!(schedule.count(EventKind::Schedule), 4);
    assert_eq!(schedule.for_proc(1).count(), STEPS);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("schedule.json");
    schedule.write_to_disk(&path).unwrap();
    let schedule = Schedule::read_from_disk(&path).unwrap();

    let (_region, ctl) = controlled_region();
    ctl.set_mode_all(ControlMode::Replay).unwrap();
    let handles: Vec<_> = (0..2)
        .map(|p| {
            let base = 1000 + 10 * p as i64;
            let mut rt = start(&ctl, p, base);
            thread::spawn(move || {
                (0..STEPS)
                    .map(|n| step(&mut rt, base, n))
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut replayer = Replayer::new(schedule);
    let order = drive(&ctl, &mut replayer);
    ctl.end_replay();

    assert_eq!(order, [0usize, 1].repeat(STEPS));
    assert_eq!(replayer.replayed(), 2 * STEPS);
    assert_eq!(replayer.desyncs(), 0);
    for handle in handles {
        for (gid, resume) in handle.join().unwrap() {
            assert!(
                matches!(&resume, Resume::Run(t) if t.gid == gid),
                "task {} got {:?}",
                gid,
                resume
            );
        }
    }
}

fn scheduled(proc_id: usize, gid: i64, gpc: u64, count: u64) -> Event {
    Event {
        proc_id,
        task: TaskDescriptor::new(gid, gpc, count, "main.worker"),
        epoch: 0,
        stamp: 0,
        payload: EventPayload::Schedule,
    }
}

#[test]
fn desync_resumes_the_reporter() {
    // Recorded: task (0x100, 0) then (0x200, 0). The replayed run swaps them.
    let schedule = Schedule::new(vec![scheduled(0, 1, 0x100, 0), scheduled(0, 2, 0x200, 0)]);
    let (_region, ctl) = controlled_region();
    ctl.set_mode(0, ControlMode::Replay).unwrap();
    let mut rt = start(&ctl, 0, 40);
    let handle = thread::spawn(move || {
        [
            rt.report_schedule(42).unwrap(),
            rt.report_schedule(41).unwrap(),
        ]
    });

    let mut replayer = Replayer::new(schedule);
    drive(&ctl, &mut replayer);
    let resumes = handle.join().unwrap();

    assert_eq!(replayer.desyncs(), 2);
    assert!(matches!(&resumes[0], Resume::Run(t) if t.gid == 42));
    assert!(matches!(&resumes[1], Resume::Run(t) if t.gid == 41));
}

#[test]
fn per_slot_replay_lets_slots_overtake() {
    let schedule = Schedule::new(vec![scheduled(1, 11, 0x100, 0), scheduled(0, 1, 0x100, 0)]);
    let (_region, ctl) = controlled_region();
    ctl.set_mode(0, ControlMode::Replay).unwrap();
    let mut rt = start(&ctl, 0, 0);
    let handle = thread::spawn(move || rt.report_schedule(1).unwrap());
    drop(wait_for_request(&ctl, 0));

    // Slot 1 owns the next event and never reports.
    let mut strict = Replayer::new(schedule.clone());
    let summary = ctl.round(&mut strict);
    assert!(summary.granted.is_empty());
    assert_eq!(summary.waiting, 1);
    assert_eq!(strict.remaining(), 2);

    let mut relaxed = Replayer::new(schedule).per_slot();
    let summary = ctl.round(&mut relaxed);
    assert_eq!(summary.granted.len(), 1);
    assert_eq!(relaxed.remaining(), 1);
    assert!(matches!(handle.join().unwrap(), Resume::Run(t) if t.gid == 1));
}

#[test]
fn recorder_counts_overwritten_events() {
    let (_region, ctl) = controlled_region();
    ctl.set_mode(0, ControlMode::Record).unwrap();
    let mut rt = start(&ctl, 0, 0);
    let extra = 4;
    for _ in 0..MAX_LOG_ENTRIES + extra {
        rt.report_schedule(1).unwrap();
    }

    let mut recorder = Recorder::new();
    assert_eq!(recorder.drain(&ctl).unwrap(), MAX_LOG_ENTRIES);
    assert_eq!(recorder.lost(), extra as u64);
    let schedule = recorder.finish();
    assert_eq!(schedule.lost, extra as u64);
    assert!(schedule.coverage.is_empty());
    assert_eq!(schedule.events.last().unwrap().epoch, (MAX_LOG_ENTRIES + extra - 1) as u64);
}

#[test]
fn recorder_snapshots_coverage() {
    let (_region, ctl) = controlled_region();
    ctl.set_mode_all(ControlMode::Record).unwrap();
    let mut rt = start(&ctl, 1, 0);
    rt.report_block("main.go:8");
    rt.report_block("main.go:8");
    rt.report_block("main.go:9");

    let mut recorder = Recorder::new();
    assert_eq!(recorder.drain(&ctl).unwrap(), 0);
    assert_eq!(recorder.coverage()[1].hits("main.go:8"), 2);
    let schedule = recorder.finish();
    assert_eq!(schedule.coverage.len(), CHANNELS);
    assert!(schedule.coverage[0].is_empty());
    assert_eq!(schedule.total_coverage().to_string(), "2 blocks, 3 hits");
}

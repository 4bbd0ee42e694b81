/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Regions shared with another process through an inherited descriptor.
//! Sharing through fork is tested in its own binary, `tests/fork.rs`.

use std::fs::OpenOptions;
use std::os::fd::AsRawFd;
use std::sync::Arc;

use dara_model::EventPayload;
use dara_model::ProcStatus;
use dara_model::RuntimeConfig;
use daracore::Controller;
use daracore::Error;
use daracore::Instrumentation;
use daracore::Resume;
use daracore::SharedRegion;
use pretty_assertions::assert_eq;

#[test]
fn instrumentation_maps_inherited_region_once() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dara.shm");
    let ctl = Controller::new(Arc::new(SharedRegion::create(&path).unwrap()));
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(&path)
        .unwrap();
    let config = RuntimeConfig {
        profiling: Some("1".to_owned()),
        proc_id: Some(2),
        shm_fd: file.as_raw_fd(),
        ..Default::default()
    };

    let mut inst = Instrumentation::new(config.clone());
    assert!(inst.stats().is_none());
    let task = inst.spawn_task(9, 0x100, "main.main").unwrap().unwrap();
    assert_eq!(
        inst.report(9, EventPayload::Schedule).unwrap(),
        Resume::Continue
    );
    assert_eq!(inst.stats().unwrap().reports, 1);

    assert_eq!(ctl.mode(2).unwrap(), ProcStatus::FirstEvent);
    let events = ctl.log(2).unwrap().snapshot();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].task.stable_id(), task.stable_id());

    let mut second = Instrumentation::new(config.clone());
    assert!(matches!(
        second.spawn_task(1, 0x100, "main.main"),
        Err(Error::AlreadyMapped)
    ));

    // Unmapping frees the descriptor for the next attempt.
    drop(inst);
    let mut third = Instrumentation::new(config);
    assert!(third.spawn_task(1, 0x100, "main.main").unwrap().is_some());
}

/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Helpers shared by the integration tests.

use std::sync::Arc;
use std::thread;
use std::time::Duration;
use std::time::Instant;

use daracore::Controller;
use daracore::SharedRegion;
use daracore::SlotGuard;

const PATIENCE: Duration = Duration::from_secs(20);

/// A fresh anonymous region and a controller over it.
pub fn controlled_region() -> (Arc<SharedRegion>, Controller) {
    let region = Arc::new(SharedRegion::create_anonymous().unwrap());
    let ctl = Controller::new(region.clone());
    (region, ctl)
}

/// Spin until slot `proc_id` has a pending request, returning it locked.
pub fn wait_for_request(ctl: &Controller, proc_id: usize) -> SlotGuard<'_> {
    let start = Instant::now();
    loop {
        if let Some(guard) = ctl.try_lock(proc_id).unwrap() {
            if guard.pending_request() {
                return guard;
            }
        }
        assert!(
            start.elapsed() < PATIENCE,
            "slot {} never raised a request",
            proc_id
        );
        thread::yield_now();
    }
}

/// Give a thread time to run, then check it is still blocked.
pub fn assert_still_waiting<T>(handle: &thread::JoinHandle<T>) {
    thread::sleep(Duration::from_millis(50));
    assert!(!handle.is_finished(), "runtime resumed without a grant");
}

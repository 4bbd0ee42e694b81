/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

use dara_model::Coverage;
use dara_model::Event;
use dara_model::Schedule;
use dara_model::consts::CHANNELS;
use tracing::debug;
use tracing::warn;

use super::Controller;
use crate::error::Result;

/// Drains every slot's log into a [`Schedule`].
///
/// Events are kept in report order across slots, by their stamps, however
/// rarely the logs are drained. Call [`Recorder::drain`] often enough that
/// no slot wraps its ring between two calls; anything overwritten first is
/// counted as lost.
#[derive(Debug, Default)]
pub struct Recorder {
    cursors: [u64; CHANNELS],
    events: Vec<Event>,
    lost: u64,
    coverage: Vec<Coverage>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collect everything appended since the last drain. Returns the number
    /// of new events.
    pub fn drain(&mut self, controller: &Controller) -> Result<usize> {
        let mut fresh = 0;
        for proc_id in 0..CHANNELS {
            let drained = controller.drain(proc_id, self.cursors[proc_id])?;
            if drained.lost > 0 {
                warn!("[p{}] lost {} events while recording", proc_id, drained.lost);
            }
            self.lost += drained.lost;
            self.cursors[proc_id] = drained.next;
            fresh += drained.events.len();
            self.events.extend(drained.events);
        }
        // Each slot's events are already in stamp order, and the sort is
        // stable, so a slot's own order survives equal stamps.
        self.events.sort_by_key(|e| (e.stamp, e.proc_id));
        self.coverage = (0..CHANNELS)
            .map(|proc_id| controller.coverage(proc_id))
            .collect::<Result<_>>()?;
        if fresh > 0 {
            debug!("recorded {} events ({} total)", fresh, self.events.len());
        }
        Ok(fresh)
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn lost(&self) -> u64 {
        self.lost
    }

    /// Coverage of every slot as of the last drain.
    pub fn coverage(&self) -> &[Coverage] {
        &self.coverage
    }

    pub fn finish(self) -> Schedule {
        let coverage = if self.coverage.iter().all(Coverage::is_empty) {
            Vec::new()
        } else {
            self.coverage
        };
        Schedule {
            lost: self.lost,
            coverage,
            ..Schedule::new(self.events)
        }
    }
}

/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

use dara_model::Event;
use dara_model::Schedule;
use dara_model::TaskDescriptor;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::Policy;
use super::SlotGuard;
use super::replay_cursor::ReplayCursor;

/// Replays a recorded [`Schedule`].
///
/// Each grant consumes one recorded event and resumes the task that made
/// it. Tasks are matched by their spawn site and spawn number, since task ids
/// differ between runs. A request that does not line up with the recording
/// is a desync: it is counted and the reporting task is resumed instead.
#[derive(Debug)]
pub struct Replayer {
    cursor: ReplayCursor<Event>,
    strict: bool,
    desyncs: u64,
}

impl Replayer {
    /// Replay `schedule` in its recorded global order: a slot is only
    /// granted when it owns the next recorded event.
    pub fn new(schedule: Schedule) -> Self {
        if schedule.lost > 0 {
            warn!(
                "schedule lost {} events while recording, expect desyncs",
                schedule.lost
            );
        }
        Replayer {
            cursor: schedule.events.into_iter().collect(),
            strict: true,
            desyncs: 0,
        }
    }

    /// Only keep each slot's own order, letting slots overtake one another.
    pub fn per_slot(mut self) -> Self {
        self.strict = false;
        self
    }

    /// No recorded events are left. The caller should end the replay.
    pub fn is_exhausted(&self) -> bool {
        self.cursor.is_exhausted()
    }

    pub fn remaining(&self) -> usize {
        self.cursor.remaining()
    }

    pub fn replayed(&self) -> usize {
        self.cursor.consumed()
    }

    pub fn desyncs(&self) -> u64 {
        self.desyncs
    }

    fn next_for(&mut self, proc_id: usize) -> Option<Event> {
        let index = if self.strict {
            (self.cursor.peek()?.proc_id == proc_id).then_some(0)?
        } else {
            self.cursor.position(|e| e.proc_id == proc_id)?
        };
        self.cursor.take_nth(index)
    }
}

impl Policy for Replayer {
    fn choose(&mut self, proc_id: usize, slot: &SlotGuard<'_>) -> Option<TaskDescriptor> {
        let expected = self.next_for(proc_id)?;
        let (gpc, count) = expected.task.stable_id();
        let reporter = slot.running_routine();
        if reporter.stable_id() != (gpc, count) {
            self.desyncs += 1;
            warn!(
                "[p{}] desync at recorded event {}: expected {}, but {} reported",
                proc_id,
                self.cursor.consumed(),
                expected,
                reporter
            );
            return Some(reporter);
        }
        let task = slot.find_task(gpc, count).unwrap_or(reporter);
        debug!(
            "[p{}] replaying event {}: {}",
            proc_id,
            self.cursor.consumed(),
            expected
        );
        if self.is_exhausted() {
            info!(
                "replayed every recorded event ({} desyncs)",
                self.desyncs
            );
        }
        Some(task)
    }
}

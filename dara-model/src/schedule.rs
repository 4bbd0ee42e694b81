/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! A recorded run, persisted as JSON and fed back to drive a replay.

use std::fmt;
use std::fs::File;
use std::io;
use std::io::BufReader;
use std::io::Write;
use std::path::Path;

use serde::Deserialize;
use serde::Serialize;

use crate::consts::LAYOUT_VERSION;
use crate::coverage::Coverage;
use crate::event::Event;
use crate::event::EventKind;

/// Every event drained from the region during a recorded run, in the order
/// the recorder observed them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    /// The layout the events were read with.
    pub layout_version: u32,
    pub events: Vec<Event>,
    /// Events overwritten in the ring before they could be drained. A
    /// schedule with losses cannot be replayed faithfully.
    #[serde(default)]
    pub lost: u64,
    /// Block coverage of every slot at the end of the run, indexed by slot.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub coverage: Vec<Coverage>,
}

impl Default for Schedule {
    fn default() -> Self {
        Schedule {
            layout_version: LAYOUT_VERSION,
            events: Vec::new(),
            lost: 0,
            coverage: Vec::new(),
        }
    }
}

impl Schedule {
    pub fn new(events: Vec<Event>) -> Self {
        Schedule {
            events,
            ..Default::default()
        }
    }

    /// Events reported by one slot, in order.
    pub fn for_proc(&self, proc_id: usize) -> impl Iterator<Item = &Event> + '_ {
        self.events.iter().filter(move |e| e.proc_id == proc_id)
    }

    /// How many events of each kind the schedule holds.
    pub fn count(&self, kind: EventKind) -> usize {
        self.events.iter().filter(|e| e.kind() == kind).count()
    }

    /// Coverage of every slot folded together.
    pub fn total_coverage(&self) -> Coverage {
        let mut total = Coverage::new();
        for cov in &self.coverage {
            total.merge(cov);
        }
        total
    }

    /// Check that the schedule can be used against the current layout.
    pub fn validate(&self) -> Result<(), String> {
        if self.layout_version != LAYOUT_VERSION {
            return Err(format!(
                "schedule was recorded with layout version {}, this build uses {}",
                self.layout_version, LAYOUT_VERSION
            ));
        }
        Ok(())
    }

    pub fn write_to_disk(&self, path: &Path) -> io::Result<()> {
        let mut file = File::create(path)?;
        serde_json::to_writer_pretty(&mut file, self)?;
        file.write_all(b"\n")
    }

    pub fn read_from_disk(path: &Path) -> io::Result<Self> {
        let file = File::open(path)?;
        let schedule: Schedule = serde_json::from_reader(BufReader::new(file))?;
        schedule
            .validate()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        Ok(schedule)
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = serde_json::to_string_pretty(self).map_err(|_| fmt::Error)?;
        f.write_str(&s)
    }
}

/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

use std::path::PathBuf;
use std::thread;
use std::time::Duration;
use std::time::Instant;

use anyhow::Context;
use anyhow::Error;
use clap::Parser;
use colored::Colorize;
use dara_model::ControlMode;
use dara_model::Schedule;
use daracore::Replayer;
use tracing::info;
use tracing::warn;

use super::global_opts::GlobalOpts;
use super::region::RegionArg;

/// Command-line options for the "replay" subcommand.
#[derive(Debug, Parser)]
pub struct ReplayOpts {
    #[clap(flatten)]
    region: RegionArg,

    /// Schedule to replay, as written by `dara dump`.
    #[clap(value_name = "SCHEDULE")]
    schedule: PathBuf,

    /// Only keep each slot's own order, letting slots overtake one another.
    #[clap(long)]
    per_slot: bool,

    /// Give up after this many seconds without a single grant.
    #[clap(long, value_name = "SECS", default_value = "30")]
    stall_timeout: u64,
}

impl ReplayOpts {
    pub fn main(&self, _global: &GlobalOpts) -> Result<(), Error> {
        let schedule = Schedule::read_from_disk(&self.schedule)
            .with_context(|| format!("Failed to load schedule {}", self.schedule.display()))?;
        let controller = self.region.open()?;

        let mut replayer = Replayer::new(schedule);
        if self.per_slot {
            replayer = replayer.per_slot();
        }
        controller
            .set_mode_all(ControlMode::Replay)
            .context("Failed to start the replay")?;
        info!("replaying {} events", replayer.remaining());

        let stall_timeout = Duration::from_secs(self.stall_timeout);
        let mut last_grant = Instant::now();
        while !replayer.is_exhausted() {
            let summary = controller.round(&mut replayer);
            if !summary.granted.is_empty() {
                last_grant = Instant::now();
            } else if last_grant.elapsed() > stall_timeout {
                warn!(
                    "no slot reached its next recorded event in {:?}, giving up with {} left",
                    stall_timeout,
                    replayer.remaining()
                );
                break;
            } else {
                thread::yield_now();
            }
        }
        controller.end_replay();

        let verdict = if replayer.is_exhausted() && replayer.desyncs() == 0 {
            "Replayed".green().bold()
        } else {
            "Diverged".red().bold()
        };
        println!(
            "{} {} events, {} desyncs, {} not replayed",
            verdict,
            replayer.replayed(),
            replayer.desyncs(),
            replayer.remaining()
        );
        Ok(())
    }
}

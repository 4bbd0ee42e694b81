/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

use std::path::PathBuf;

use anyhow::Context;
use anyhow::Error;
use clap::Parser;
use colored::Colorize;
use daracore::Recorder;

use super::global_opts::GlobalOpts;
use super::region::RegionArg;

/// Command-line options for the "dump" subcommand.
#[derive(Debug, Parser)]
pub struct DumpOpts {
    #[clap(flatten)]
    region: RegionArg,

    /// Write the schedule to this file instead of stdout.
    #[clap(long, short, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Only keep the events of this slot.
    #[clap(long, short, value_name = "SLOT")]
    slot: Option<usize>,
}

impl DumpOpts {
    pub fn main(&self, _global: &GlobalOpts) -> Result<(), Error> {
        let controller = self.region.open()?;
        let mut recorder = Recorder::new();
        recorder.drain(&controller)?;
        if recorder.lost() > 0 {
            eprintln!(
                "{} {} events were overwritten before they could be read",
                "WARNING:".yellow().bold(),
                recorder.lost()
            );
        }

        let mut schedule = recorder.finish();
        if let Some(slot) = self.slot {
            schedule.events.retain(|e| e.proc_id == slot);
        }

        match &self.output {
            Some(path) => {
                schedule
                    .write_to_disk(path)
                    .with_context(|| format!("Failed to write schedule to {}", path.display()))?;
                eprintln!(
                    "{} {} events to {}",
                    "Wrote".green().bold(),
                    schedule.events.len(),
                    path.display()
                );
            }
            None => println!("{}", schedule),
        }
        Ok(())
    }
}

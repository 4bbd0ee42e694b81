/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

use anyhow::Context;
use anyhow::Error;
use clap::Parser;
use colored::Colorize;
use dara_model::ControlMode;
use dara_model::consts::CHANNELS;

use super::global_opts::GlobalOpts;
use super::region::RegionArg;

/// Command-line options for the "mode" subcommand.
#[derive(Debug, Parser)]
pub struct ModeOpts {
    #[clap(flatten)]
    region: RegionArg,

    /// One of record, replay or explore.
    #[clap(value_name = "MODE")]
    mode: ControlMode,

    /// Only change this slot. Defaults to every slot.
    #[clap(long, short, value_name = "SLOT")]
    slot: Option<usize>,
}

impl ModeOpts {
    pub fn main(&self, _global: &GlobalOpts) -> Result<(), Error> {
        let controller = self.region.open()?;
        let slots = match self.slot {
            Some(slot) => slot..slot + 1,
            None => 0..CHANNELS,
        };
        for proc_id in slots {
            let previous = controller
                .set_mode(proc_id, self.mode)
                .with_context(|| format!("Failed to select {} mode in slot {}", self.mode, proc_id))?;
            println!(
                "slot {}: {} -> {}",
                proc_id,
                previous,
                self.mode.to_string().bold()
            );
        }
        Ok(())
    }
}

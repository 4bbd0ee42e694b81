/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

use anyhow::Error;
use clap::Parser;
use colored::ColoredString;
use colored::Colorize;
use dara_model::ProcStatus;
use dara_model::TaskDescriptor;
use dara_model::consts::CHANNELS;
use dara_model::syscall::display_syscall;
use daracore::Controller;
use serde::Serialize;

use super::global_opts::GlobalOpts;
use super::region::RegionArg;

/// Command-line options for the "inspect" subcommand.
#[derive(Debug, Parser)]
pub struct InspectOpts {
    #[clap(flatten)]
    region: RegionArg,

    /// Only show this slot.
    #[clap(long, short, value_name = "SLOT")]
    slot: Option<usize>,

    /// Also list every task in the task tables.
    #[clap(long)]
    tasks: bool,

    /// Print JSON instead of text.
    #[clap(long)]
    json: bool,
}

/// A snapshot of one slot, taken under its lock.
#[derive(Debug, Serialize)]
struct SlotState {
    slot: usize,
    mode: Option<ProcStatus>,
    waiting: bool,
    epoch: u64,
    logged: u64,
    covered_blocks: usize,
    blocking_syscall: Option<String>,
    running: Option<TaskDescriptor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tasks: Option<Vec<TaskDescriptor>>,
}

impl SlotState {
    fn capture(controller: &Controller, proc_id: usize, with_tasks: bool) -> Result<Self, Error> {
        let coverage = controller.coverage(proc_id)?;
        let guard = controller.lock(proc_id)?;
        let running = guard.running_routine();
        Ok(SlotState {
            slot: proc_id,
            mode: guard.mode().ok(),
            waiting: guard.pending_request(),
            epoch: guard.epoch(),
            logged: guard.log_cursor(),
            covered_blocks: coverage.blocks(),
            blocking_syscall: guard.blocking_syscall().map(display_syscall),
            running: (running.gid != 0).then_some(running),
            tasks: with_tasks.then(|| guard.tasks()),
        })
    }

    fn print(&self) {
        let mode = self.mode.map_or_else(|| "unknown".red(), paint_mode);
        print!(
            "{} {:<14} epoch {:<6} logged {:<6} blocks {:<5}",
            format!("slot {}", self.slot).bold(),
            mode,
            self.epoch,
            self.logged,
            self.covered_blocks
        );
        if self.waiting {
            print!(" {}", "waiting".yellow().bold());
        }
        println!();
        if let Some(running) = &self.running {
            println!("    running {}", running);
        }
        if let Some(syscall) = &self.blocking_syscall {
            println!("    blocked in {}", syscall);
        }
        for task in self.tasks.iter().flatten() {
            println!("    {}", task.to_string().dimmed());
        }
    }
}

fn paint_mode(mode: ProcStatus) -> ColoredString {
    let s = mode.to_string();
    match mode {
        ProcStatus::RecordActive => s.green(),
        ProcStatus::ReplayActive | ProcStatus::ExploreActive => s.cyan(),
        ProcStatus::FirstEvent => s.yellow(),
        ProcStatus::Uninitialized | ProcStatus::Finished | ProcStatus::ReplayEnded => s.dimmed(),
    }
}

impl InspectOpts {
    pub fn main(&self, _global: &GlobalOpts) -> Result<(), Error> {
        let controller = self.region.open()?;
        let slots = match self.slot {
            Some(slot) => slot..slot + 1,
            None => 0..CHANNELS,
        };
        let states = slots
            .map(|proc_id| SlotState::capture(&controller, proc_id, self.tasks))
            .collect::<Result<Vec<_>, _>>()?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&states)?);
        } else {
            states.iter().for_each(SlotState::print);
        }
        Ok(())
    }
}

/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

// Treat all Clippy warnings as errors.
#![deny(clippy::all)]
#![allow(clippy::uninlined_format_args)]

mod create;
mod dump;
mod end_replay;
mod global_opts;
mod inspect;
mod mode;
mod region;
mod replay;
mod tracing;

use anyhow::Error;
use clap::Parser;
use colored::*;

use self::create::CreateOpts;
use self::dump::DumpOpts;
use self::end_replay::EndReplayOpts;
use self::global_opts::GlobalOpts;
use self::inspect::InspectOpts;
use self::mode::ModeOpts;
use self::replay::ReplayOpts;

#[derive(Debug, Parser)]
#[clap(name = "dara", version)]
struct Args {
    #[clap(flatten)]
    global: GlobalOpts,

    #[clap(subcommand)]
    command: Subcommand,
}

#[derive(Debug, Parser)]
enum Subcommand {
    /// Create a fresh region file, every slot stamped and uninitialized.
    Create(CreateOpts),

    /// Show the state of every slot of a region.
    #[clap(alias = "ls")]
    Inspect(InspectOpts),

    /// Select the control mode of one slot, or of all of them.
    Mode(ModeOpts),

    /// End the replay in every slot, releasing every waiting runtime.
    EndReplay(EndReplayOpts),

    /// Write the events currently held in the slot logs as a schedule.
    Dump(DumpOpts),

    /// Drive the slots of a region through a recorded schedule.
    Replay(ReplayOpts),
}

impl Subcommand {
    fn main(&self, global: &GlobalOpts) -> Result<(), Error> {
        match self {
            Subcommand::Create(x) => x.main(global),
            Subcommand::Inspect(x) => x.main(global),
            Subcommand::Mode(x) => x.main(global),
            Subcommand::EndReplay(x) => x.main(global),
            Subcommand::Dump(x) => x.main(global),
            Subcommand::Replay(x) => x.main(global),
        }
    }
}

fn main() {
    let Args { global, command } = Args::parse();

    let result = global
        .init_tracing()
        .and_then(|_guard| command.main(&global));

    if let Err(err) = result {
        display_error(err);
        std::process::exit(1);
    }
}

fn display_error(error: Error) {
    let mut chain = error.chain();

    if let Some(error) = chain.next() {
        eprintln!("{}: {}", "Error".red().bold(), error);
    }

    for cause in chain {
        eprintln!("     {} {}", ">".dimmed().bold(), cause);
    }
}

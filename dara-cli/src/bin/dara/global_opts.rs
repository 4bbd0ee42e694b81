/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

use std::fs::File;
use std::path::PathBuf;

use anyhow::Context;
use anyhow::Error;
use clap::Parser;
use tracing::metadata::LevelFilter;
use tracing_appender::non_blocking::WorkerGuard;

use super::tracing::LogSink;
use super::tracing::init_tracing;

/// Dara operates the shared region through which instrumented programs
/// report their scheduling points and calls, and through which a global
/// scheduler records, replays or explores their interleavings.
///
/// The region is a file every monitored process maps on a well-known
/// descriptor. These subcommands act on it out of band: create it, look
/// inside, switch modes, save what was recorded, and replay it.
///
/// Below are options common to all subcommands.
#[derive(Debug, Parser, Clone)]
pub struct GlobalOpts {
    /// The verbosity of the dara crates. Other crates log warnings unless
    /// RUST_LOG says otherwise.
    #[clap(short, long, value_name = "LEVEL", env = "DARA_LOG")]
    pub log: Option<LevelFilter>,

    /// Log to a file instead of the terminal.
    #[clap(long, value_name = "FILE", env = "DARA_LOG_FILE")]
    pub log_file: Option<PathBuf>,
}

impl GlobalOpts {
    /// Initializes tracing to the log file, or to the terminal.
    #[must_use = "This function returns a guard that should not be immediately dropped"]
    pub fn init_tracing(&self) -> Result<Option<WorkerGuard>, Error> {
        let sink = match &self.log_file {
            Some(path) => LogSink::File(
                File::create(path)
                    .with_context(|| format!("Failed to open log file {}", path.display()))?,
            ),
            None => LogSink::Stderr,
        };
        init_tracing(self.log, sink)
    }
}

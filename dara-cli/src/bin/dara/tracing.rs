/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Log output of the `dara` tool.
//!
//! `--log` sets the level of the dara crates only. Everything else logs
//! warnings, unless `RUST_LOG` says otherwise.

use std::fs::File;
use std::io;
use std::io::IsTerminal;

use anyhow::Error;
use anyhow::anyhow;
use tracing::metadata::LevelFilter;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

/// Targets that follow `--log`.
const DARA_TARGETS: [&str; 3] = ["dara", "daracore", "dara_model"];

const DEFAULT_DARA_LEVEL: LevelFilter = LevelFilter::WARN;

/// Where log output goes.
pub enum LogSink {
    Stderr,
    /// Written by a background thread, flushed when the guard drops.
    File(File),
}

fn env_filter(level: LevelFilter) -> Result<EnvFilter, Error> {
    let mut filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .from_env_lossy();
    for target in DARA_TARGETS {
        let directive: Directive = format!("{}={}", target, level)
            .parse()
            .map_err(|e| anyhow!("Bad log directive for {}: {}", target, e))?;
        filter = filter.add_directive(directive);
    }
    Ok(filter)
}

/// Installs the global subscriber. Keep the returned guard alive until the
/// program exits, or buffered file output is lost.
#[must_use = "This function returns a guard that should not be immediately dropped"]
pub fn init_tracing(level: Option<LevelFilter>, sink: LogSink) -> Result<Option<WorkerGuard>, Error> {
    let filter = env_filter(level.unwrap_or(DEFAULT_DARA_LEVEL))?;
    let (writer, ansi, guard) = match sink {
        LogSink::Stderr => (BoxMakeWriter::new(io::stderr), io::stderr().is_terminal(), None),
        LogSink::File(f) => {
            let (writer, guard) = tracing_appender::non_blocking(f);
            (BoxMakeWriter::new(writer), false, Some(guard))
        }
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(ansi)
        .try_init()
        .map_err(|e| anyhow!("Failed to install the tracing subscriber: {}", e))?;
    Ok(guard)
}

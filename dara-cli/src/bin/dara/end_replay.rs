/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

use anyhow::Error;
use clap::Parser;

use super::global_opts::GlobalOpts;
use super::region::RegionArg;

/// Command-line options for the "end-replay" subcommand.
#[derive(Debug, Parser)]
pub struct EndReplayOpts {
    #[clap(flatten)]
    region: RegionArg,
}

impl EndReplayOpts {
    pub fn main(&self, _global: &GlobalOpts) -> Result<(), Error> {
        self.region.open()?.end_replay();
        Ok(())
    }
}

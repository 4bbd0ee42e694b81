/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

use std::sync::Arc;

use anyhow::Context;
use anyhow::Error;
use clap::Parser;
use colored::Colorize;
use dara_model::ControlMode;
use daracore::Controller;
use daracore::REGION_LEN;
use daracore::SharedRegion;

use super::global_opts::GlobalOpts;
use super::region::RegionArg;

/// Command-line options for the "create" subcommand.
#[derive(Debug, Parser)]
pub struct CreateOpts {
    #[clap(flatten)]
    region: RegionArg,

    /// Select this mode in every slot right away, before any runtime
    /// reports.
    #[clap(long, value_name = "MODE")]
    mode: Option<ControlMode>,
}

impl CreateOpts {
    pub fn main(&self, _global: &GlobalOpts) -> Result<(), Error> {
        let path = &self.region.path;
        let region = SharedRegion::create(path)
            .with_context(|| format!("Failed to create region {}", path.display()))?;
        let controller = Controller::new(Arc::new(region));
        if let Some(mode) = self.mode {
            controller
                .set_mode_all(mode)
                .with_context(|| format!("Failed to select {} mode", mode))?;
        }
        println!(
            "{} {} ({} bytes)",
            "Created".green().bold(),
            path.display(),
            REGION_LEN
        );
        Ok(())
    }
}

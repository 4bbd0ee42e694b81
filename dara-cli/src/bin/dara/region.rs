/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use anyhow::Error;
use clap::Parser;
use daracore::Controller;
use daracore::SharedRegion;

/// The region file a subcommand acts on.
#[derive(Debug, Parser, Clone)]
pub struct RegionArg {
    /// Path of the region file shared with the monitored processes.
    #[clap(value_name = "REGION", env = "DARA_REGION")]
    pub path: PathBuf,
}

impl RegionArg {
    /// Map an existing region and check its layout.
    pub fn open(&self) -> Result<Controller, Error> {
        let region = SharedRegion::open(&self.path)
            .with_context(|| format!("Failed to map region {}", self.path.display()))?;
        Ok(Controller::new(Arc::new(region)))
    }
}

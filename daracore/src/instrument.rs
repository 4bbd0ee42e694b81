/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! The entry point an instrumented runtime calls into.
//!
//! Nothing is mapped until the first report. With reporting switched off
//! every call is a no-op that returns [`Resume::Continue`].

use std::sync::Arc;

use dara_model::EventPayload;
use dara_model::RuntimeConfig;
use dara_model::StatusWord;
use dara_model::TaskDescriptor;
use tracing::debug;
use tracing::error;

use crate::error::Error;
use crate::error::Result;
use crate::region::SharedRegion;
use crate::runtime::Resume;
use crate::runtime::RuntimeSlot;
use crate::runtime::RuntimeStats;

#[derive(Debug)]
pub struct Instrumentation {
    config: RuntimeConfig,
    slot: Option<RuntimeSlot>,
}

impl Instrumentation {
    /// Instrumentation that maps the inherited region on first use.
    pub fn new(config: RuntimeConfig) -> Self {
        Instrumentation { config, slot: None }
    }

    /// Instrumentation over an already mapped region.
    pub fn with_region(config: RuntimeConfig, region: Arc<SharedRegion>) -> Result<Self> {
        let slot = Self::attach(&config, region)?;
        Ok(Instrumentation {
            config,
            slot: Some(slot),
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.config.reporting()
    }

    pub fn stats(&self) -> Option<RuntimeStats> {
        self.slot.as_ref().map(RuntimeSlot::stats)
    }

    /// The slot this process reports through, once the region is mapped.
    pub fn proc_id(&self) -> Option<usize> {
        self.slot.as_ref().map(RuntimeSlot::proc_id)
    }

    fn attach(config: &RuntimeConfig, region: Arc<SharedRegion>) -> Result<RuntimeSlot> {
        let proc_id = config.proc_id.ok_or(Error::MissingProcId)?;
        Ok(RuntimeSlot::attach(region, proc_id)?
            .enforcing(config.enforcing())
            .with_spin_limit(config.spin_limit))
    }

    fn slot(&mut self) -> Result<&mut RuntimeSlot> {
        if self.slot.is_none() {
            // Check the slot index before touching the descriptor.
            self.config.proc_id.ok_or(Error::MissingProcId)?;
            let region = SharedRegion::map_inherited(self.config.shm_fd)?;
            let slot = Self::attach(&self.config, Arc::new(region))?;
            debug!(
                "attached to slot {} (enforcing: {})",
                slot.proc_id(),
                self.config.enforcing()
            );
            self.slot = Some(slot);
        }
        self.slot.as_mut().ok_or(Error::MissingProcId)
    }

    pub fn spawn_task(
        &mut self,
        gid: i64,
        gpc: u64,
        func_info: &str,
    ) -> Result<Option<TaskDescriptor>> {
        if !self.is_enabled() {
            return Ok(None);
        }
        Ok(Some(self.slot()?.spawn_task(gid, gpc, func_info)))
    }

    pub fn set_status(&mut self, gid: i64, status: StatusWord) -> Result<()> {
        if !self.is_enabled() {
            return Ok(());
        }
        self.slot()?.set_status(gid, status).map(|_| ())
    }

    pub fn report(&mut self, gid: i64, payload: EventPayload) -> Result<Resume> {
        if !self.is_enabled() {
            return Ok(Resume::Continue);
        }
        self.slot()?.report(gid, payload)
    }

    /// See [`RuntimeSlot::report_block`].
    pub fn report_block(&mut self, id: &str) -> Result<()> {
        if !self.is_enabled() {
            return Ok(());
        }
        self.slot()?.report_block(id);
        Ok(())
    }

    /// Like [`Instrumentation::report`], but a failure to reach the shared
    /// region aborts the process: the control protocol cannot be set up, and
    /// carrying on would silently run the program uncontrolled.
    pub fn report_or_abort(&mut self, gid: i64, payload: EventPayload) -> Resume {
        match self.report(gid, payload) {
            Ok(resume) => resume,
            Err(e @ Error::UnknownTask(_)) => {
                debug!("dropping report: {}", e);
                Resume::Continue
            }
            Err(e) => {
                error!("dara: cannot reach the control plane: {}", e);
                std::process::abort()
            }
        }
    }

    /// See [`RuntimeSlot::finish`]. A no-op when disabled or outside replay
    /// and exploration.
    pub fn finish(&mut self) -> Result<()> {
        if !self.is_enabled() {
            return Ok(());
        }
        match self.slot()?.finish() {
            Err(Error::InvalidTransition { from, .. }) => {
                debug!("not finishing under {}", from);
                Ok(())
            }
            other => other,
        }
    }
}

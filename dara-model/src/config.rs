/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Configuration of an instrumented runtime.
//!
//! The launcher hands these to the monitored process out of band, through its
//! environment. The flags exist so the same options can be given on a command
//! line when driving a runtime by hand.

use clap::Parser;
use serde::Deserialize;
use serde::Serialize;

use crate::consts::DARA_FD;

/// Busy-spin steps before a waiting runtime starts yielding its CPU.
pub const DEFAULT_SPIN_LIMIT: u32 = 64;

/// Options read by the instrumented runtime at its first report.
#[derive(Debug, Serialize, Deserialize, Clone, Parser)]
#[clap(name = "dara-runtime")]
pub struct RuntimeConfig {
    /// Turn on the reporting path. Any non-empty value enables it.
    #[clap(long, env = "DARA_PROFILING", value_name = "any")]
    pub profiling: Option<String>,

    /// Enforce the control protocol, blocking reports under replay and
    /// exploration. Without it reports are logged and never wait. Any
    /// non-empty value enables it.
    #[clap(long, env = "DARAON", value_name = "any")]
    pub control: Option<String>,

    /// Index of this process's slot in the shared region.
    #[clap(long, env = "DARAPID", value_name = "slot")]
    pub proc_id: Option<usize>,

    /// Descriptor the shared region is inherited on.
    #[clap(long, env = "DARA_SHM_FD", default_value_t = DARA_FD, value_name = "fd")]
    pub shm_fd: i32,

    /// Busy-spin steps before a waiting runtime starts yielding its CPU.
    #[clap(long, env = "DARA_SPIN_LIMIT", default_value_t = DEFAULT_SPIN_LIMIT, value_name = "steps")]
    pub spin_limit: u32,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            profiling: None,
            control: None,
            proc_id: None,
            shm_fd: DARA_FD,
            spin_limit: DEFAULT_SPIN_LIMIT,
        }
    }
}

fn switch_on(v: &Option<String>) -> bool {
    v.as_deref().is_some_and(|s| !s.is_empty())
}

impl RuntimeConfig {
    /// Read the configuration from the process environment alone.
    pub fn from_env() -> Result<Self, clap::Error> {
        Self::try_parse_from(["dara-runtime"])
    }

    /// Whether events are reported at all.
    pub fn reporting(&self) -> bool {
        switch_on(&self.profiling)
    }

    /// Whether reports may block under replay and exploration.
    pub fn enforcing(&self) -> bool {
        self.reporting() && switch_on(&self.control)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_parse() {
        let cfg = RuntimeConfig::try_parse_from([
            "dara-runtime",
            "--profiling",
            "1",
            "--control",
            "yes",
            "--proc-id",
            "2",
            "--shm-fd",
            "9",
        ])
        .unwrap();
        assert!(cfg.reporting());
        assert!(cfg.enforcing());
        assert_eq!(cfg.proc_id, Some(2));
        assert_eq!(cfg.shm_fd, 9);
    }

    #[test]
    fn empty_switches_are_off() {
        let cfg = RuntimeConfig {
            profiling: Some(String::new()),
            control: Some("1".to_owned()),
            ..Default::default()
        };
        assert!(!cfg.reporting());
        assert!(!cfg.enforcing());
    }

    #[test]
    fn control_needs_reporting() {
        let cfg = RuntimeConfig {
            control: Some("1".to_owned()),
            ..Default::default()
        };
        assert!(!cfg.enforcing());
    }
}

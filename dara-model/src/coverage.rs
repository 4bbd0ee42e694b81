/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Basic-block coverage reported by an instrumented runtime.

use std::collections::BTreeMap;
use std::fmt;

use bytemuck::Pod;
use bytemuck::Zeroable;
use serde::Deserialize;
use serde::Serialize;

use crate::consts::BLOCK_ID_LEN;
use crate::value::read_text;
use crate::value::write_text;

/// Hit counts per block id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Coverage(BTreeMap<String, u64>);

impl Coverage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `hits` to block `id`.
    pub fn record(&mut self, id: impl Into<String>, hits: u64) {
        *self.0.entry(id.into()).or_insert(0) += hits;
    }

    pub fn hits(&self, id: &str) -> u64 {
        self.0.get(id).copied().unwrap_or(0)
    }

    /// Number of distinct blocks seen.
    pub fn blocks(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn total_hits(&self) -> u64 {
        self.0.values().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.0.iter().map(|(id, hits)| (id.as_str(), *hits))
    }

    /// Fold another run's counts into this one.
    pub fn merge(&mut self, other: &Coverage) {
        for (id, hits) in other.iter() {
            self.record(id, hits);
        }
    }
}

impl FromIterator<(String, u64)> for Coverage {
    fn from_iter<I: IntoIterator<Item = (String, u64)>>(iter: I) -> Self {
        let mut coverage = Coverage::new();
        for (id, hits) in iter {
            coverage.record(id, hits);
        }
        coverage
    }
}

impl fmt::Display for Coverage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} blocks, {} hits", self.blocks(), self.total_hits())
    }
}

/// Shared-memory form of a block id. Ids longer than [`BLOCK_ID_LEN`] bytes
/// are cut at a char boundary.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct RawBlock {
    pub id_len: u32,
    pub _pad: u32,
    pub id: [u8; BLOCK_ID_LEN],
}

impl RawBlock {
    pub fn new(id: &str) -> Self {
        let mut raw = RawBlock::zeroed();
        raw.id_len = write_text(&mut raw.id, id) as u32;
        raw
    }

    pub fn id(&self) -> String {
        read_text(&self.id, self.id_len as usize)
    }
}

/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Mapping of the shared region.
//!
//! The region is created once, before any monitored process starts, either
//! as a file or as an anonymous shared mapping inherited across `fork`. A
//! monitored process maps the descriptor it inherits exactly once; the
//! [`SharedRegion`] handle is then passed to whatever needs the slots.

use std::ffi::c_void;
use std::fs::File;
use std::num::NonZeroUsize;
use std::os::fd::AsFd;
use std::os::fd::BorrowedFd;
use std::os::fd::RawFd;
use std::path::Path;
use std::ptr::NonNull;
use std::slice;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use dara_model::consts::CHANNELS;
use dara_model::consts::LAYOUT_VERSION;
use nix::sys::mman::MapFlags;
use nix::sys::mman::ProtFlags;
use nix::sys::mman::mmap;
use nix::sys::mman::mmap_anonymous;
use nix::sys::mman::munmap;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::error::Error;
use crate::error::Result;
use crate::layout::ProcControlBlock;
use crate::layout::REGION_LEN;

/// Set while this process holds a mapping of its inherited descriptor.
static INHERITED_MAPPED: AtomicBool = AtomicBool::new(false);

const LEN: NonZeroUsize = match NonZeroUsize::new(REGION_LEN) {
    Some(len) => len,
    None => panic!("empty region"),
};

/// A live mapping of every slot. Unmapped on drop.
#[derive(Debug)]
pub struct SharedRegion {
    base: NonNull<c_void>,
    inherited: bool,
}

// Safety: the mapping is process-wide and `ProcControlBlock` is `Sync`.
unsafe impl Send for SharedRegion {}
unsafe impl Sync for SharedRegion {}

impl SharedRegion {
    /// Create a fresh region backed by the file at `path`, replacing any
    /// previous contents.
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::options()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.set_len(REGION_LEN as u64)?;
        let region = Self::map_file(file.as_fd(), false)?;
        region.stamp();
        info!("created shared region at {}", path.display());
        Ok(region)
    }

    /// Create a fresh region in anonymous shared memory. Children forked
    /// afterwards share it.
    pub fn create_anonymous() -> Result<Self> {
        // Safety: a new mapping does not alias any Rust object.
        let base = unsafe {
            mmap_anonymous(
                None,
                LEN,
                ProtFlags::PROT_READ | ProtFlags::PROT_WRITE,
                MapFlags::MAP_SHARED | MapFlags::MAP_NORESERVE,
            )
        }?;
        let region = SharedRegion {
            base,
            inherited: false,
        };
        region.stamp();
        Ok(region)
    }

    /// Map an existing region file created by [`SharedRegion::create`].
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::options().read(true).write(true).open(path)?;
        check_len(file.metadata()?.len())?;
        let region = Self::map_file(file.as_fd(), false)?;
        region.validate()?;
        Ok(region)
    }

    /// Map the region inherited on descriptor `fd`. A process may hold only
    /// one such mapping at a time.
    pub fn map_inherited(fd: RawFd) -> Result<Self> {
        if INHERITED_MAPPED
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(Error::AlreadyMapped);
        }
        let mapped = (|| -> Result<SharedRegion> {
            // Safety: the descriptor stays open for the life of the process
            // by convention; it is only borrowed while mapping.
            let borrowed = unsafe { BorrowedFd::borrow_raw(fd) };
            let file = File::from(borrowed.try_clone_to_owned()?);
            check_len(file.metadata()?.len())?;
            let region = Self::map_file(borrowed, true)?;
            region.validate()?;
            Ok(region)
        })();
        match mapped {
            Ok(region) => {
                debug!("mapped inherited region on fd {}", fd);
                Ok(region)
            }
            Err(e) => {
                // A failed attempt leaves no mapping behind (the region, if
                // any, unmapped itself on drop).
                INHERITED_MAPPED.store(false, Ordering::Release);
                Err(e)
            }
        }
    }

    fn map_file(fd: BorrowedFd<'_>, inherited: bool) -> Result<Self> {
        // Safety: as for `create_anonymous`; the file is sized to the region.
        let base = unsafe {
            mmap(
                None,
                LEN,
                ProtFlags::PROT_READ | ProtFlags::PROT_WRITE,
                MapFlags::MAP_SHARED,
                fd,
                0,
            )
        }?;
        Ok(SharedRegion { base, inherited })
    }

    fn stamp(&self) {
        for pcb in self.slots() {
            pcb.stamp();
        }
    }

    fn validate(&self) -> Result<()> {
        for (slot, pcb) in self.slots().iter().enumerate() {
            let found = pcb.layout_version();
            if found != LAYOUT_VERSION {
                return Err(Error::LayoutMismatch {
                    slot,
                    found,
                    expected: LAYOUT_VERSION,
                });
            }
        }
        Ok(())
    }

    /// Every slot of the region.
    pub fn slots(&self) -> &[ProcControlBlock] {
        // Safety: the mapping is `REGION_LEN` bytes, which holds `CHANNELS`
        // control blocks, and lives as long as `self`.
        unsafe { slice::from_raw_parts(self.base.as_ptr().cast::<ProcControlBlock>(), CHANNELS) }
    }

    /// The slot at `proc_id`.
    pub fn slot(&self, proc_id: usize) -> Result<&ProcControlBlock> {
        self.slots().get(proc_id).ok_or(Error::SlotOutOfRange {
            slot: proc_id,
            channels: CHANNELS,
        })
    }
}

impl Drop for SharedRegion {
    fn drop(&mut self) {
        // Safety: `base` came from a mapping of exactly `REGION_LEN` bytes and
        // no borrow of the slots outlives `self`.
        if let Err(e) = unsafe { munmap(self.base, REGION_LEN) } {
            warn!("failed to unmap shared region: {}", e);
        }
        if self.inherited {
            INHERITED_MAPPED.store(false, Ordering::Release);
        }
    }
}

fn check_len(actual: u64) -> Result<()> {
    if actual != REGION_LEN as u64 {
        return Err(Error::SizeMismatch {
            expected: REGION_LEN,
            actual: actual as usize,
        });
    }
    Ok(())
}

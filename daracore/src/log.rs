/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! The bounded per-slot event log.
//!
//! The log is a ring: the cursor counts every append since the region was
//! created and entry `n` lives at `n % capacity`. Once the ring wraps the
//! oldest entries are overwritten. This is a trace buffer, not a history, so
//! a consumer that needs every event must drain faster than the runtime
//! appends.
//!
//! The owning runtime is the only writer. While it copies an entry into the
//! ring it sets [`WRITING`] on the cursor. Readers never take a lock: they
//! copy entries out and then re-read the cursor, discarding anything that
//! may have been overwritten during the copy.

use std::cell::UnsafeCell;
use std::ptr;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::atomic::fence;

use dara_model::Event;
use dara_model::event::RawEvent;
use tracing::trace;
use tracing::warn;

/// Set on the cursor while an append is copying its entry.
pub const WRITING: u64 = 1 << 63;

/// Entries copied out of the ring before the cursor is checked again.
const READ_CHUNK: usize = 64;

/// A view of one slot's ring and cursor.
pub struct EventLog<'a> {
    entries: &'a [UnsafeCell<RawEvent>],
    cursor: &'a AtomicU64,
}

/// The result of [`EventLog::read_since`].
#[derive(Debug, Default)]
pub struct Drained {
    /// Events in append order.
    pub events: Vec<Event>,
    /// Events that were overwritten before they could be read.
    pub lost: u64,
    /// Cursor to pass to the next call.
    pub next: u64,
}

impl<'a> EventLog<'a> {
    pub(crate) fn new(entries: &'a [UnsafeCell<RawEvent>], cursor: &'a AtomicU64) -> Self {
        EventLog { entries, cursor }
    }

    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    /// Total appends so far.
    pub fn cursor(&self) -> u64 {
        self.cursor.load(Ordering::Acquire) & !WRITING
    }

    /// Append `event`, overwriting the oldest entry once the ring is full.
    /// Returns the event's sequence number. Only the owning runtime calls
    /// this.
    pub(crate) fn append(&self, event: &RawEvent) -> u64 {
        let n = self.cursor.load(Ordering::Relaxed) & !WRITING;
        self.cursor.store(n | WRITING, Ordering::Relaxed);
        fence(Ordering::Release);
        let cell = &self.entries[self.index(n)];
        // Safety: the owning runtime is the single writer; readers detect an
        // overlapping write through the cursor and discard the copy.
        unsafe { ptr::write_volatile(cell.get(), *event) };
        self.cursor.store(n + 1, Ordering::Release);
        trace!("appended event {} (kind {})", n, event.kind);
        n
    }

    /// Every event still in the ring, oldest first.
    pub fn snapshot(&self) -> Vec<Event> {
        self.read_since(0).events
    }

    /// Events appended at or after sequence number `from`.
    pub fn read_since(&self, from: u64) -> Drained {
        let cap = self.entries.len() as u64;
        let end = self.cursor.load(Ordering::Acquire) & !WRITING;
        if from > end {
            warn!(
                "log cursor {} is ahead of the log ({} appends), restarting",
                from, end
            );
            return Drained {
                next: end,
                ..Default::default()
            };
        }
        let start = from.max(end.saturating_sub(cap));
        let mut lost = start - from;
        let mut events = Vec::with_capacity((end - start) as usize);
        let mut chunk: Vec<RawEvent> = Vec::with_capacity(READ_CHUNK);
        let mut n = start;
        while n < end {
            let stop = end.min(n + READ_CHUNK as u64);
            chunk.clear();
            // Safety: `RawEvent` is valid for any bit pattern; a torn copy is
            // discarded below.
            chunk.extend(
                (n..stop).map(|i| unsafe { ptr::read_volatile(self.entries[self.index(i)].get()) }),
            );
            let safe_start = self.overwritten_below();
            for (i, raw) in (n..stop).zip(&chunk) {
                if i < safe_start {
                    lost += 1;
                    continue;
                }
                match Event::decode(raw) {
                    Some(ev) => events.push(ev),
                    None => {
                        warn!("skipping undecodable event {} (kind {})", i, raw.kind);
                        lost += 1;
                    }
                }
            }
            n = stop;
        }
        if lost > 0 {
            warn!(
                "{} events were overwritten before they were read; the ring holds {}",
                lost, cap
            );
        }
        Drained {
            events,
            lost,
            next: end,
        }
    }

    /// Entries below the returned sequence number may have been overwritten
    /// by an append that has started. Entry `n` is overwritten by append
    /// `n + capacity`. Call after copying entries out.
    fn overwritten_below(&self) -> u64 {
        fence(Ordering::Acquire);
        let after = self.cursor.load(Ordering::Relaxed);
        let begun = (after & !WRITING) + u64::from(after & WRITING != 0);
        begun.saturating_sub(self.entries.len() as u64)
    }

    fn index(&self, n: u64) -> usize {
        (n % self.entries.len() as u64) as usize
    }
}

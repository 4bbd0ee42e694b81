/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! A spinlock over a word that lives in shared memory.
//!
//! Nothing here enters the kernel to wait. Contended acquisition busy-spins
//! for a bounded number of steps and then keeps polling with a
//! `sched_yield` between attempts.

use std::hint;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering;
use std::thread;

use dara_model::consts::LOCKED;
use dara_model::consts::UNLOCKED;
use dara_model::config::DEFAULT_SPIN_LIMIT;
use tracing::trace;

/// A lock word shared between processes. Has the same layout as a `u32`.
#[repr(transparent)]
#[derive(Debug, Default)]
pub struct SpinLock(AtomicU32);

impl SpinLock {
    pub const fn new() -> Self {
        SpinLock(AtomicU32::new(UNLOCKED))
    }

    /// Take the lock if it is free.
    pub fn try_lock(&self) -> Option<SpinGuard<'_>> {
        self.0
            .compare_exchange(UNLOCKED, LOCKED, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| SpinGuard { lock: self })
    }

    /// Spin until the lock is taken.
    pub fn lock(&self) -> SpinGuard<'_> {
        self.lock_with(&mut Backoff::default())
    }

    /// Spin until the lock is taken, pacing retries with `backoff`.
    pub fn lock_with(&self, backoff: &mut Backoff) -> SpinGuard<'_> {
        loop {
            if let Some(guard) = self.try_lock() {
                return guard;
            }
            // Only retry the CAS once the word looks free.
            while self.is_locked() {
                backoff.snooze();
            }
        }
    }

    pub fn is_locked(&self) -> bool {
        self.0.load(Ordering::Relaxed) == LOCKED
    }
}

/// Releases the lock when dropped, including while unwinding.
#[derive(Debug)]
pub struct SpinGuard<'a> {
    lock: &'a SpinLock,
}

impl Drop for SpinGuard<'_> {
    fn drop(&mut self) {
        self.lock.0.store(UNLOCKED, Ordering::Release);
    }
}

/// Paces a polling loop: a growing burst of spin hints up to `limit` steps,
/// then a yield per step.
#[derive(Debug, Clone)]
pub struct Backoff {
    step: u32,
    limit: u32,
    yielding: bool,
    snoozes: u64,
}

impl Backoff {
    pub fn new(limit: u32) -> Self {
        Backoff {
            step: 0,
            limit,
            yielding: false,
            snoozes: 0,
        }
    }

    pub fn snooze(&mut self) {
        self.snoozes += 1;
        if self.step < self.limit {
            for _ in 0..(1u32 << self.step.min(6)) {
                hint::spin_loop();
            }
            self.step += 1;
        } else {
            if !self.yielding {
                trace!("spun {} steps, yielding from now on", self.limit);
                self.yielding = true;
            }
            thread::yield_now();
        }
    }

    /// Start the next wait from short spins again. The snooze count is kept.
    pub fn reset(&mut self) {
        self.step = 0;
        self.yielding = false;
    }

    /// Total snoozes since creation.
    pub fn snoozes(&self) -> u64 {
        self.snoozes
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(DEFAULT_SPIN_LIMIT)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::AtomicU64;

    use test_case::test_case;

    use super::*;

    #[test]
    fn guard_releases() {
        let lock = SpinLock::new();
        {
            let _g = lock.lock();
            assert!(lock.is_locked());
            assert!(lock.try_lock().is_none());
        }
        assert!(!lock.is_locked());
        assert!(lock.try_lock().is_some());
    }

    #[test]
    fn released_while_unwinding() {
        let lock = SpinLock::new();
        let res = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _g = lock.lock();
            panic!("policy failed");
        }));
        assert!(res.is_err());
        assert!(!lock.is_locked());
    }

    #[test]
    fn mutual_exclusion() {
        let lock = Arc::new(SpinLock::new());
        let counter = Arc::new(AtomicU64::new(0));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let lock = lock.clone();
                let counter = counter.clone();
                thread::spawn(move || {
                    for _ in 0..1000 {
                        let _g = lock.lock();
                        // A non-atomic read-modify-write, only correct under the lock.
                        let v = counter.load(Ordering::Relaxed);
                        counter.store(v + 1, Ordering::Relaxed);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(counter.load(Ordering::Relaxed), 4000);
    }

    #[test_case(0; "yields at once")]
    #[test_case(2; "short spin")]
    #[test_case(DEFAULT_SPIN_LIMIT; "default spin")]
    fn backoff_counts(limit: u32) {
        let mut b = Backoff::new(limit);
        for _ in 0..5 {
            b.snooze();
        }
        assert_eq!(b.snoozes(), 5);
        b.reset();
        b.snooze();
        assert_eq!(b.snoozes(), 6);
    }

    #[test]
    fn backoff_at_the_step_ceiling() {
        let mut b = Backoff::new(u32::MAX);
        b.step = u32::MAX;
        b.snooze();
        b.snooze();
        assert_eq!(b.step, u32::MAX);
        assert!(b.yielding);
        assert_eq!(b.snoozes(), 2);
        b.reset();
        assert!(!b.yielding);
    }
}

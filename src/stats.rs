// SPDX-License-Identifier: MIT OR Apache-2.0

//! Delivery counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// A snapshot of what a [`LogBus`](crate::LogBus) has done so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct BusStats {
    /// Messages accepted by `put`.
    pub accepted: u64,
    /// Messages the sink wrote successfully.
    pub delivered: u64,
    /// Messages the sink failed to write.
    ///
    /// Failures of messages logged from inside the sink itself are reported
    /// with one error per flush rather than one per message.
    pub failed: u64,
    /// Messages discarded by the pre-start trim.
    pub discarded: u64,
    /// `put` calls that slept for backpressure.
    pub throttled: u64,
    /// Flush cycles that actually swapped and drained.
    pub flushes: u64,
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    accepted: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
    discarded: AtomicU64,
    throttled: AtomicU64,
    flushes: AtomicU64,
}

impl Counters {
    pub(crate) fn accepted(&self) {
        self.accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn discarded(&self, count: u64) {
        self.discarded.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn throttled(&self) {
        self.throttled.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn flushed(&self) {
        self.flushes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> BusStats {
        BusStats {
            accepted: self.accepted.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
            throttled: self.throttled.load(Ordering::Relaxed),
            flushes: self.flushes.load(Ordering::Relaxed),
        }
    }
}

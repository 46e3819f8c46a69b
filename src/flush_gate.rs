// SPDX-License-Identifier: MIT OR Apache-2.0

//! The flush-in-progress flag.
//!
//! At most one party dispatches to the sink at a time: the flush worker, a
//! manual flush, or a producer writing through during a force flush.  Whoever
//! holds a [`FlushPermit`] is that party.
//!
//! Periodic flushes use [`FlushGate::try_enter`] and simply skip if someone
//! else is dispatching.  The force-flush path uses [`FlushGate::enter`], which
//! waits on a condition variable.  The configured poll interval is used as the
//! wait timeout, so a missed wakeup costs at most one interval.

use crate::sys::Duration;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
pub(crate) struct FlushGate {
    busy: Mutex<bool>,
    idle: Condvar,
}

impl FlushGate {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, bool> {
        self.busy.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether a permit is currently held.
    pub(crate) fn is_active(&self) -> bool {
        *self.lock()
    }

    /// Takes the permit if it is free; never blocks on another flush.
    pub(crate) fn try_enter(&self) -> Option<FlushPermit<'_>> {
        let mut busy = self.lock();
        if *busy {
            return None;
        }
        *busy = true;
        Some(FlushPermit { gate: self })
    }

    /// Waits until the permit is free, then takes it.
    pub(crate) fn enter(&self, poll: Duration) -> FlushPermit<'_> {
        let mut busy = self.lock();
        while *busy {
            busy = self
                .idle
                .wait_timeout(busy, poll)
                .map(|(guard, _)| guard)
                .unwrap_or_else(|e| e.into_inner().0);
        }
        *busy = true;
        FlushPermit { gate: self }
    }
}

/// Proof that the holder is the only one dispatching to the sink.
#[derive(Debug)]
pub(crate) struct FlushPermit<'a> {
    gate: &'a FlushGate,
}

impl Drop for FlushPermit<'_> {
    fn drop(&mut self) {
        *self.gate.lock() = false;
        self.gate.idle.notify_all();
    }
}

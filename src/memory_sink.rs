// SPDX-License-Identifier: MIT OR Apache-2.0

//! # In-Memory Sink
//!
//! A [`Sink`] that keeps every message it receives in a `Vec`, for tests and
//! for environments where there is nowhere better to put logs.
//!
//! Besides capturing, it can simulate an unreliable downstream: it can fail a
//! number of upcoming writes, slow every write down, and it counts any writes
//! that overlapped in time, which the bus promises never happens.

use crate::log_message::LogMessage;
use crate::sink::{ForceFlushFlag, Sink, SinkError};
use crate::sys::Duration;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// A sink that stores messages in memory.
///
/// # Example
///
/// ```rust
/// use logwise_bus::{BusConfig, Level, LogBus, LogMessage, MemorySink};
/// use std::sync::Arc;
///
/// let sink = Arc::new(MemorySink::new());
/// let bus = LogBus::new(sink.clone());
/// bus.put(LogMessage::new(Level::Info, "hello"));
/// bus.flush_now();
/// assert_eq!(sink.contents(), ["hello"]);
/// ```
#[derive(Debug, Default)]
pub struct MemorySink {
    messages: Mutex<Vec<LogMessage>>,
    force: ForceFlushFlag,
    fail_next: AtomicUsize,
    write_delay_us: AtomicU64,
    writing: AtomicBool,
    overlaps: AtomicUsize,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<LogMessage>> {
        self.messages.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The flag this sink reports through [`Sink::force_flush`].
    pub fn force_flag(&self) -> &ForceFlushFlag {
        &self.force
    }

    /// Makes the next `count` writes fail with [`SinkError::Rejected`].
    pub fn fail_next(&self, count: usize) {
        self.fail_next.store(count, Ordering::SeqCst);
    }

    /// Sleeps this long inside every write.
    pub fn set_write_delay(&self, delay: Duration) {
        self.write_delay_us.store(
            u64::try_from(delay.as_micros()).unwrap_or(u64::MAX),
            Ordering::Relaxed,
        );
    }

    /// Number of writes that started while another write was still running.
    pub fn overlapping_writes(&self) -> usize {
        self.overlaps.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// A copy of every message received so far.
    pub fn messages(&self) -> Vec<LogMessage> {
        self.lock().clone()
    }

    /// The content of every message received so far, in delivery order.
    pub fn contents(&self) -> Vec<String> {
        self.lock()
            .iter()
            .map(|message| message.content().to_string())
            .collect()
    }

    /// Takes every message received so far, leaving the sink empty.
    pub fn drain(&self) -> Vec<LogMessage> {
        std::mem::take(&mut *self.lock())
    }

    fn take_failure(&self) -> bool {
        self.fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl Sink for MemorySink {
    fn write(&self, message: LogMessage) -> Result<(), SinkError> {
        if self.writing.swap(true, Ordering::SeqCst) {
            self.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        let delay = Duration::from_micros(self.write_delay_us.load(Ordering::Relaxed));
        crate::sys::sleep(delay);
        let result = if self.take_failure() {
            Err(SinkError::Rejected(message.into_content()))
        } else {
            self.lock().push(message);
            Ok(())
        };
        self.writing.store(false, Ordering::SeqCst);
        result
    }

    fn force_flush(&self) -> bool {
        self.force.is_set()
    }
}

/*
Boilerplate notes for MemorySink:

- Debug: derived, required by Sink
- Default: empty sink, no failures, no delay
- Clone: no, the whole point is a single shared buffer; use Arc
- PartialEq/Hash: no meaningful equality for a sink
*/

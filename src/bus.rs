// SPDX-License-Identifier: MIT OR Apache-2.0

//! The log bus.
//!
//! [`LogBus`] sits between any number of logging threads and one synchronous
//! [`Sink`].  Producers call [`LogBus::put`], which appends to the calling
//! thread's own queue and returns.  A background worker periodically swaps the
//! queues out and writes them to the sink, merging threads by timestamp.
//!
//! # Lifecycle
//!
//! 1. [`LogBus::new`]: messages are accepted and buffered immediately, but
//!    nothing is written yet.
//! 2. [`LogBus::init`]: trims the backlog to `pre_init_logs_limit`, flushes
//!    it, and starts the worker.  Calling `init` again only updates tunables.
//! 3. [`LogBus::shutdown`] (or drop): stops the worker and flushes whatever is
//!    left.
//!
//! # Backpressure
//!
//! A thread whose queue grows past `limit_by_thread` sleeps for
//! `throttling_time` after each `put`.  Nothing is dropped.
//!
//! # Force flush
//!
//! When the sink's [`force_flush`](Sink::force_flush) flag is up, `put` stops
//! buffering: the backlog is drained (twice) and every message is written
//! through synchronously before `put` returns.  See [`ForcePhase`].
//!
//! # As a logwise logger
//!
//! `LogBus` implements [`logwise::Logger`], so it can be installed with
//! [`logwise::set_global_loggers`] to put a buffer in front of another logger:
//!
//! ```rust
//! use logwise_bus::{BusConfig, LogBus, LoggerSink};
//! use logwise::InMemoryLogger;
//! use std::sync::Arc;
//!
//! let downstream = Arc::new(InMemoryLogger::new());
//! let bus = Arc::new(LogBus::new(Arc::new(LoggerSink::new(downstream.clone()))));
//! bus.init(BusConfig::default()).unwrap();
//! // logwise::set_global_loggers(vec![bus.clone()]);
//! ```

use crate::config::{BusConfig, ConfigError, Tunables};
use crate::flush_gate::{FlushGate, FlushPermit};
use crate::force::{ForceCoordinator, ForcePhase};
use crate::generation::{Drain, Generation};
use crate::log_message::LogMessage;
use crate::sink::{Sink, SinkError};
use crate::stats::{BusStats, Counters};
use crate::worker::Worker;
#[cfg(debug_assertions)]
use logwise::privacy::LogIt;
use std::cell::Cell;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Why [`LogBus::init`] failed.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("couldn't spawn the flush worker: {0}")]
    Spawn(#[from] std::io::Error),
}

thread_local! {
    /// Address of the bus this thread is currently writing to a sink for, if any.
    static DISPATCHING: Cell<usize> = const { Cell::new(0) };
}

/// Marks the current thread as dispatching for a bus until dropped.
struct Dispatching {
    previous: usize,
}

impl Dispatching {
    fn enter(shared: &Shared) -> Self {
        let previous = DISPATCHING.with(|d| d.replace(shared.address()));
        Self { previous }
    }

    fn is_active(shared: &Shared) -> bool {
        DISPATCHING.with(|d| d.get() == shared.address())
    }
}

impl Drop for Dispatching {
    fn drop(&mut self) {
        DISPATCHING.with(|d| d.set(self.previous));
    }
}

/// State shared between the bus handle and its worker.
#[derive(Debug)]
pub(crate) struct Shared {
    generation: Generation,
    sink: Arc<dyn Sink>,
    pub(crate) tunables: Tunables,
    gate: FlushGate,
    force: ForceCoordinator,
    counters: Counters,
    pub(crate) running: AtomicBool,
    /// Write-through failures on the re-entrant path, reported once dispatching ends.
    unreported: AtomicU64,
    reporting: AtomicBool,
}

impl Shared {
    fn address(&self) -> usize {
        self as *const Shared as usize
    }

    fn put(&self, message: LogMessage) {
        self.counters.accepted();
        if Dispatching::is_active(self) {
            // The sink, or a diagnostic raised while dispatching, logged back into us.
            // We already hold the permit; buffering or forcing here would wait on ourselves.
            if self.deliver(message).is_err() {
                self.unreported.fetch_add(1, Ordering::Relaxed);
            }
            return;
        }
        if self.sink.force_flush() {
            self.put_forced(message);
            return;
        }
        self.force.flag_cleared();

        let len = self.generation.write_handle().push(message);
        if len > self.tunables.limit_by_thread() {
            self.counters.throttled();
            crate::sys::sleep(self.tunables.throttling_time());
        }
    }

    fn put_forced(&self, message: LogMessage) {
        self.force.flag_seen();
        let permit = self.gate.enter(self.tunables.wait_flush());
        self.dispatch(permit, |permit| {
            if self.force.needs_drain(permit) {
                // The second pass catches anything pushed while the first was draining.
                self.drain_generation(permit);
                self.drain_generation(permit);
                self.force.drained(permit);
            } else if self.generation.has_backlog() {
                // A producer that checked the flag just before it went up buffered after our drain.
                self.drain_generation(permit);
            }
            self.deliver_or_report(message);
        });
    }

    /**
    Runs `f` as the thread dispatching for this bus, then gives up the permit.

    Failures on the re-entrant path are reported only after the permit is
    released, so the report can itself be logged through this bus.
    */
    fn dispatch<R>(&self, permit: FlushPermit<'_>, f: impl FnOnce(&FlushPermit<'_>) -> R) -> R {
        let result = {
            let _dispatching = Dispatching::enter(self);
            f(&permit)
        };
        drop(permit);
        self.report_unreported();
        result
    }

    fn report_unreported(&self) {
        if Dispatching::is_active(self)
            || self
                .reporting
                .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
                .is_err()
        {
            return;
        }
        let failed = self.unreported.swap(0, Ordering::Relaxed);
        if failed > 0 {
            logwise::error_sync!(
                "log bus sink failed to write {failed} messages logged while dispatching",
                failed = failed
            );
        }
        self.reporting.store(false, Ordering::Release);
    }

    /// One flush cycle; a no-op if another flush is in progress.
    pub(crate) fn flush_cycle(&self) -> bool {
        let Some(permit) = self.gate.try_enter() else {
            return false;
        };
        self.dispatch(permit, |permit| self.drain_generation(permit));
        true
    }

    /// What the worker runs each period.
    pub(crate) fn periodic_flush(&self) {
        // During a force flush producers write through; only stragglers that
        // buffered just before the flag went up are left for the worker.
        if self.sink.force_flush() && !self.generation.has_backlog() {
            return;
        }
        self.flush_cycle();
    }

    /// Waits out any flush in progress, then drains twice.
    fn drain_twice(&self) {
        let permit = self.gate.enter(self.tunables.wait_flush());
        self.dispatch(permit, |permit| {
            self.drain_generation(permit);
            self.drain_generation(permit);
        });
    }

    /// Drains one generation, first finishing any drain a panicking sink cut short.
    fn drain_generation(&self, _permit: &FlushPermit<'_>) {
        while let Some(drain) = self.generation.begin_drain() {
            let resumed = drain.resumed();
            self.deliver_drain(drain);
            if !resumed {
                break;
            }
        }
    }

    fn deliver_drain(&self, mut drain: Drain<'_>) {
        self.counters.flushed();

        for spammer in drain.spammers(self.tunables.limit_by_thread()) {
            let thread = spammer.label;
            let handle = spammer.thread.to_string();
            let count = spammer.len as u64;
            logwise::warn_sync!(
                "Thread {thread} ({handle}) spam logs: {count} messages queued in one flush period",
                thread = thread,
                handle = handle,
                count = count
            );
        }
        for message in drain {
            self.deliver_or_report(message);
        }
    }

    fn deliver(&self, message: LogMessage) -> Result<(), SinkError> {
        match self.sink.write(message) {
            Ok(()) => {
                self.counters.delivered();
                Ok(())
            }
            Err(e) => {
                self.counters.failed();
                Err(e)
            }
        }
    }

    fn deliver_or_report(&self, message: LogMessage) {
        if let Err(e) = self.deliver(message) {
            let error = e.to_string();
            logwise::error_sync!("log bus sink failed to write a message: {error}", error = error);
        }
    }

    fn trim_pre_init(&self, limit: usize) {
        let trim = self.generation.trim_oldest(limit);
        if trim.discarded > 0 {
            let buffered = trim.buffered as u64;
            let discarded = trim.discarded as u64;
            self.counters.discarded(discarded);
            logwise::warn_sync!(
                "Before initialization, {buffered} logs were made. Discarding the oldest {discarded} logs.",
                buffered = buffered,
                discarded = discarded
            );
        }
    }
}

#[derive(Debug, Default)]
struct WorkerSlot {
    worker: Option<Worker>,
    /// Claimed by the first `init`; the worker is never started twice.
    started: bool,
    /// Set by `shutdown`; no worker starts afterwards.
    stopped: bool,
}

/**
A double-buffered, per-thread log accumulator in front of a [`Sink`].

Construct one per application and share it (it is `Send + Sync`; wrap it in an
`Arc` to hand it to other threads).

# Example

```rust
use logwise_bus::{BusConfig, Level, LogBus, LogMessage, MemorySink};
use std::sync::Arc;
use std::time::Duration;

let sink = Arc::new(MemorySink::new());
let bus = Arc::new(LogBus::new(sink.clone()));
bus.init(BusConfig::default().with_flush_period(Duration::from_millis(10)))
    .unwrap();

let threads: Vec<_> = (0..3)
    .map(|i| {
        let bus = bus.clone();
        std::thread::spawn(move || {
            for j in 0..10 {
                bus.put(LogMessage::new(Level::Info, format!("{i}:{j}")));
            }
        })
    })
    .collect();
for t in threads {
    t.join().unwrap();
}

bus.shutdown();
assert_eq!(sink.len(), 30);
```
*/
#[derive(Debug)]
pub struct LogBus {
    shared: Arc<Shared>,
    worker: Mutex<WorkerSlot>,
}

impl LogBus {
    /// Creates a bus writing to `sink`.  Messages are buffered until [`init`](Self::init).
    pub fn new(sink: Arc<dyn Sink>) -> Self {
        let defaults = BusConfig::default();
        Self {
            shared: Arc::new(Shared {
                generation: Generation::new(),
                sink,
                tunables: Tunables::new(&defaults),
                gate: FlushGate::new(),
                force: ForceCoordinator::new(),
                counters: Counters::default(),
                running: AtomicBool::new(false),
                unreported: AtomicU64::new(0),
                reporting: AtomicBool::new(false),
            }),
            worker: Mutex::new(WorkerSlot::default()),
        }
    }

    /// [`new`](Self::new) followed by [`init`](Self::init).
    pub fn start(sink: Arc<dyn Sink>, config: BusConfig) -> Result<Self, BusError> {
        let bus = Self::new(sink);
        bus.init(config)?;
        Ok(bus)
    }

    fn worker(&self) -> MutexGuard<'_, WorkerSlot> {
        self.worker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /**
    Applies `config` and, the first time, starts the flush worker.

    On the first call, anything buffered beyond `pre_init_logs_limit` is
    discarded oldest-first (with a single warning), and the remainder is
    flushed before the worker starts.  Later calls, and any call after
    [`shutdown`](Self::shutdown), only update the tunables.
    */
    pub fn init(&self, config: BusConfig) -> Result<(), BusError> {
        config.validate()?;
        self.shared.tunables.store(&config);

        {
            let mut slot = self.worker();
            if slot.started || slot.stopped {
                return Ok(());
            }
            slot.started = true;
        }
        #[cfg(debug_assertions)]
        {
            let period = LogIt(config.flush_period);
            let limit = config.limit_by_thread as u64;
            let throttle = LogIt(config.throttling_time);
            logwise::info_sync!(
                "log bus init: flush period {period}, limit by thread before throttling {limit}, throttling time {throttle}",
                period = period,
                limit = limit,
                throttle = throttle
            );
        }
        // The sink may call back into the bus, so the slot is not held while it runs.
        self.shared.trim_pre_init(config.pre_init_logs_limit);
        self.shared.flush_cycle();

        let mut slot = self.worker();
        if slot.stopped {
            return Ok(());
        }
        match Worker::spawn(self.shared.clone()) {
            Ok(worker) => {
                slot.worker = Some(worker);
                Ok(())
            }
            Err(e) => {
                slot.started = false;
                Err(e.into())
            }
        }
    }

    /**
    Hands `message` to the bus.

    Normally this only appends to the calling thread's queue.  It may sleep
    for `throttling_time` if this thread's queue is over its limit, and during
    a force flush it writes through to the sink before returning.
    */
    pub fn put(&self, message: LogMessage) {
        self.shared.put(message);
    }

    /// Runs one flush cycle on the calling thread.  Returns `false` if a flush was already running.
    pub fn flush_now(&self) -> bool {
        self.shared.flush_cycle()
    }

    /// Asks the worker to flush without waiting for the rest of its period.
    pub fn request_flush(&self) {
        if let Some(worker) = &self.worker().worker {
            worker.wake();
        }
    }

    /**
    Drains everything buffered so far, synchronously.

    Waits for any flush in progress and then drains twice, the same way the
    force-flush path does, but without needing the sink's flag.
    */
    pub fn force_flush_now(&self) {
        self.shared.drain_twice();
    }

    /// Stops the worker and flushes what is left.  Idempotent.
    pub fn shutdown(&self) {
        let worker = {
            let mut slot = self.worker();
            slot.stopped = true;
            slot.worker.take()
        };
        if let Some(worker) = worker {
            worker.stop(&self.shared);
        }
        let permit = self.shared.gate.enter(self.shared.tunables.wait_flush());
        self.shared
            .dispatch(permit, |permit| self.shared.drain_generation(permit));
    }

    /// Whether the flush worker is running.
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// Whether someone is currently dispatching to the sink.
    pub fn is_flushing(&self) -> bool {
        self.shared.gate.is_active()
    }

    /// Where the bus is in handling the sink's force flag.
    pub fn force_phase(&self) -> ForcePhase {
        self.shared.force.phase()
    }

    /// Messages currently buffered and not yet swapped out for flushing.
    pub fn buffered(&self) -> usize {
        self.shared.generation.buffered()
    }

    /// Counters accumulated since the bus was created.
    pub fn stats(&self) -> BusStats {
        self.shared.counters.snapshot()
    }
}

impl Drop for LogBus {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl logwise::Logger for LogBus {
    fn finish_log_record(&self, record: logwise::LogRecord) {
        self.put(LogMessage::from(record));
    }

    fn finish_log_record_async<'s>(
        &'s self,
        record: logwise::LogRecord,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + 's>> {
        // put only blocks for throttling or a force flush, both of which are the point
        Box::pin(async move { self.put(LogMessage::from(record)) })
    }

    fn prepare_to_die(&self) {
        self.force_flush_now();
    }
}

/*
Boilerplate notes for LogBus.

Clone: no.  There is one worker and one pair of buffers; share through Arc.
PartialEq/Hash: identity only would be surprising.
Default: needs a sink.
Send/Sync: yes, automatically, and required by logwise::Logger.
*/

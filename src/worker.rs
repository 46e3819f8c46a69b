// SPDX-License-Identifier: MIT OR Apache-2.0

//! The background flush thread.
//!
//! The worker waits on a control channel with the flush period as its
//! timeout.  Either a timeout or an explicit wakeup runs one flush cycle.
//! Dropping the sender disconnects the channel, which is how the worker is
//! told to exit without waiting out the rest of its period.

use crate::bus::Shared;
use crate::sys::{Duration, Instant, JoinHandle};
use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::Ordering;

use wasm_safe_mutex::mpsc;

pub(crate) enum Control {
    /// Flush now instead of at the end of the period.
    Flush,
}

pub(crate) struct Worker {
    sender: Option<mpsc::Sender<Control>>,
    thread: Option<JoinHandle>,
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("connected", &self.sender.is_some())
            .field("thread", &self.thread)
            .finish()
    }
}

impl Worker {
    pub(crate) fn spawn(shared: Arc<Shared>) -> std::io::Result<Self> {
        let (sender, receiver) = mpsc::channel();
        shared.running.store(true, Ordering::Release);
        let thread = crate::sys::spawn_named("logwise-bus-flush", move || {
            flush_loop(shared, receiver)
        })?;
        Ok(Self {
            sender: Some(sender),
            thread: Some(thread),
        })
    }

    /// Asks the worker to flush without waiting for the period to elapse.
    pub(crate) fn wake(&self) {
        if let Some(sender) = &self.sender {
            let _ = sender.send_sync(Control::Flush);
        }
    }

    /// Stops the worker and waits for it to exit.
    pub(crate) fn stop(mut self, shared: &Shared) {
        shared.running.store(false, Ordering::Release);
        self.sender.take();
        if let Some(thread) = self.thread.take() {
            // A panic that escaped the loop has already been reported by the panic hook.
            let _ = thread.join();
        }
    }
}

/// How long to sleep at a time when the flush period is too long to express as a deadline.
const UNBOUNDED_WAIT: Duration = Duration::from_secs(60);

fn flush_loop(shared: Arc<Shared>, receiver: mpsc::Receiver<Control>) {
    while shared.running.load(Ordering::Acquire) {
        // `None` means the period runs past the end of the clock: only wakeups flush.
        let deadline = Instant::now().checked_add(shared.tunables.flush_period());
        let wait_until = deadline.unwrap_or_else(|| Instant::now() + UNBOUNDED_WAIT);
        match receiver.recv_sync_timeout(wait_until) {
            Ok(Control::Flush) => {}
            Err(mpsc::RecvTimeoutError::Timeout) if deadline.is_none() => continue,
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
        if !shared.running.load(Ordering::Acquire) {
            break;
        }
        if let Err(payload) = catch_unwind(AssertUnwindSafe(|| shared.periodic_flush())) {
            let reason = panic_reason(payload.as_ref());
            logwise::error_sync!(
                "log bus flush worker caught a panic during flush: {reason}",
                reason = reason
            );
        }
    }
}

fn panic_reason(payload: &(dyn Any + Send)) -> String {
    if let Some(reason) = payload.downcast_ref::<&str>() {
        reason.to_string()
    } else if let Some(reason) = payload.downcast_ref::<String>() {
        reason.clone()
    } else {
        "unknown panic".to_string()
    }
}

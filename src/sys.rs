// SPDX-License-Identifier: MIT OR Apache-2.0

//! Platform shims for time and threads.
//!
//! On native platforms these come from `std`; on WebAssembly the clock comes
//! from `web_time` and threads from `wasm_thread`, mirroring what logwise does.
//!
//! [`Duration`] is re-exported at the crate root since it appears in
//! [`BusConfig`](crate::BusConfig).

#[cfg(not(target_arch = "wasm32"))]
pub use std::time::{Duration, Instant, SystemTime};
#[cfg(target_arch = "wasm32")]
pub use web_time::{Duration, Instant, SystemTime};

#[cfg(not(target_arch = "wasm32"))]
use std::thread;
#[cfg(target_arch = "wasm32")]
use wasm_thread as thread;

/// Blocks the calling thread for `duration`.
pub(crate) fn sleep(duration: Duration) {
    if duration.is_zero() {
        return;
    }
    thread::sleep(duration);
}

/// Spawns a named background thread.
pub(crate) fn spawn_named<F>(name: &str, f: F) -> std::io::Result<thread::JoinHandle<()>>
where
    F: FnOnce() + Send + 'static,
{
    thread::Builder::new().name(name.to_string()).spawn(f)
}

pub(crate) type JoinHandle = thread::JoinHandle<()>;

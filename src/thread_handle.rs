// SPDX-License-Identifier: MIT OR Apache-2.0

//! Small, stable per-thread handles.
//!
//! Every OS thread that touches the bus is assigned a handle the first time it
//! asks for one.  Handles are dense small integers handed out from a
//! process-wide counter, so queues can live in a flat `Vec` indexed by handle
//! instead of a map keyed by `ThreadId`.
//!
//! Handles are never reused.  Lower handles belong to threads that registered
//! earlier, which is also the tie-break order when two messages carry the same
//! timestamp.

use std::cell::OnceCell;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

static NEXT_HANDLE: AtomicU32 = AtomicU32::new(0);

thread_local! {
    static CURRENT: OnceCell<ThreadInfo> = const { OnceCell::new() };
}

#[derive(Debug)]
struct ThreadInfo {
    handle: ThreadHandle,
    label: Arc<str>,
}

/// Identity of a producer thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThreadHandle(u32);

impl ThreadHandle {
    /// The handle of the calling thread, registering it on first use.
    pub fn current() -> ThreadHandle {
        CURRENT.with(|once| get_or_register(once).handle)
    }

    /// A human-readable label for the calling thread.
    ///
    /// This is the thread's name if it has one, and the `ThreadId` otherwise.
    pub fn current_label() -> Arc<str> {
        CURRENT.with(|once| get_or_register(once).label.clone())
    }

    /// Position of this handle in a flat per-thread table.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub(crate) const fn from_index(index: usize) -> Self {
        ThreadHandle(index as u32)
    }
}

impl std::fmt::Display for ThreadHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

fn get_or_register(once: &OnceCell<ThreadInfo>) -> &ThreadInfo {
    once.get_or_init(|| {
        let current = std::thread::current();
        let label = match current.name() {
            Some(name) => Arc::from(name),
            None => Arc::from(format!("{:?}", current.id())),
        };
        ThreadInfo {
            handle: ThreadHandle(NEXT_HANDLE.fetch_add(1, Ordering::Relaxed)),
            label,
        }
    })
}

/*
Boilerplate notes for ThreadHandle.

Copy/Clone: it's an integer.
PartialEq/Eq/Hash: identity comparison, cheap.
Ord: meaningful, it's registration order and the tie-break rule depends on it.
Default: no, a handle only comes from registration.
Display: useful for diagnostics.
From/Into u32: no, we don't want handles made up out of thin air outside tests.
*/

#[cfg(test)]
mod tests {
    use super::ThreadHandle;

    #[test]
    fn handle_is_stable_within_a_thread() {
        let a = ThreadHandle::current();
        let b = ThreadHandle::current();
        assert_eq!(a, b);
    }

    #[test]
    fn threads_get_distinct_handles() {
        let mine = ThreadHandle::current();
        let theirs = std::thread::spawn(ThreadHandle::current).join().unwrap();
        assert_ne!(mine, theirs);
    }

    #[test]
    fn label_uses_thread_name() {
        let label = std::thread::Builder::new()
            .name("producer-7".to_string())
            .spawn(ThreadHandle::current_label)
            .unwrap()
            .join()
            .unwrap();
        assert_eq!(&*label, "producer-7");
    }
}

// SPDX-License-Identifier: MIT OR Apache-2.0
/*!
A reader/writer spinlock.

On the wasm main thread we can't necessarily block, so like logwise we spin.
Every critical section guarded by this lock is O(1): a push onto an
already-registered queue (shared), or a buffer swap / queue registration
(exclusive).

Writers take priority.  Once a writer announces itself, new readers back off
until it has come and gone, so a steady stream of producers can't starve the
flush thread's swap.
*/

use std::cell::UnsafeCell;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering::{Acquire, Relaxed, Release};

const WRITER_LOCKED: u32 = 1 << 31;
const WRITER_WAITING: u32 = 1 << 30;
const READER_MASK: u32 = WRITER_WAITING - 1;

pub struct Spinlock<T> {
    data: UnsafeCell<T>,
    state: AtomicU32,
}

unsafe impl<T: Send> Send for Spinlock<T> {}
unsafe impl<T: Send + Sync> Sync for Spinlock<T> {}

impl<T> Spinlock<T> {
    pub const fn new(data: T) -> Self {
        Spinlock {
            data: UnsafeCell::new(data),
            state: AtomicU32::new(0),
        }
    }

    fn lock_write(&self) {
        self.state.fetch_or(WRITER_WAITING, Relaxed);
        loop {
            // Only succeeds with no readers and no other writer holding the lock.
            if self
                .state
                .compare_exchange_weak(WRITER_WAITING, WRITER_LOCKED, Acquire, Relaxed)
                .is_ok()
            {
                return;
            }
            std::hint::spin_loop();
            // Another writer may have consumed our announcement.
            self.state.fetch_or(WRITER_WAITING, Relaxed);
        }
    }

    fn unlock_write(&self) {
        // Keep WRITER_WAITING so a queued writer goes next.
        self.state.fetch_and(!WRITER_LOCKED, Release);
    }

    fn lock_read(&self) {
        while self
            .state
            .fetch_update(Acquire, Relaxed, |v| {
                if v & (WRITER_LOCKED | WRITER_WAITING) == 0 && v & READER_MASK < READER_MASK {
                    Some(v + 1)
                } else {
                    None
                }
            })
            .is_err()
        {
            std::hint::spin_loop();
        }
    }

    fn unlock_read(&self) {
        self.state.fetch_sub(1, Release);
    }

    /// Runs `f` with exclusive access.
    pub fn with_mut<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut T) -> R,
    {
        self.lock_write();
        let _release = Unlock(|| self.unlock_write());
        // SAFETY: we hold the write lock, nobody else can observe the data
        f(unsafe { &mut *self.data.get() })
    }

    /// Runs `f` with shared access.
    pub fn with<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&T) -> R,
    {
        self.lock_read();
        let _release = Unlock(|| self.unlock_read());
        // SAFETY: we hold a read lock, so there is no writer
        f(unsafe { &*self.data.get() })
    }
}

impl<T> std::fmt::Debug for Spinlock<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.load(Relaxed);
        f.debug_struct("Spinlock")
            .field("readers", &(state & READER_MASK))
            .field("writer", &(state & WRITER_LOCKED != 0))
            .finish_non_exhaustive()
    }
}

/// Releases the lock on scope exit, including when `f` panics.
struct Unlock<F: FnMut()>(F);

impl<F: FnMut()> Drop for Unlock<F> {
    fn drop(&mut self) {
        (self.0)()
    }
}

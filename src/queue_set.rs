// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-thread FIFO queues.
//!
//! A [`QueueSet`] maps each producer's [`ThreadHandle`] to a FIFO of
//! [`LogMessage`]s.  The map is a flat `Vec` indexed by handle; a slot is
//! created the first time a thread pushes and stays for the life of the set.
//!
//! Pushing onto an existing slot only needs `&self`: each slot is wrapped in
//! its own `Mutex`, which is uncontended because only the owning thread pushes
//! while the set is active.  Everything else (registering a slot, draining,
//! selecting the oldest message) needs `&mut self`, which callers obtain either
//! from the exclusive lock or by owning a set that has been swapped out.

use crate::log_message::LogMessage;
use crate::thread_handle::ThreadHandle;
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

type Queue = VecDeque<LogMessage>;

#[derive(Debug, Default)]
pub(crate) struct QueueSet {
    slots: Vec<Option<Mutex<Queue>>>,
}

/// A per-thread queue that was at or over its limit when inspected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Spammer {
    pub(crate) thread: ThreadHandle,
    pub(crate) label: String,
    pub(crate) len: usize,
}

fn queue_mut(slot: &mut Mutex<Queue>) -> &mut Queue {
    slot.get_mut().unwrap_or_else(PoisonError::into_inner)
}

impl QueueSet {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /**
    Pushes onto an already-registered queue.

    Returns the queue's length after the push, or hands the message back if the
    thread has no queue in this set yet.
    */
    pub(crate) fn push(&self, thread: ThreadHandle, message: LogMessage) -> Result<usize, LogMessage> {
        match self.slots.get(thread.index()) {
            Some(Some(slot)) => {
                let mut queue = slot.lock().unwrap_or_else(PoisonError::into_inner);
                queue.push_back(message);
                Ok(queue.len())
            }
            _ => Err(message),
        }
    }

    /// Registers a queue for `thread` if needed, then pushes.
    pub(crate) fn register_and_push(&mut self, thread: ThreadHandle, message: LogMessage) -> usize {
        let index = thread.index();
        if self.slots.len() <= index {
            self.slots.resize_with(index + 1, || None);
        }
        let queue = queue_mut(self.slots[index].get_or_insert_with(Default::default));
        queue.push_back(message);
        queue.len()
    }

    /// Total number of queued messages across all threads.
    pub(crate) fn total(&mut self) -> usize {
        self.queues_mut().map(|(_, q)| q.len()).sum()
    }

    /**
    Finds the thread whose front message is oldest.

    Ties on the ordering timestamp go to the lower handle.  Returns `None` when
    every queue is empty.
    */
    pub(crate) fn oldest(&mut self) -> Option<ThreadHandle> {
        let mut best: Option<(ThreadHandle, crate::sys::Instant)> = None;
        // Slots are visited in handle order; an equal timestamp keeps the lower handle.
        for (thread, queue) in self.queues_mut() {
            let Some(front) = queue.front() else {
                continue;
            };
            let time = front.steady_time();
            match best {
                Some((_, best_time)) if best_time <= time => {}
                _ => best = Some((thread, time)),
            }
        }
        best.map(|(thread, _)| thread)
    }

    pub(crate) fn pop_front(&mut self, thread: ThreadHandle) -> Option<LogMessage> {
        match self.slots.get_mut(thread.index()) {
            Some(Some(slot)) => queue_mut(slot).pop_front(),
            _ => None,
        }
    }

    /// Removes and returns the globally oldest message.
    pub(crate) fn pop_oldest(&mut self) -> Option<LogMessage> {
        let thread = self.oldest()?;
        self.pop_front(thread)
    }

    /// Queues whose length is at or above `limit`.
    pub(crate) fn spammers(&mut self, limit: usize) -> Vec<Spammer> {
        self.queues_mut()
            .filter(|(_, q)| q.len() >= limit)
            .filter_map(|(thread, q)| {
                q.front().map(|front| Spammer {
                    thread,
                    label: front.thread_label().to_string(),
                    len: q.len(),
                })
            })
            .collect()
    }

    fn queues_mut(&mut self) -> impl Iterator<Item = (ThreadHandle, &mut Queue)> {
        self.slots
            .iter_mut()
            .enumerate()
            .filter_map(|(index, slot)| {
                slot.as_mut()
                    .map(|slot| (ThreadHandle::from_index(index), queue_mut(slot)))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::QueueSet;
    use crate::level::Level;
    use crate::log_message::LogMessage;
    use crate::sys::{Duration, Instant};
    use crate::thread_handle::ThreadHandle;

    fn at(base: Instant, millis: u64, content: &str) -> LogMessage {
        LogMessage::new(Level::Info, content).with_steady_time(base + Duration::from_millis(millis))
    }

    #[cfg_attr(not(target_arch = "wasm32"), test)]
    #[cfg_attr(target_arch = "wasm32", wasm_bindgen_test::wasm_bindgen_test)]
    fn push_requires_registration() {
        let mut set = QueueSet::new();
        let t = ThreadHandle::from_index(3);
        let message = LogMessage::new(Level::Info, "a");
        let message = set.push(t, message).unwrap_err();
        assert_eq!(set.register_and_push(t, message), 1);
        assert_eq!(set.push(t, LogMessage::new(Level::Info, "b")).unwrap(), 2);
        assert_eq!(set.total(), 2);
    }

    #[cfg_attr(not(target_arch = "wasm32"), test)]
    #[cfg_attr(target_arch = "wasm32", wasm_bindgen_test::wasm_bindgen_test)]
    fn oldest_merges_across_threads() {
        let base = Instant::now();
        let mut set = QueueSet::new();
        let a = ThreadHandle::from_index(0);
        let b = ThreadHandle::from_index(1);
        set.register_and_push(a, at(base, 10, "a10"));
        set.register_and_push(a, at(base, 30, "a30"));
        set.register_and_push(b, at(base, 20, "b20"));
        set.register_and_push(b, at(base, 40, "b40"));

        let mut order = Vec::new();
        while let Some(message) = set.pop_oldest() {
            order.push(message.into_content());
        }
        assert_eq!(order, ["a10", "b20", "a30", "b40"]);
        assert_eq!(set.total(), 0);
        assert_eq!(set.oldest(), None);
    }

    #[cfg_attr(not(target_arch = "wasm32"), test)]
    #[cfg_attr(target_arch = "wasm32", wasm_bindgen_test::wasm_bindgen_test)]
    fn ties_go_to_the_lower_handle() {
        let base = Instant::now();
        let mut set = QueueSet::new();
        let low = ThreadHandle::from_index(2);
        let high = ThreadHandle::from_index(5);
        set.register_and_push(high, at(base, 7, "high"));
        set.register_and_push(low, at(base, 7, "low"));
        assert_eq!(set.oldest(), Some(low));
    }

    #[cfg_attr(not(target_arch = "wasm32"), test)]
    #[cfg_attr(target_arch = "wasm32", wasm_bindgen_test::wasm_bindgen_test)]
    fn empty_slots_are_skipped() {
        let base = Instant::now();
        let mut set = QueueSet::new();
        let a = ThreadHandle::from_index(0);
        let b = ThreadHandle::from_index(4);
        set.register_and_push(a, at(base, 1, "gone"));
        set.register_and_push(b, at(base, 2, "left"));
        set.pop_front(a);
        assert_eq!(set.oldest(), Some(b));
        assert_eq!(set.total(), 1);
    }

    #[cfg_attr(not(target_arch = "wasm32"), test)]
    #[cfg_attr(target_arch = "wasm32", wasm_bindgen_test::wasm_bindgen_test)]
    fn spammers_at_or_over_limit() {
        let mut set = QueueSet::new();
        let quiet = ThreadHandle::from_index(0);
        let loud = ThreadHandle::from_index(1);
        set.register_and_push(quiet, LogMessage::new(Level::Info, "q"));
        for i in 0..3 {
            set.register_and_push(loud, LogMessage::new(Level::Info, format!("l{i}")));
        }
        let spammers = set.spammers(3);
        assert_eq!(spammers.len(), 1);
        assert_eq!(spammers[0].thread, loud);
        assert_eq!(spammers[0].len, 3);
    }
}

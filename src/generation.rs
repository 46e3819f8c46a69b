// SPDX-License-Identifier: MIT OR Apache-2.0

/*!
The generation pair.

Two [`QueueSet`]s exist for the lifetime of the bus.  One is *active*:
producers push into it.  The other is either idle (the spare) or out being
drained.  A flush swaps them under the exclusive lock and moves the old active
set out into a [`Drain`], so the drain runs with no lock held and, because the
set is owned by the `Drain`, nothing else can reach it.  Dropping the `Drain`
returns the set as the new spare, keeping its allocations for next time.

A drain cut short (the sink panicked) leaves messages older than anything in
the active set.  Those are handed out again by the next [`Generation::begin_drain`]
before any further swap, so generations are never reordered.

Producers only ever see the active set through a [`WriteHandle`], and only
under the shared lock.  The exclusive lock is taken for the swap, for
registering a thread the active set hasn't seen, and for pre-start trimming.
*/

use crate::log_message::LogMessage;
use crate::queue_set::{QueueSet, Spammer};
use crate::spinlock::Spinlock;
use crate::thread_handle::ThreadHandle;

#[derive(Debug)]
struct Buffers {
    active: QueueSet,
    /// `None` while the other set is out being drained.
    spare: Option<QueueSet>,
    /// The spare still holds messages from an interrupted drain.
    interrupted: bool,
}

#[derive(Debug)]
pub(crate) struct Generation {
    buffers: Spinlock<Buffers>,
}

/// Outcome of [`Generation::trim_oldest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Trim {
    pub(crate) buffered: usize,
    pub(crate) discarded: usize,
}

impl Generation {
    pub(crate) fn new() -> Self {
        Self {
            buffers: Spinlock::new(Buffers {
                active: QueueSet::new(),
                spare: Some(QueueSet::new()),
                interrupted: false,
            }),
        }
    }

    /// A handle for pushing the calling thread's messages.
    pub(crate) fn write_handle(&self) -> WriteHandle<'_> {
        self.write_handle_for(ThreadHandle::current())
    }

    pub(crate) fn write_handle_for(&self, thread: ThreadHandle) -> WriteHandle<'_> {
        WriteHandle {
            generation: self,
            thread,
        }
    }

    /**
    Swaps the active set out for draining.

    Returns `None` if the other set is still out, i.e. a drain is already in
    progress.  If the previous drain was interrupted, its leftovers are handed
    out instead and the active set stays where it is; see [`Drain::resumed`].
    */
    pub(crate) fn begin_drain(&self) -> Option<Drain<'_>> {
        let (set, resumed) = self.buffers.with_mut(|buffers| {
            let spare = buffers.spare.take()?;
            if std::mem::take(&mut buffers.interrupted) {
                return Some((spare, true));
            }
            Some((std::mem::replace(&mut buffers.active, spare), false))
        })?;
        Some(Drain {
            generation: self,
            set: Some(set),
            resumed,
        })
    }

    /// Whether anything is waiting to be drained, including leftovers of an interrupted drain.
    pub(crate) fn has_backlog(&self) -> bool {
        self.buffers
            .with_mut(|buffers| buffers.interrupted || buffers.active.total() > 0)
    }

    /// Number of messages waiting in the active set.
    pub(crate) fn buffered(&self) -> usize {
        self.buffers.with_mut(|buffers| buffers.active.total())
    }

    /**
    Discards the oldest active messages until at most `limit` remain.

    # Panics

    If the set reports messages remaining but no oldest message can be found.
    */
    pub(crate) fn trim_oldest(&self, limit: usize) -> Trim {
        self.buffers.with_mut(|buffers| {
            let buffered = buffers.active.total();
            let discarded = buffered.saturating_sub(limit);
            for _ in 0..discarded {
                if buffers.active.pop_oldest().is_none() {
                    panic!("queue set counted {buffered} messages but ran out while trimming");
                }
            }
            Trim { buffered, discarded }
        })
    }
}

/// Pushes messages for one thread into whichever set is active.
#[derive(Debug, Clone, Copy)]
pub(crate) struct WriteHandle<'a> {
    generation: &'a Generation,
    thread: ThreadHandle,
}

impl WriteHandle<'_> {
    /// Pushes `message`, returning the thread's queue length after the push.
    pub(crate) fn push(&self, message: LogMessage) -> usize {
        let buffers = &self.generation.buffers;
        // Common case: this thread already has a queue, the shared lock is enough.
        let message = match buffers.with(|b| b.active.push(self.thread, message)) {
            Ok(len) => return len,
            Err(message) => message,
        };
        buffers.with_mut(|b| b.active.register_and_push(self.thread, message))
    }
}

/// A swapped-out set being drained.
#[derive(Debug)]
pub(crate) struct Drain<'a> {
    generation: &'a Generation,
    set: Option<QueueSet>,
    resumed: bool,
}

impl Drain<'_> {
    fn set(&mut self) -> &mut QueueSet {
        self.set
            .as_mut()
            .unwrap_or_else(|| unreachable!("set is only taken on drop"))
    }

    /// This drain finishes an interrupted one; the active set has not been swapped yet.
    pub(crate) fn resumed(&self) -> bool {
        self.resumed
    }

    pub(crate) fn spammers(&mut self, limit: usize) -> Vec<Spammer> {
        self.set().spammers(limit)
    }

    pub(crate) fn remaining(&mut self) -> usize {
        self.set().total()
    }

    /// Removes the oldest message across all threads.
    pub(crate) fn pop_oldest(&mut self) -> Option<LogMessage> {
        self.set().pop_oldest()
    }
}

impl Iterator for Drain<'_> {
    type Item = LogMessage;

    fn next(&mut self) -> Option<LogMessage> {
        self.pop_oldest()
    }
}

impl Drop for Drain<'_> {
    fn drop(&mut self) {
        if let Some(mut set) = self.set.take() {
            // Only a panicking sink stops a drain early.
            let interrupted = set.total() > 0;
            self.generation.buffers.with_mut(|buffers| {
                buffers.spare = Some(set);
                buffers.interrupted = interrupted;
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Generation;
    use crate::level::Level;
    use crate::log_message::LogMessage;
    use crate::sys::{Duration, Instant};
    use crate::thread_handle::ThreadHandle;
    use std::sync::Arc;

    fn message(content: &str) -> LogMessage {
        LogMessage::new(Level::Info, content)
    }

    #[test]
    fn drain_sees_only_the_swapped_generation() {
        let generation = Generation::new();
        let writer = generation.write_handle();
        writer.push(message("before"));

        let mut drain = generation.begin_drain().unwrap();
        writer.push(message("after"));
        let drained: Vec<_> = drain.by_ref().map(LogMessage::into_content).collect();
        assert_eq!(drained, ["before"]);
        drop(drain);

        let drained: Vec<_> = generation
            .begin_drain()
            .unwrap()
            .map(LogMessage::into_content)
            .collect();
        assert_eq!(drained, ["after"]);
    }

    #[test]
    fn only_one_drain_at_a_time() {
        let generation = Generation::new();
        let first = generation.begin_drain();
        assert!(first.is_some());
        assert!(generation.begin_drain().is_none());
        drop(first);
        assert!(generation.begin_drain().is_some());
    }

    #[test]
    fn push_reports_post_push_length() {
        let generation = Generation::new();
        let writer = generation.write_handle_for(ThreadHandle::from_index(9));
        assert_eq!(writer.push(message("1")), 1);
        assert_eq!(writer.push(message("2")), 2);
        assert_eq!(generation.buffered(), 2);
    }

    #[test]
    fn trim_discards_the_oldest() {
        let base = Instant::now();
        let generation = Generation::new();
        let a = generation.write_handle_for(ThreadHandle::from_index(0));
        let b = generation.write_handle_for(ThreadHandle::from_index(1));
        for i in 0..4u64 {
            a.push(message(&format!("a{i}")).with_steady_time(base + Duration::from_millis(i * 2)));
            b.push(message(&format!("b{i}")).with_steady_time(base + Duration::from_millis(i * 2 + 1)));
        }
        let trim = generation.trim_oldest(5);
        assert_eq!(trim.buffered, 8);
        assert_eq!(trim.discarded, 3);

        let kept: Vec<_> = generation
            .begin_drain()
            .unwrap()
            .map(LogMessage::into_content)
            .collect();
        assert_eq!(kept, ["b1", "a2", "b2", "a3", "b3"]);
    }

    #[test]
    fn trim_under_limit_is_a_no_op() {
        let generation = Generation::new();
        generation.write_handle().push(message("only"));
        let trim = generation.trim_oldest(10);
        assert_eq!(trim.discarded, 0);
        assert_eq!(generation.buffered(), 1);
    }

    #[test]
    fn interrupted_drain_is_resumed_before_the_next_swap() {
        let generation = Generation::new();
        let writer = generation.write_handle();
        for content in ["a", "b", "c"] {
            writer.push(message(content));
        }

        let mut drain = generation.begin_drain().unwrap();
        assert!(!drain.resumed());
        assert_eq!(drain.next().map(LogMessage::into_content).as_deref(), Some("a"));
        drop(drain);
        writer.push(message("d"));
        assert!(generation.has_backlog());

        let resumed = generation.begin_drain().unwrap();
        assert!(resumed.resumed());
        let drained: Vec<_> = resumed.map(LogMessage::into_content).collect();
        assert_eq!(drained, ["b", "c"]);

        let next = generation.begin_drain().unwrap();
        assert!(!next.resumed());
        let drained: Vec<_> = next.map(LogMessage::into_content).collect();
        assert_eq!(drained, ["d"]);
        assert!(!generation.has_backlog());
    }

    #[test]
    fn new_threads_register_while_draining() {
        let generation = Arc::new(Generation::new());
        let mut drain = generation.begin_drain().unwrap();
        let threads: Vec<_> = (0..4)
            .map(|i| {
                let generation = generation.clone();
                std::thread::spawn(move || {
                    let writer = generation.write_handle();
                    for j in 0..25 {
                        writer.push(message(&format!("{i}-{j}")));
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        assert_eq!(drain.remaining(), 0);
        drop(drain);
        assert_eq!(generation.buffered(), 100);
    }
}

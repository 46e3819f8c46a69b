// SPDX-License-Identifier: MIT OR Apache-2.0

/*!
Force-flush phases.

```text
Normal --flag seen--> ForcePending --backlog drained twice--> ForceDraining
   ^                                                               |
   +--------------------------flag cleared-------------------------+
```

While the sink's force flag is up, every `put` takes the flush permit (waiting
out any flush in progress) and writes its own message straight to the sink.
The first of them to hold the permit while the backlog is still buffered
drains it, twice, before writing.  The decision is made while holding the
permit, so no message written through can overtake one that was buffered
before the emergency.  Later holders drain again only if a straggler slipped
into the buffers after that.
*/

use crate::flush_gate::FlushPermit;
use std::sync::atomic::{AtomicU8, Ordering};

/// Where a [`LogBus`](crate::LogBus) is in handling a force flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ForcePhase {
    /// Messages are buffered and flushed periodically.
    Normal,
    /// The force flag has been seen but the buffered backlog hasn't been drained yet.
    ForcePending,
    /// The backlog is gone; every message is written through synchronously.
    ForceDraining,
}

const NORMAL: u8 = 0;
const PENDING: u8 = 1;
const DRAINING: u8 = 2;

#[derive(Debug)]
pub(crate) struct ForceCoordinator {
    phase: AtomicU8,
}

impl ForceCoordinator {
    pub(crate) const fn new() -> Self {
        Self {
            phase: AtomicU8::new(NORMAL),
        }
    }

    pub(crate) fn phase(&self) -> ForcePhase {
        match self.phase.load(Ordering::Acquire) {
            NORMAL => ForcePhase::Normal,
            PENDING => ForcePhase::ForcePending,
            _ => ForcePhase::ForceDraining,
        }
    }

    /// The force flag is up.
    pub(crate) fn flag_seen(&self) {
        let _ = self
            .phase
            .compare_exchange(NORMAL, PENDING, Ordering::AcqRel, Ordering::Acquire);
    }

    /// The force flag is down; buffering resumes.
    pub(crate) fn flag_cleared(&self) {
        if self.phase.load(Ordering::Relaxed) != NORMAL {
            self.phase.store(NORMAL, Ordering::Release);
        }
    }

    /**
    Whether the permit holder still has to drain the backlog.

    Only meaningful while holding the permit, which is what serialises the
    answer between producers.
    */
    pub(crate) fn needs_drain(&self, _permit: &FlushPermit<'_>) -> bool {
        self.phase.load(Ordering::Acquire) != DRAINING
    }

    pub(crate) fn drained(&self, _permit: &FlushPermit<'_>) {
        self.phase.store(DRAINING, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::{ForceCoordinator, ForcePhase};
    use crate::flush_gate::FlushGate;
    use crate::sys::Duration;

    #[test]
    fn walks_the_phases() {
        let gate = FlushGate::new();
        let force = ForceCoordinator::new();
        assert_eq!(force.phase(), ForcePhase::Normal);

        force.flag_seen();
        assert_eq!(force.phase(), ForcePhase::ForcePending);

        let permit = gate.enter(Duration::from_millis(1));
        assert!(force.needs_drain(&permit));
        force.drained(&permit);
        assert!(!force.needs_drain(&permit));
        drop(permit);
        assert_eq!(force.phase(), ForcePhase::ForceDraining);

        // seeing the flag again doesn't restart the drain
        force.flag_seen();
        assert_eq!(force.phase(), ForcePhase::ForceDraining);

        force.flag_cleared();
        assert_eq!(force.phase(), ForcePhase::Normal);
    }
}

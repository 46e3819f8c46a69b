//SPDX-License-Identifier: MIT OR Apache-2.0
/*!
# logwise_bus

logwise_bus is a double-buffered, per-thread log accumulator.  It sits between
the threads of a program that log and one synchronous destination (a file, a
socket, another [`logwise::Logger`]) that may be slow.

# The problem

Writing a log line to its destination on the thread that produced it couples
the speed of every thread to the speed of the slowest sink.  Funnelling every
thread through a single locked queue trades that for contention.

# The design

Each thread appends to its own queue.  A background worker periodically swaps
the whole set of queues for a spare, empty set, then writes the swapped-out
messages to the [`Sink`] without holding any lock producers need.  Messages
from different threads are merged oldest-first by their monotonic timestamp,
and each thread's messages stay in the order it logged them.

| Concern         | Behavior                                                                   |
|-----------------|----------------------------------------------------------------------------|
| Startup         | Messages logged before [`LogBus::init`] are kept, up to a limit            |
| Backpressure    | A thread over its queue limit sleeps briefly after each `put`              |
| Spam            | A thread that fills its queue within one period is reported with a warning |
| Emergencies     | A [`Sink`] can ask for every message to be written through synchronously   |
| Sink failures   | Reported through logwise and skipped; the flush carries on                 |
| Shutdown        | [`LogBus::shutdown`] (or drop) flushes whatever is left                    |

# Usage

```rust
use logwise_bus::{BusConfig, Level, LogBus, LogMessage, MemorySink};
use std::sync::Arc;

let sink = Arc::new(MemorySink::new());
let bus = LogBus::new(sink.clone());
bus.put(LogMessage::new(Level::Info, "logged before init is kept"));
bus.init(BusConfig::default()).unwrap();
bus.put(LogMessage::new(Level::Warning, "and so is this"));
bus.shutdown();
assert_eq!(sink.len(), 2);
```

A bus also implements [`logwise::Logger`], so it can be installed globally in
front of another logger with [`LoggerSink`].

# Diagnostics

The bus reports its own trouble (spam, sink errors, discarded startup logs)
through logwise's `warn_sync!` and `error_sync!`.  If the bus is itself a
global logger, those reports are written straight to its sink rather than
buffered.
*/

mod bus;
mod config;
mod flush_gate;
mod force;
mod generation;
mod level;
mod log_message;
mod memory_sink;
mod queue_set;
mod sink;
mod spinlock;
mod stats;
mod sys;
mod thread_handle;
mod worker;

logwise::declare_logging_domain!();

pub use bus::{BusError, LogBus};
pub use config::{BusConfig, ConfigError};
pub use force::ForcePhase;
pub use level::Level;
pub use log_message::LogMessage;
pub use memory_sink::MemorySink;
pub use sink::{ForceFlushFlag, LoggerSink, Sink, SinkError};
pub use stats::BusStats;
pub use thread_handle::ThreadHandle;

pub use sys::Duration;

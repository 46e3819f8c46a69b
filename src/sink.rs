// SPDX-License-Identifier: MIT OR Apache-2.0

//! The downstream side of the bus.
//!
//! A [`Sink`] receives messages one at a time, synchronously, in the order the
//! bus decides.  It also owns the process-wide *force flush* flag: when a sink
//! reports [`Sink::force_flush`] as `true`, the bus stops buffering and every
//! producer writes straight through.
//!
//! Sinks are called from the flush worker and, during a force flush, from
//! producer threads.  The bus never calls a sink from two threads at once.
//!
//! Two sinks are provided: [`LoggerSink`], which forwards to any
//! [`logwise::Logger`], and [`MemorySink`](crate::MemorySink), which keeps
//! messages in memory.

use crate::log_message::LogMessage;
use std::fmt::Debug;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

pub trait Sink: Debug + Send + Sync {
    /**
    Writes one message.

    Failures are reported back to the bus, which logs them and moves on to the
    next message.  The failed message is not retried.
    */
    fn write(&self, message: LogMessage) -> Result<(), SinkError>;

    /**
    Whether the process is going down and buffered delivery should stop.

    Read on every `put`, so keep it cheap.
    */
    fn force_flush(&self) -> bool;
}

/// Why a [`Sink`] could not write a message.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("sink I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("sink rejected message: {0}")]
    Rejected(String),
}

/**
An atomic force-flush flag for sinks to embed.

Setting the flag is how the application announces an emergency; the bus
notices on the next `put`.
*/
#[derive(Debug, Default)]
pub struct ForceFlushFlag {
    set: AtomicBool,
}

impl ForceFlushFlag {
    pub const fn new() -> Self {
        Self {
            set: AtomicBool::new(false),
        }
    }

    pub fn set(&self) {
        self.set.store(true, Ordering::SeqCst);
    }

    pub fn clear(&self) {
        self.set.store(false, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.set.load(Ordering::SeqCst)
    }
}

/**
A sink that forwards every message to a [`logwise::Logger`].

```rust
use logwise_bus::{Level, LogMessage, LoggerSink, Sink};
use logwise::InMemoryLogger;
use std::sync::Arc;

let logger = Arc::new(InMemoryLogger::new());
let sink = LoggerSink::new(logger.clone());
sink.write(LogMessage::new(Level::Info, "forwarded")).unwrap();
assert!(logger.drain_logs().contains("forwarded"));
```
*/
#[derive(Debug)]
pub struct LoggerSink {
    logger: Arc<dyn logwise::Logger>,
    force: ForceFlushFlag,
}

impl LoggerSink {
    pub fn new(logger: Arc<dyn logwise::Logger>) -> Self {
        Self {
            logger,
            force: ForceFlushFlag::new(),
        }
    }

    /// The flag this sink reports through [`Sink::force_flush`].
    pub fn force_flag(&self) -> &ForceFlushFlag {
        &self.force
    }
}

impl Sink for LoggerSink {
    fn write(&self, message: LogMessage) -> Result<(), SinkError> {
        self.logger.finish_log_record(message.into_record());
        Ok(())
    }

    fn force_flush(&self) -> bool {
        self.force.is_set()
    }
}

/*
Boilerplate notes.

ForceFlushFlag: Default is the cleared flag.  No Clone, a copy of the flag would
silently stop being the flag.

LoggerSink: no Clone either, two sinks sharing one logger but with separate
flags would be confusing.  Wrap in Arc instead.
*/

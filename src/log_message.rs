// SPDX-License-Identifier: MIT OR Apache-2.0

//! The unit of work moved through the bus.
//!
//! A [`LogMessage`] is created on the producing thread, handed to
//! [`LogBus::put`](crate::LogBus::put), and later handed by value to a
//! [`Sink`](crate::Sink).  It is never mutated once queued.
//!
//! # Ordering
//!
//! Two clocks are captured at creation:
//!
//! - a monotonic [`Instant`], which is the ordering key used when queues from
//!   different threads are merged at flush time;
//! - a wall-clock [`SystemTime`], carried for the sink's benefit only.
//!
//! # Example
//!
//! ```rust
//! use logwise_bus::{Level, LogMessage};
//!
//! let message = LogMessage::new(Level::Warning, "disk is 91% full");
//! assert_eq!(message.level(), Level::Warning);
//! assert_eq!(message.content(), "disk is 91% full");
//! ```

use crate::level::Level;
use crate::sys::{Instant, SystemTime};
use crate::thread_handle::ThreadHandle;
use std::fmt::Display;
use std::sync::Arc;

/**
A buffered log message.

The producing thread's identity is captured when the message is constructed,
so construct it on the thread that is logging.
*/
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogMessage {
    steady_time: Instant,
    wall_time: SystemTime,
    thread: ThreadHandle,
    thread_label: Arc<str>,
    level: Level,
    content: String,
}

impl LogMessage {
    /// Creates a message stamped with the current time and thread.
    pub fn new(level: Level, content: impl Into<String>) -> Self {
        Self {
            steady_time: Instant::now(),
            wall_time: SystemTime::now(),
            thread: ThreadHandle::current(),
            thread_label: ThreadHandle::current_label(),
            level,
            content: content.into(),
        }
    }

    /**
    Replaces the ordering timestamp.

    Useful when a message is forwarded from elsewhere and should sort by the
    time it was originally produced rather than when it was re-wrapped.
    */
    pub fn with_steady_time(mut self, steady_time: Instant) -> Self {
        self.steady_time = steady_time;
        self
    }

    /// The monotonic ordering key.
    #[inline]
    pub fn steady_time(&self) -> Instant {
        self.steady_time
    }

    #[inline]
    pub fn wall_time(&self) -> SystemTime {
        self.wall_time
    }

    /// Handle of the thread that produced the message.
    #[inline]
    pub fn thread(&self) -> ThreadHandle {
        self.thread
    }

    /// Name of the thread that produced the message.
    #[inline]
    pub fn thread_label(&self) -> &str {
        &self.thread_label
    }

    #[inline]
    pub fn level(&self) -> Level {
        self.level
    }

    #[inline]
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Consumes the message, returning its content.
    pub fn into_content(self) -> String {
        self.content
    }

    /**
    Converts the message into a [`logwise::LogRecord`].

    Only the content is written to the record; logwise records produced by the
    logwise macros already carry their own prelude.
    */
    pub fn into_record(self) -> logwise::LogRecord {
        let mut record = logwise::LogRecord::new(self.level.into());
        record.log_owned(self.content);
        record
    }
}

impl From<logwise::LogRecord> for LogMessage {
    fn from(record: logwise::LogRecord) -> Self {
        LogMessage::new(record.level().into(), record.to_string())
    }
}

impl Display for LogMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} [{}] {}", self.level, self.thread_label, self.content)
    }
}

/*
Boilerplate notes for LogMessage:

IMPLEMENTED:
- Debug, Clone: derived, cheap enough (the label is shared)
- PartialEq/Eq: derived, mostly for tests
- Display: level, thread and content
- From<LogRecord>: the bus sits behind logwise's Logger trait

NOT IMPLEMENTED:
- Default: a message with no content and a made-up time is not meaningful
- Ord: two clocks, and the ordering key alone is not a total order of messages
- Hash: no use for messages as keys
- Copy: owns a String
*/

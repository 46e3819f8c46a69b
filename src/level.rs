// SPDX-License-Identifier: MIT OR Apache-2.0

/// Severity of a buffered [`LogMessage`](crate::LogMessage).
///
/// The bus itself never filters on level; it is carried through to the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Level {
    /// Very detailed diagnostics
    Trace,
    /// Developer-facing diagnostics
    Debug,
    /// Normal operation
    #[default]
    Info,
    /// Suspicious condition
    Warning,
    /// Runtime error
    Error,
    /// The process is about to go down
    Fatal,
}

impl Level {
    /// Short uppercase label used when rendering messages.
    pub const fn label(self) -> &'static str {
        match self {
            Level::Trace => "TRACE",
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warning => "WARN",
            Level::Error => "ERROR",
            Level::Fatal => "FATAL",
        }
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

impl From<logwise::Level> for Level {
    fn from(level: logwise::Level) -> Self {
        match level {
            logwise::Level::DebugInternal => Level::Debug,
            logwise::Level::Info => Level::Info,
            logwise::Level::Warning => Level::Warning,
            logwise::Level::Error => Level::Error,
            logwise::Level::Panic => Level::Fatal,
            //logwise adds levels from time to time
            _ => Level::Info,
        }
    }
}

impl From<Level> for logwise::Level {
    fn from(level: Level) -> Self {
        match level {
            Level::Trace | Level::Debug => logwise::Level::DebugInternal,
            Level::Info => logwise::Level::Info,
            Level::Warning => logwise::Level::Warning,
            Level::Error => logwise::Level::Error,
            Level::Fatal => logwise::Level::Panic,
        }
    }
}

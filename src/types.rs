//! Shared types used across the engine.

use std::fmt;
use std::sync::Arc;

/// Severity levels for the per-node message channel.
///
/// Front-ends attach a [`LogCallback`] to surface per-node log lines; the
/// engine also mirrors every message into `tracing` at the matching level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogSeverity {
    Trace,
    Debug,
    Info,
    Warning,
    Error,
    Fatal,
}

impl fmt::Display for LogSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogSeverity::Trace => "trace",
            LogSeverity::Debug => "debug",
            LogSeverity::Info => "info",
            LogSeverity::Warning => "warning",
            LogSeverity::Error => "error",
            LogSeverity::Fatal => "fatal",
        };
        f.write_str(s)
    }
}

/// Pluggable log-message callback: `(severity, message, originating node's
/// full tree name)`. Propagated from parent to child at `add_child` time.
pub type LogCallback = Arc<dyn Fn(LogSeverity, &str, &str) + Send + Sync>;

/// Smoothed processing statistics for one node.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ProcessStats {
    /// Number of completed passes through this node.
    pub passes: u64,
    /// Rolling mean of per-call duration in milliseconds (window of 10).
    pub avg_ms: f64,
}

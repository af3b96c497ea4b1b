//! # Event Log
//!
//! Capped ring of user-visible log entries. Entries describe what happened to
//! the link (connects, drops, fallback, samples); they are never used as data.

use chrono::{DateTime, Local};
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;

/// Default number of entries kept.
pub const DEFAULT_LOG_CAPACITY: usize = 50;

/// Severity of a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        f.write_str(name)
    }
}

/// A single log entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEntry {
    pub time: DateTime<Local>,
    pub severity: Severity,
    pub message: String,
}

impl LogEntry {
    /// Create an entry stamped with the current local time.
    pub fn now(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            time: Local::now(),
            severity,
            message: message.into(),
        }
    }
}

/// Append-only ring holding the most recent entries.
#[derive(Debug, Clone)]
pub struct LogRing {
    capacity: usize,
    entries: VecDeque<LogEntry>,
}

impl LogRing {
    /// Create an empty ring. A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity + 1),
        }
    }

    /// Append an entry, evicting the oldest one when full.
    pub fn push(&mut self, entry: LogEntry) {
        self.entries.push_back(entry);
        if self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    /// Entries, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    /// Most recent entry.
    pub fn last(&self) -> Option<&LogEntry> {
        self.entries.back()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for LogRing {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_never_exceeds_capacity() {
        let mut ring = LogRing::default();
        for i in 0..51 {
            ring.push(LogEntry::now(Severity::Info, format!("entry {}", i)));
            assert!(ring.len() <= 50);
        }

        assert_eq!(ring.len(), 50);
        assert!(ring.iter().all(|e| e.message != "entry 0"));
        assert_eq!(ring.iter().next().map(|e| e.message.as_str()), Some("entry 1"));
        assert_eq!(ring.last().map(|e| e.message.as_str()), Some("entry 50"));
    }

    #[test]
    fn test_ring_keeps_order() {
        let mut ring = LogRing::new(3);
        ring.push(LogEntry::now(Severity::Info, "a"));
        ring.push(LogEntry::now(Severity::Warning, "b"));
        let messages: Vec<_> = ring.iter().map(|e| e.message.clone()).collect();
        assert_eq!(messages, vec!["a", "b"]);
        assert_eq!(ring.last().map(|e| e.severity), Some(Severity::Warning));
    }

    #[test]
    fn test_zero_capacity_raised_to_one() {
        let mut ring = LogRing::new(0);
        ring.push(LogEntry::now(Severity::Info, "a"));
        ring.push(LogEntry::now(Severity::Info, "b"));
        assert_eq!(ring.len(), 1);
        assert_eq!(ring.capacity(), 1);
    }

    #[test]
    fn test_severity_display() {
        assert_eq!(Severity::Warning.to_string(), "warning");
        assert_eq!(serde_json::to_string(&Severity::Error).unwrap(), "\"error\"");
    }
}

//! Bounded, newest-first record of executed requests.

use std::collections::VecDeque;
use std::fmt;

use crate::engine::{Request, RequestOutcome};

/// One executed request with its outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    /// Position in the stream of executed requests, starting at 1.
    pub sequence: u64,
    /// Request as it was executed.
    pub request: Request,
    /// What the engine did.
    pub outcome: RequestOutcome,
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} [{}] {} {} {}",
            self.sequence,
            if self.outcome.hit { "hit" } else { "miss" },
            self.request.requester,
            self.request.operation,
            self.request.address
        )?;
        if let Some(home) = self.outcome.home {
            write!(f, " (home {home})")?;
        }
        Ok(())
    }
}

/// Most recent requests, newest first, capped at a fixed capacity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestLog {
    entries: VecDeque<LogEntry>,
    capacity: usize,
}

impl RequestLog {
    /// Creates an empty log keeping at most `capacity` entries.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Adds `entry` at the front, dropping the oldest entry when full.
    pub fn record(&mut self, entry: LogEntry) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.len() == self.capacity {
            self.entries.pop_back();
        }
        self.entries.push_front(entry);
    }

    /// Iterates newest first.
    pub fn iter(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    /// Most recent entry.
    #[must_use]
    pub fn latest(&self) -> Option<&LogEntry> {
        self.entries.front()
    }

    /// Number of entries held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when nothing has been recorded since the last clear.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum number of entries kept.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drops every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

//! # Notification Log
//!
//! Process-wide, in-memory log of user-facing notifications (tracking
//! errors, trip errors, camera disconnects). The log is capped; once full
//! the oldest entry is evicted.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;

pub const DEFAULT_CAPACITY: usize = 100;

static LOG: Mutex<Option<NotificationLog>> = Mutex::new(None);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: u64,
    pub created_at: DateTime<Utc>,
    pub severity: Severity,
    pub source: String,
    pub message: String,
}

/// Bounded, oldest-first notification buffer.
#[derive(Debug)]
pub struct NotificationLog {
    capacity: usize,
    next_id: u64,
    entries: VecDeque<Notification>,
}

impl NotificationLog {
    /// A zero capacity falls back to [`DEFAULT_CAPACITY`].
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = if capacity == 0 { DEFAULT_CAPACITY } else { capacity };
        Self { capacity, next_id: 1, entries: VecDeque::with_capacity(capacity) }
    }

    pub fn append(
        &mut self, severity: Severity, source: impl Into<String>, message: impl Into<String>,
    ) -> u64 {
        let id = self.next_id;
        self.next_id += 1;

        self.entries.push_back(Notification {
            id,
            created_at: Utc::now(),
            severity,
            source: source.into(),
            message: message.into(),
        });
        self.evict();
        id
    }

    #[must_use]
    pub fn read(&self) -> Vec<Notification> {
        self.entries.iter().cloned().collect()
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    fn resize(&mut self, capacity: usize) {
        self.capacity = if capacity == 0 { DEFAULT_CAPACITY } else { capacity };
        self.evict();
    }

    fn evict(&mut self) {
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }
}

/// Initialise the process-wide log. Re-initialising keeps the newest entries
/// that fit the new capacity.
pub fn init(capacity: usize) {
    let mut log = LOG.lock().unwrap_or_else(PoisonError::into_inner);
    match log.as_mut() {
        Some(existing) => existing.resize(capacity),
        None => *log = Some(NotificationLog::new(capacity)),
    }
}

/// Append to the process-wide log, initialising it with the default capacity
/// if needed. Returns the notification id.
pub fn append(severity: Severity, source: impl Into<String>, message: impl Into<String>) -> u64 {
    let mut log = LOG.lock().unwrap_or_else(PoisonError::into_inner);
    log.get_or_insert_with(|| NotificationLog::new(DEFAULT_CAPACITY)).append(severity, source, message)
}

/// Contents of the process-wide log, oldest first.
#[must_use]
pub fn read() -> Vec<Notification> {
    LOG.lock().unwrap_or_else(PoisonError::into_inner).as_ref().map(NotificationLog::read).unwrap_or_default()
}

/// Discard the process-wide log.
pub fn teardown() {
    LOG.lock().unwrap_or_else(PoisonError::into_inner).take();
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn evicts_oldest() {
        let mut log = NotificationLog::new(3);
        for i in 0..5 {
            log.append(Severity::Info, "test", format!("message {i}"));
        }

        let messages: Vec<_> = log.read().into_iter().map(|n| n.message).collect();
        assert_eq!(messages, vec!["message 2", "message 3", "message 4"]);
        assert_eq!(log.read()[0].id, 3);
    }

    #[test]
    fn zero_capacity_uses_default() {
        assert_eq!(NotificationLog::new(0).capacity(), DEFAULT_CAPACITY);
    }

    // The global log is exercised in one test so parallel tests cannot race.
    #[test]
    fn global_lifecycle() {
        teardown();
        assert!(read().is_empty());

        // lazily initialised at default capacity
        for i in 0..=DEFAULT_CAPACITY {
            append(Severity::Warning, "poller", format!("error {i}"));
        }
        let entries = read();
        assert_eq!(entries.len(), DEFAULT_CAPACITY);
        assert_eq!(entries[0].message, "error 1");

        init(2);
        let entries = read();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].message, format!("error {DEFAULT_CAPACITY}"));

        teardown();
        assert!(read().is_empty());
    }
}

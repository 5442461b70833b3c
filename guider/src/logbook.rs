//! Operator-visible log of messages and pulses.
//!
//! Both buffers are bounded rings; the oldest entries fall off first. Every
//! message is also forwarded to the `log` facade.

use log::Level;
use serde::Serialize;
use shared::Timestamp;
use std::collections::VecDeque;

pub const DEFAULT_CAPACITY: usize = 32;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEntry {
    pub timestamp: Timestamp,
    #[serde(serialize_with = "serialize_level")]
    pub level: Level,
    pub message: String,
}

fn serialize_level<S: serde::Serializer>(level: &Level, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(level.as_str())
}

/// One guidance cycle's error, for the error graph.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PulseRecord {
    pub timestamp: Timestamp,
    /// Error along the RA axis (px)
    pub ra_px: f64,
    /// Error along the DEC axis (px)
    pub dec_px: f64,
    /// Total pulse since the shutter last closed (ms)
    pub pulse_sum: f64,
    pub shutter_open: bool,
}

#[derive(Debug, Clone)]
pub struct Logbook {
    capacity: usize,
    messages: VecDeque<LogEntry>,
    pulses: VecDeque<PulseRecord>,
}

impl Default for Logbook {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl Logbook {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            messages: VecDeque::with_capacity(capacity),
            pulses: VecDeque::with_capacity(capacity),
        }
    }

    pub fn record(&mut self, timestamp: Timestamp, level: Level, message: impl Into<String>) {
        let message = message.into();
        log::log!(level, "[{timestamp}] {message}");
        if self.messages.len() == self.capacity {
            self.messages.pop_front();
        }
        self.messages.push_back(LogEntry {
            timestamp,
            level,
            message,
        });
    }

    pub fn info(&mut self, timestamp: Timestamp, message: impl Into<String>) {
        self.record(timestamp, Level::Info, message);
    }

    pub fn warn(&mut self, timestamp: Timestamp, message: impl Into<String>) {
        self.record(timestamp, Level::Warn, message);
    }

    pub fn error(&mut self, timestamp: Timestamp, message: impl Into<String>) {
        self.record(timestamp, Level::Error, message);
    }

    pub fn record_pulse(&mut self, record: PulseRecord) {
        if self.pulses.len() == self.capacity {
            self.pulses.pop_front();
        }
        self.pulses.push_back(record);
    }

    /// Messages, oldest first.
    pub fn messages(&self) -> impl Iterator<Item = &LogEntry> {
        self.messages.iter()
    }

    pub fn pulses(&self) -> impl Iterator<Item = &PulseRecord> {
        self.pulses.iter()
    }

    pub fn last_message(&self) -> Option<&LogEntry> {
        self.messages.back()
    }

    /// True if any retained message starts with `prefix`.
    pub fn contains_prefix(&self, prefix: &str) -> bool {
        self.messages.iter().any(|m| m.message.starts_with(prefix))
    }
}

//! Progress and diagnostic events
//!
//! The engine reports everything an observer needs through a single injected
//! [`EventSink`]. An event is a `(kind, payload)` pair; the kinds are fixed:
//!
//! | Kind | Payload |
//! |------|---------|
//! | `progress` | number in `0..=100` |
//! | `count` | discovery summary text |
//! | `complete` | `true` |
//! | `error` | diagnostic text |
//! | `details` | diagnostic text |
//! | `warn` | diagnostic text |
//! | `data` | structured data (queue stats, failed downloads) |

mod sink;

pub use sink::{channel, ChannelSink, EventReporter, FanoutSink, NullSink, TracingSink};

use crate::downloads::{FailedRecord, QueueStats};
use chrono::{DateTime, Utc};
use std::fmt;

/// The fixed set of event kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Progress,
    Count,
    Complete,
    Error,
    Details,
    Warn,
    Data,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Progress => "progress",
            Self::Count => "count",
            Self::Complete => "complete",
            Self::Error => "error",
            Self::Details => "details",
            Self::Warn => "warn",
            Self::Data => "data",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Payload carried by an event
#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload {
    Number(f64),
    Flag(bool),
    Text(String),
    Stats(QueueStats),
    Failures(Vec<FailedRecord>),
}

impl EventPayload {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for EventPayload {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for EventPayload {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl fmt::Display for EventPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{:.1}", n),
            Self::Flag(b) => write!(f, "{}", b),
            Self::Text(s) => write!(f, "{}", s),
            Self::Stats(stats) => write!(f, "{}", stats),
            Self::Failures(records) => {
                write!(f, "{} failed download(s)", records.len())?;
                for record in records {
                    write!(
                        f,
                        "; {} ({}) after {} attempt(s): {}",
                        record.id, record.url, record.retries, record.error
                    )?;
                }
                Ok(())
            }
        }
    }
}

/// An emitted event with its timestamp
#[derive(Debug, Clone)]
pub struct Event {
    pub kind: EventKind,
    pub payload: EventPayload,
    pub at: DateTime<Utc>,
}

impl Event {
    pub fn new(kind: EventKind, payload: EventPayload) -> Self {
        Self {
            kind,
            payload,
            at: Utc::now(),
        }
    }
}

/// One-way notification channel owned by the caller
///
/// Implementations must not block; they are called from the crawl path and
/// from download workers.
pub trait EventSink: Send + Sync {
    fn emit(&self, kind: EventKind, payload: EventPayload);
}

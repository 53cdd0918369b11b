use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

/// A single log entry as seen by the handler.
///
/// Only `context` is ever rewritten on the way to the sink; every other
/// field is forwarded untouched.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogRecord {
    pub timestamp: DateTime<Utc>,
    pub channel: String,
    pub level: String,
    pub message: String,
    pub context: Map<String, Value>,
    pub extra: Map<String, Value>,
    pub formatted: Option<String>,
}

impl LogRecord {
    /// Build a record stamped with the current time and empty context.
    pub fn new(channel: impl Into<String>, level: impl Into<String>, message: impl Into<String>) -> Self {
        LogRecord {
            timestamp: Utc::now(),
            channel: channel.into(),
            level: level.into(),
            message: message.into(),
            context: Map::new(),
            extra: Map::new(),
            formatted: None,
        }
    }

    /// Insert a context entry, builder style.
    pub fn context_entry(mut self, key: impl Into<String>, value: Value) -> Self {
        self.context.insert(key.into(), value);
        self
    }

    /// Rebuild the record around a rewritten context.
    pub fn with_context(self, context: Map<String, Value>) -> Self {
        LogRecord { context, ..self }
    }
}

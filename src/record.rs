use chrono::Utc;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;

/// Canonical severity of a shipped record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    #[default]
    Debug,
    Info,
    Warn,
    Error,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&tracing::Level> for Level {
    fn from(level: &tracing::Level) -> Self {
        match *level {
            tracing::Level::ERROR => Level::Error,
            tracing::Level::WARN => Level::Warn,
            tracing::Level::INFO => Level::Info,
            _ => Level::Debug,
        }
    }
}

/// Normalized record produced by [`crate::normalize::normalize`].
///
/// `metrics` only ever holds numbers. `extra` carries every source field
/// not claimed by one of the named fields and is flattened into the top
/// level on the wire, so a key never appears twice.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HybridRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub level: Level,
    pub metrics: Map<String, Value>,
    pub context: Map<String, Value>,
    #[serde(rename = "_annotation", skip_serializing_if = "Option::is_none")]
    pub annotation: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl HybridRecord {
    /// Record with no metrics, context or extra fields.
    pub fn bare(message: Option<String>, level: Level) -> Self {
        Self {
            message,
            level,
            metrics: Map::new(),
            context: Map::new(),
            annotation: None,
            extra: Map::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Json,
    Text,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum EntryPayload {
    Json(HybridRecord),
    Text(String),
}

/// One unit queued by the dispatcher and shipped inside a batch.
///
/// Serializes to `{"type": "json"|"text", "payload": .., "timestamp": ms}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEntry {
    #[serde(rename = "type")]
    kind: EntryKind,
    payload: EntryPayload,
    timestamp: Option<i64>,
}

impl LogEntry {
    pub fn json(record: HybridRecord) -> Self {
        Self {
            kind: EntryKind::Json,
            payload: EntryPayload::Json(record),
            timestamp: None,
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: EntryKind::Text,
            payload: EntryPayload::Text(text.into()),
            timestamp: None,
        }
    }

    /// Set an explicit timestamp in milliseconds since epoch.
    pub fn with_timestamp(mut self, timestamp_ms: i64) -> Self {
        self.timestamp = Some(timestamp_ms);
        self
    }

    pub fn kind(&self) -> EntryKind {
        self.kind
    }

    pub fn payload(&self) -> &EntryPayload {
        &self.payload
    }

    pub fn timestamp(&self) -> Option<i64> {
        self.timestamp
    }

    /// Assign the current time unless a timestamp was supplied.
    pub(crate) fn stamp_if_missing(&mut self) {
        if self.timestamp.is_none() {
            self.timestamp = Some(now_millis());
        }
    }

    /// Flat object used for console passthrough: the hybrid record (or the
    /// raw text under `message`) plus `timestamp`.
    pub fn passthrough_value(&self) -> Value {
        let mut object = match &self.payload {
            EntryPayload::Json(record) => match serde_json::to_value(record) {
                Ok(Value::Object(map)) => map,
                _ => Map::new(),
            },
            EntryPayload::Text(text) => {
                let mut map = Map::new();
                map.insert("message".to_string(), Value::String(text.clone()));
                map
            }
        };
        object.insert(
            "timestamp".to_string(),
            Value::from(self.timestamp.unwrap_or_else(now_millis)),
        );
        Value::Object(object)
    }
}

pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_entry_wire_shape() {
        let mut record = HybridRecord::bare(Some("m".into()), Level::Warn);
        record.metrics.insert("cpu".into(), json!(10));
        record.extra.insert("service".into(), json!("api"));

        let entry = LogEntry::json(record).with_timestamp(1_700_000_000_000);
        let value = serde_json::to_value(&entry).unwrap();

        assert_eq!(
            value,
            json!({
                "type": "json",
                "payload": {
                    "message": "m",
                    "level": "warn",
                    "metrics": {"cpu": 10},
                    "context": {},
                    "service": "api"
                },
                "timestamp": 1_700_000_000_000i64
            })
        );
    }

    #[test]
    fn text_entry_payload_is_raw_string() {
        let entry = LogEntry::text("started").with_timestamp(5);
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value, json!({"type": "text", "payload": "started", "timestamp": 5}));
    }

    #[test]
    fn absent_message_is_not_serialized() {
        let record = HybridRecord::bare(None, Level::Debug);
        let value = serde_json::to_value(&record).unwrap();
        assert!(value.get("message").is_none());
        assert!(value.get("_annotation").is_none());
    }

    #[test]
    fn stamping_keeps_supplied_timestamp() {
        let mut entry = LogEntry::text("x").with_timestamp(42);
        entry.stamp_if_missing();
        assert_eq!(entry.timestamp(), Some(42));

        let mut entry = LogEntry::text("y");
        entry.stamp_if_missing();
        assert!(entry.timestamp().unwrap() > 0);
    }

    #[test]
    fn passthrough_flattens_record_with_timestamp() {
        let entry = LogEntry::text("hello").with_timestamp(9);
        assert_eq!(entry.passthrough_value(), json!({"message": "hello", "timestamp": 9}));
    }

    #[test]
    fn tracing_levels_map_down() {
        assert_eq!(Level::from(&tracing::Level::TRACE), Level::Debug);
        assert_eq!(Level::from(&tracing::Level::WARN), Level::Warn);
        assert_eq!(Level::from(&tracing::Level::ERROR), Level::Error);
    }
}

//! Reshapes arbitrary log payloads into a [`HybridRecord`].
//!
//! Everything here is pure: no I/O, no state, and no failure path.
//! Malformed or wrong-typed input degrades to empty containers.

use crate::record::{HybridRecord, Level};
use serde_json::{Map, Value};

/// Top-level keys that are never treated as metrics by the heuristic scan.
const NON_METRIC_FIELDS: &[&str] = &[
    "id",
    "pid",
    "port",
    "status",
    "code",
    "line",
    "hostname",
    "message",
    "msg",
    "level",
    "error",
    "err",
    "exception",
    "stack",
    "trace_id",
    "traceId",
    "user_id",
    "userId",
    "request_id",
    "requestId",
    "correlation_id",
    "correlationId",
    "span_id",
    "spanId",
    "session_id",
    "sessionId",
];

const METRIC_SUFFIXES: &[&str] = &["_ms", "_count", "_size"];

const METRIC_MARKERS: &[&str] = &["cpu", "memory", "latency", "response_time", "duration"];

const TIME_MARKERS: &[&str] = &["timestamp", "time", "date"];

/// Metric marker that would otherwise be rejected as time-like.
const TIME_EXEMPT_MARKER: &str = "response_time";

/// Correlation identifiers lifted into `context`, as (snake, camel).
const CONTEXT_FIELDS: &[(&str, &str)] = &[
    ("trace_id", "traceId"),
    ("user_id", "userId"),
    ("request_id", "requestId"),
    ("correlation_id", "correlationId"),
    ("span_id", "spanId"),
    ("session_id", "sessionId"),
];

/// Keys owned by the record itself.
const RECORD_KEYS: &[&str] = &["message", "level", "metrics", "context", "_annotation"];

/// Prefix for a record-owned source key whose value was not used to build
/// the record, e.g. a numeric `level` becomes `original_level`.
const DISPLACED_PREFIX: &str = "original_";

/// Canonicalize any level spelling. Unknown or absent levels become debug.
pub fn normalize_level(level: Option<&str>) -> Level {
    let Some(level) = level else {
        return Level::Debug;
    };
    match level.trim().to_ascii_lowercase().as_str() {
        "debug" | "dbg" | "trace" => Level::Debug,
        "info" | "information" | "log" => Level::Info,
        "warn" | "warning" | "wrn" => Level::Warn,
        "error" | "err" | "exception" | "fatal" | "critical" => Level::Error,
        _ => Level::Debug,
    }
}

/// Extract numeric metrics from a flat field map.
///
/// A `metrics` object is authoritative: its numeric entries are copied and
/// nothing else is inspected.
pub fn extract_metrics(fields: &Map<String, Value>) -> Map<String, Value> {
    metrics_with_claims(fields).0
}

/// Extract correlation context from a flat field map.
///
/// A `context` object is returned verbatim.
pub fn extract_context(fields: &Map<String, Value>) -> Map<String, Value> {
    context_with_claims(fields).0
}

/// Build the hybrid record for one log call.
///
/// `extra` wins over `payload` on key collisions. The message comes from
/// the explicit argument, then `message`, then `msg`; it is never invented.
/// Source keys that were not used keep their value: record-owned names
/// (`message`, `level`, `metrics`, `context`) move under
/// [`DISPLACED_PREFIX`], everything else is copied as is.
pub fn normalize(
    message: Option<&str>,
    level: Option<&str>,
    payload: &Value,
    extra: &Map<String, Value>,
) -> HybridRecord {
    let mut merged = match payload {
        Value::Object(map) => map.clone(),
        _ => Map::new(),
    };
    for (key, value) in extra {
        merged.insert(key.clone(), value.clone());
    }

    let mut resolved_keys: Vec<&str> = Vec::new();

    let message = match message {
        Some(m) => Some(m.to_string()),
        None => ["message", "msg"].iter().find_map(|key| {
            let text = merged.get(*key)?.as_str()?;
            resolved_keys.push(*key);
            Some(text.to_string())
        }),
    };

    let level = match level {
        Some(l) => normalize_level(Some(l)),
        None => {
            let source = merged.get("level").and_then(Value::as_str);
            if source.is_some() {
                resolved_keys.push("level");
            }
            normalize_level(source)
        }
    };

    let (metrics, metric_claims) = metrics_with_claims(&merged);
    let (context, context_claims) = context_with_claims(&merged);
    if matches!(merged.get("metrics"), Some(Value::Object(_))) {
        resolved_keys.push("metrics");
    }
    if matches!(merged.get("context"), Some(Value::Object(_))) {
        resolved_keys.push("context");
    }
    if merged.contains_key("_annotation") {
        resolved_keys.push("_annotation");
    }

    let mut extra = Map::new();
    for (key, value) in &merged {
        let key = key.as_str();
        if resolved_keys.contains(&key)
            || metric_claims.iter().any(|c| c == key)
            || context_claims.contains(&key)
        {
            continue;
        }
        if RECORD_KEYS.contains(&key) {
            extra
                .entry(format!("{}{}", DISPLACED_PREFIX, key))
                .or_insert_with(|| value.clone());
        } else {
            extra.insert(key.to_string(), value.clone());
        }
    }

    HybridRecord {
        message,
        level,
        metrics,
        context,
        annotation: merged.get("_annotation").cloned(),
        extra,
    }
}

fn metrics_with_claims(fields: &Map<String, Value>) -> (Map<String, Value>, Vec<String>) {
    if let Some(Value::Object(explicit)) = fields.get("metrics") {
        let metrics = explicit
            .iter()
            .filter(|(_, value)| value.is_number())
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        return (metrics, Vec::new());
    }

    let metrics: Map<String, Value> = fields
        .iter()
        .filter(|(key, value)| value.is_number() && looks_like_metric(key))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    let claims = metrics.keys().cloned().collect();
    (metrics, claims)
}

fn looks_like_metric(key: &str) -> bool {
    if NON_METRIC_FIELDS.contains(&key) || RECORD_KEYS.contains(&key) {
        return false;
    }
    let lower = key.to_ascii_lowercase();
    if TIME_MARKERS.iter().any(|marker| lower.contains(marker))
        && !lower.contains(TIME_EXEMPT_MARKER)
    {
        return false;
    }
    METRIC_SUFFIXES.iter().any(|suffix| lower.ends_with(suffix))
        || METRIC_MARKERS.iter().any(|marker| lower.contains(marker))
}

fn context_with_claims(fields: &Map<String, Value>) -> (Map<String, Value>, Vec<&'static str>) {
    if let Some(Value::Object(explicit)) = fields.get("context") {
        return (explicit.clone(), Vec::new());
    }

    let mut context = Map::new();
    let mut claims = Vec::new();
    for (snake, camel) in CONTEXT_FIELDS {
        if let Some(value) = fields.get(*snake) {
            context.insert(snake.to_string(), value.clone());
            claims.push(*snake);
        } else if let Some(value) = fields.get(*camel) {
            context.insert(snake.to_string(), value.clone());
            claims.push(*camel);
        }
    }
    (context, claims)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn level_synonyms() {
        for spelling in ["ERR", "error", "fatal", "CRITICAL", "Exception"] {
            assert_eq!(normalize_level(Some(spelling)), Level::Error, "{}", spelling);
        }
        assert_eq!(normalize_level(Some("Warning")), Level::Warn);
        assert_eq!(normalize_level(Some("wrn")), Level::Warn);
        assert_eq!(normalize_level(Some("LOG")), Level::Info);
        assert_eq!(normalize_level(Some("information")), Level::Info);
        assert_eq!(normalize_level(Some("trace")), Level::Debug);
        assert_eq!(normalize_level(Some("verbose")), Level::Debug);
        assert_eq!(normalize_level(None), Level::Debug);
    }

    #[test]
    fn metrics_object_is_authoritative() {
        let fields = obj(json!({
            "metrics": {"cpu": 0.5, "label": "x", "queue_size": 3},
            "latency_ms": 12
        }));
        assert_eq!(extract_metrics(&fields), obj(json!({"cpu": 0.5, "queue_size": 3})));
    }

    #[test]
    fn heuristic_metrics_by_suffix_and_marker() {
        let fields = obj(json!({
            "db_latency": 4,
            "render_ms": 16,
            "retry_COUNT": 2,
            "payload_size": 512,
            "memoryUsed": 1024,
            "response_time": 30,
            "cpu": 10,
            "other": 7,
            "duration": "slow"
        }));
        let metrics = extract_metrics(&fields);
        assert_eq!(
            metrics,
            obj(json!({
                "db_latency": 4,
                "render_ms": 16,
                "retry_COUNT": 2,
                "payload_size": 512,
                "memoryUsed": 1024,
                "response_time": 30,
                "cpu": 10
            }))
        );
    }

    #[test]
    fn time_like_and_identifier_keys_are_not_metrics() {
        let fields = obj(json!({
            "timestamp_ms": 1_700_000_000_000i64,
            "start_time_ms": 1,
            "update_date_count": 3,
            "user_id": 99,
            "request_id": 5
        }));
        assert!(extract_metrics(&fields).is_empty());
    }

    #[test]
    fn context_object_is_verbatim() {
        let fields = obj(json!({"context": {"tenant": "a"}, "trace_id": "t"}));
        assert_eq!(extract_context(&fields), obj(json!({"tenant": "a"})));
    }

    #[test]
    fn context_from_known_identifiers() {
        let fields = obj(json!({
            "traceId": "t1",
            "user_id": 42,
            "spanId": "s",
            "sessionId": "sess",
            "unrelated": true
        }));
        assert_eq!(
            extract_context(&fields),
            obj(json!({"trace_id": "t1", "user_id": 42, "span_id": "s", "session_id": "sess"}))
        );
    }

    #[test]
    fn snake_spelling_wins_over_camel() {
        let fields = obj(json!({"trace_id": "snake", "traceId": "camel"}));
        assert_eq!(extract_context(&fields), obj(json!({"trace_id": "snake"})));
    }

    #[test]
    fn hybrid_record_without_duplicates() {
        let payload = json!({"cpu": 10, "trace_id": "abc", "message": "m"});
        let record = normalize(None, Some("warn"), &payload, &Map::new());

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(
            value,
            json!({
                "message": "m",
                "level": "warn",
                "metrics": {"cpu": 10},
                "context": {"trace_id": "abc"}
            })
        );
    }

    #[test]
    fn numeric_cpu_always_lands_in_metrics() {
        for cpu in [json!(0), json!(3.25), json!(-1), json!(1_000_000)] {
            let payload = json!({"cpu": cpu.clone(), "host": "a"});
            let record = normalize(None, None, &payload, &Map::new());
            assert_eq!(record.metrics.get("cpu"), Some(&cpu));
            assert!(!record.extra.contains_key("cpu"));
        }
    }

    #[test]
    fn extra_fields_win_on_collision() {
        let payload = json!({"service": "payload", "msg": "from msg"});
        let extra = obj(json!({"service": "extra"}));
        let record = normalize(None, None, &payload, &extra);
        assert_eq!(record.message.as_deref(), Some("from msg"));
        assert_eq!(record.extra.get("service"), Some(&json!("extra")));
        assert!(!record.extra.contains_key("msg"));
    }

    #[test]
    fn explicit_message_beats_payload() {
        let payload = json!({"message": "payload", "msg": "short"});
        let record = normalize(Some("explicit"), None, &payload, &Map::new());
        assert_eq!(record.message.as_deref(), Some("explicit"));
        assert!(!record.extra.contains_key("message"));
        assert_eq!(record.extra.get("original_message"), Some(&json!("payload")));
        assert_eq!(record.extra.get("msg"), Some(&json!("short")));
    }

    #[test]
    fn message_is_never_invented() {
        let record = normalize(None, None, &json!({"count": "x"}), &Map::new());
        assert_eq!(record.message, None);
    }

    #[test]
    fn level_falls_back_to_payload_field() {
        let record = normalize(None, None, &json!({"level": "FATAL"}), &Map::new());
        assert_eq!(record.level, Level::Error);
        assert!(!record.extra.contains_key("level"));
    }

    #[test]
    fn annotation_is_carried_through() {
        let payload = json!({"_annotation": {"note": "x"}, "message": "m"});
        let record = normalize(None, None, &payload, &Map::new());
        assert_eq!(record.annotation, Some(json!({"note": "x"})));
        assert!(!record.extra.contains_key("_annotation"));
    }

    #[test]
    fn wrong_typed_input_degrades_to_empty() {
        let record = normalize(None, Some("info"), &json!([1, 2, 3]), &Map::new());
        assert_eq!(record, HybridRecord::bare(None, Level::Info));

        let payload = json!({"metrics": "nope", "context": 5, "latency_ms": 3});
        let record = normalize(None, None, &payload, &Map::new());
        assert_eq!(record.metrics, obj(json!({"latency_ms": 3})));
        assert!(record.context.is_empty());
        assert!(!record.extra.contains_key("metrics"));
        assert_eq!(record.extra.get("original_metrics"), Some(&json!("nope")));
        assert_eq!(record.extra.get("original_context"), Some(&json!(5)));
    }

    #[test]
    fn unusable_message_and_level_are_kept() {
        let payload = json!({"message": {"code": 7}, "level": 30, "route": "/a"});
        let record = normalize(None, None, &payload, &Map::new());

        assert_eq!(record.message, None);
        assert_eq!(record.level, Level::Debug);
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(
            value,
            json!({
                "level": "debug",
                "metrics": {},
                "context": {},
                "original_message": {"code": 7},
                "original_level": 30,
                "route": "/a"
            })
        );
    }

    #[test]
    fn explicit_level_keeps_the_source_level() {
        let payload = json!({"level": "error", "message": "m"});
        let record = normalize(None, Some("info"), &payload, &Map::new());
        assert_eq!(record.level, Level::Info);
        assert_eq!(record.extra.get("original_level"), Some(&json!("error")));
        assert!(!record.extra.contains_key("message"));
    }

    #[test]
    fn unclaimed_fields_are_preserved() {
        let payload = json!({"route": "/a", "status": 500, "nested": {"k": 1}});
        let record = normalize(None, None, &payload, &Map::new());
        assert_eq!(record.extra, obj(payload));
    }
}

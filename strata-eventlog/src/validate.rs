//! Caller input for ingest and its validation.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strata_domain::CURSOR_DELIMITER;

use crate::error::IngestError;

/// An event as submitted by a producer, before sequencing
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventInput {
    /// Target stream
    #[serde(default)]
    pub stream_id: String,

    /// Event type
    #[serde(default)]
    pub event_type: String,

    /// Payload; `null` or absent counts as missing
    #[serde(default)]
    pub payload: serde_json::Value,

    /// Optional string metadata
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,

    /// Deduplication key, scoped to the stream
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,

    /// Business time
    #[serde(default)]
    pub occurred_at: Option<DateTime<Utc>>,

    /// Payload schema version; non-positive becomes 1
    #[serde(default)]
    pub schema_version: i32,
}

impl EventInput {
    /// Idempotency key, treating an empty string as absent
    pub fn idempotency_key(&self) -> Option<&str> {
        self.idempotency_key.as_deref().filter(|key| !key.is_empty())
    }
}

/// Check the fields every event needs.
///
/// # Errors
/// `IngestError::Validation` naming each missing field, or a stream id
/// containing the cursor delimiter (its pages could not be resumed).
pub fn validate_event_input(input: &EventInput) -> Result<(), IngestError> {
    let mut missing = Vec::new();
    if input.stream_id.is_empty() {
        missing.push("stream_id");
    }
    if input.event_type.is_empty() {
        missing.push("event_type");
    }
    if input.payload.is_null() {
        missing.push("payload");
    }
    if input.occurred_at.is_none() {
        missing.push("occurred_at");
    }

    if !missing.is_empty() {
        return Err(IngestError::Validation(format!(
            "missing required fields: {}",
            missing.join(", ")
        )));
    }
    if input.stream_id.contains(CURSOR_DELIMITER) {
        return Err(IngestError::Validation(format!(
            "stream_id must not contain '{}'",
            CURSOR_DELIMITER
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn valid() -> EventInput {
        EventInput {
            stream_id: "orders-42".to_string(),
            event_type: "order_created".to_string(),
            payload: json!({"order_id": "o-1"}),
            occurred_at: Some(Utc::now()),
            ..EventInput::default()
        }
    }

    #[test]
    fn test_valid_input_passes() {
        assert!(validate_event_input(&valid()).is_ok());
    }

    #[test]
    fn test_each_required_field_is_checked() {
        let cases: Vec<(&str, Box<dyn Fn(&mut EventInput)>)> = vec![
            ("stream_id", Box::new(|i| i.stream_id.clear())),
            ("event_type", Box::new(|i| i.event_type.clear())),
            ("payload", Box::new(|i| i.payload = serde_json::Value::Null)),
            ("occurred_at", Box::new(|i| i.occurred_at = None)),
        ];

        for (field, mutate) in cases {
            let mut input = valid();
            mutate(&mut input);

            let err = validate_event_input(&input).unwrap_err();
            assert!(err.is_validation());
            assert!(err.to_string().contains(field), "{field}: {err}");
        }
    }

    #[test]
    fn test_falsy_payloads_are_present() {
        for payload in [json!({}), json!([]), json!(0), json!(false), json!("")] {
            let input = EventInput { payload, ..valid() };
            assert!(validate_event_input(&input).is_ok());
        }
    }

    #[test]
    fn test_deserialize_missing_fields_defaults() {
        let input: EventInput =
            serde_json::from_str(r#"{"stream_id": "s-1", "event_type": "created"}"#).unwrap();

        assert!(input.payload.is_null());
        assert!(input.occurred_at.is_none());
        assert!(input.metadata.is_empty());
        assert!(validate_event_input(&input).is_err());
    }

    #[test]
    fn test_deserialize_converts_offsets_to_utc() {
        let input: EventInput = serde_json::from_str(
            r#"{"stream_id": "s-1", "event_type": "created", "payload": {"a": 1},
                "occurred_at": "2024-01-15T12:00:00+02:00"}"#,
        )
        .unwrap();

        assert_eq!(
            input.occurred_at.unwrap().to_rfc3339(),
            "2024-01-15T10:00:00+00:00"
        );
    }

    #[test]
    fn test_empty_idempotency_key_is_absent() {
        let input = EventInput {
            idempotency_key: Some(String::new()),
            ..valid()
        };
        assert_eq!(input.idempotency_key(), None);
    }

    #[test]
    fn test_stream_id_with_cursor_delimiter_is_rejected() {
        let input = EventInput {
            stream_id: "tenant:orders".to_string(),
            ..valid()
        };

        let err = validate_event_input(&input).unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().contains("stream_id"), "{err}");
    }
}

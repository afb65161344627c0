//! Keystroke batch validation
//!
//! Every batch passes through here before it reaches the event store. A
//! batch is accepted or rejected as a whole: all offending fields are
//! collected into one `ValidationErrors` so the client sees every problem
//! at once.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;

use crate::db::keystroke_events::CreateKeystrokeInput;
use crate::db::models::event_types;
use crate::error::{FieldError, StorageError, ValidationErrors};

/// Longest accepted key code (e.g. `ArrowLeft`, `MediaPlayPause`)
pub const MAX_KEY_CODE_CHARS: usize = 64;

/// Longest accepted character payload (a grapheme plus combining marks)
pub const MAX_CHARACTER_CHARS: usize = 16;

/// One event as received on the wire; nothing is trusted yet
///
/// Fields stay untyped JSON so a wrong type is reported per field instead
/// of failing the whole body.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeystrokeEventInput {
    #[serde(default)]
    pub event_type: Option<Value>,
    #[serde(default)]
    pub key_code: Option<Value>,
    #[serde(default)]
    pub character: Option<Value>,
    #[serde(default, alias = "timestampMs")]
    pub timestamp: Option<Value>,
    #[serde(default)]
    pub cursor_position: Option<Value>,
    #[serde(default)]
    pub sequence_number: Option<Value>,
}

/// A keystroke batch as received on the wire
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeystrokeBatchInput {
    #[serde(default)]
    pub document_id: Option<String>,
    /// Public identifier of the verification
    #[serde(default)]
    pub verification_id: Option<String>,
    #[serde(default)]
    pub events: Vec<KeystrokeEventInput>,
}

/// Owner named by a batch, as addressed by the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OwnerTarget {
    /// Internal document id
    Document(String),
    /// Public verification id
    Verification(String),
}

/// A batch that passed validation, events sorted by sequence number
#[derive(Debug, Clone)]
pub struct ValidatedBatch {
    pub target: OwnerTarget,
    pub events: Vec<CreateKeystrokeInput>,
}

impl ValidatedBatch {
    pub fn sequence_numbers(&self) -> Vec<i64> {
        self.events.iter().map(|e| e.sequence_number).collect()
    }
}

/// Validate a full ingestion batch, owner reference included
pub fn validate_batch(
    input: KeystrokeBatchInput,
    max_batch_size: usize,
) -> Result<ValidatedBatch, StorageError> {
    let mut errors = ValidationErrors::default();

    let document_id = non_blank(input.document_id);
    let verification_id = non_blank(input.verification_id);
    let target = match (document_id, verification_id) {
        (Some(id), None) => Some(OwnerTarget::Document(id)),
        (None, Some(id)) => Some(OwnerTarget::Verification(id)),
        (Some(_), Some(_)) => {
            errors.push(FieldError::batch(
                "owner",
                "exactly one of documentId and verificationId must be set, not both",
            ));
            None
        }
        (None, None) => {
            errors.push(FieldError::batch(
                "owner",
                "one of documentId or verificationId is required",
            ));
            None
        }
    };

    let events = collect_events(&input.events, max_batch_size, &mut errors);

    match (target, errors.is_empty()) {
        (Some(target), true) => Ok(ValidatedBatch { target, events }),
        _ => Err(StorageError::Validation(errors)),
    }
}

/// Validate events without an owner reference
///
/// Used when the owner is created in the same request, as with the initial
/// batch of a new verification.
pub fn validate_events(
    events: &[KeystrokeEventInput],
    max_batch_size: usize,
) -> Result<Vec<CreateKeystrokeInput>, StorageError> {
    let mut errors = ValidationErrors::default();
    let validated = collect_events(events, max_batch_size, &mut errors);
    if errors.is_empty() {
        Ok(validated)
    } else {
        Err(StorageError::Validation(errors))
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn collect_events(
    events: &[KeystrokeEventInput],
    max_batch_size: usize,
    errors: &mut ValidationErrors,
) -> Vec<CreateKeystrokeInput> {
    if events.is_empty() {
        errors.push(FieldError::batch("events", "batch must contain at least one event"));
        return Vec::new();
    }
    if events.len() > max_batch_size {
        errors.push(FieldError::batch(
            "events",
            format!(
                "batch of {} events exceeds the limit of {}",
                events.len(),
                max_batch_size
            ),
        ));
        return Vec::new();
    }

    let mut validated = Vec::with_capacity(events.len());
    let mut first_index_of: BTreeMap<i64, usize> = BTreeMap::new();

    for (index, event) in events.iter().enumerate() {
        if let Some(valid) = validate_event(index, event, errors) {
            if let Some(first) = first_index_of.get(&valid.sequence_number) {
                errors.push(FieldError::event(
                    index,
                    "sequenceNumber",
                    format!(
                        "sequence number {} already used by events[{}]",
                        valid.sequence_number, first
                    ),
                ));
                continue;
            }
            first_index_of.insert(valid.sequence_number, index);
            validated.push(valid);
        }
    }

    validated.sort_by(|a, b| {
        a.sequence_number
            .cmp(&b.sequence_number)
            .then(a.timestamp_ms.total_cmp(&b.timestamp_ms))
    });
    validated
}

fn validate_event(
    index: usize,
    event: &KeystrokeEventInput,
    errors: &mut ValidationErrors,
) -> Option<CreateKeystrokeInput> {
    let before = errors.fields().len();

    let event_type = text(index, "eventType", event.event_type.as_ref(), true, errors).and_then(
        |kind| {
            let canonical = event_types::canonical(kind);
            if canonical.is_none() {
                errors.push(FieldError::event(
                    index,
                    "eventType",
                    format!("must be one of {}", event_types::ALL.join(", ")),
                ));
            }
            canonical
        },
    );

    let key_code = text(index, "keyCode", event.key_code.as_ref(), true, errors);
    match key_code {
        Some("") => errors.push(FieldError::event(index, "keyCode", "must not be empty")),
        Some(code) if code.chars().count() > MAX_KEY_CODE_CHARS => errors.push(FieldError::event(
            index,
            "keyCode",
            format!("must be at most {} characters", MAX_KEY_CODE_CHARS),
        )),
        _ => {}
    }

    let character = text(index, "character", event.character.as_ref(), false, errors);
    if let Some(c) = character {
        if c.chars().count() > MAX_CHARACTER_CHARS {
            errors.push(FieldError::event(
                index,
                "character",
                format!("must be at most {} characters", MAX_CHARACTER_CHARS),
            ));
        }
    }

    let timestamp = number(index, "timestamp", event.timestamp.as_ref(), errors);
    let cursor_position = integer(index, "cursorPosition", event.cursor_position.as_ref(), errors);
    let sequence_number = integer(index, "sequenceNumber", event.sequence_number.as_ref(), errors);

    if errors.fields().len() > before {
        return None;
    }

    Some(CreateKeystrokeInput {
        event_type: event_type?,
        key_code: key_code?.to_string(),
        character: character.filter(|c| !c.is_empty()).map(str::to_string),
        timestamp_ms: timestamp?,
        cursor_position: cursor_position?,
        sequence_number: sequence_number?,
    })
}

/// A JSON string field; explicit `null` counts as absent
fn text<'a>(
    index: usize,
    field: &str,
    value: Option<&'a Value>,
    required: bool,
    errors: &mut ValidationErrors,
) -> Option<&'a str> {
    match value {
        None | Some(Value::Null) => {
            if required {
                errors.push(FieldError::event(index, field, "is required"));
            }
            None
        }
        Some(Value::String(s)) => Some(s.as_str()),
        Some(_) => {
            errors.push(FieldError::event(index, field, "must be a string"));
            None
        }
    }
}

/// A required, finite, non-negative JSON number
fn number(
    index: usize,
    field: &str,
    value: Option<&Value>,
    errors: &mut ValidationErrors,
) -> Option<f64> {
    let parsed = match value {
        None | Some(Value::Null) => {
            errors.push(FieldError::event(index, field, "is required"));
            return None;
        }
        Some(Value::Number(n)) => n.as_f64(),
        Some(_) => None,
    };

    match parsed {
        None => {
            errors.push(FieldError::event(index, field, "must be a number"));
            None
        }
        Some(v) if !v.is_finite() => {
            errors.push(FieldError::event(index, field, "must be a finite number"));
            None
        }
        Some(v) if v < 0.0 => {
            errors.push(FieldError::event(index, field, "must not be negative"));
            None
        }
        Some(v) => Some(v),
    }
}

/// A required non-negative JSON integer that fits the stored column
fn integer(
    index: usize,
    field: &str,
    value: Option<&Value>,
    errors: &mut ValidationErrors,
) -> Option<i64> {
    let n = match value {
        None | Some(Value::Null) => {
            errors.push(FieldError::event(index, field, "is required"));
            return None;
        }
        Some(Value::Number(n)) => n,
        Some(_) => {
            errors.push(FieldError::event(index, field, "must be a non-negative integer"));
            return None;
        }
    };

    match n.as_i64() {
        Some(v) if v < 0 => {
            errors.push(FieldError::event(index, field, "must not be negative"));
            None
        }
        Some(v) => Some(v),
        None if n.is_f64() => {
            errors.push(FieldError::event(index, field, "must be a non-negative integer"));
            None
        }
        None => {
            errors.push(FieldError::event(
                index,
                field,
                format!("must be at most {}", i64::MAX),
            ));
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(seq: i64) -> KeystrokeEventInput {
        KeystrokeEventInput {
            event_type: Some(json!("keydown")),
            key_code: Some(json!("KeyA")),
            character: Some(json!("a")),
            timestamp: Some(json!(100.0 + seq as f64)),
            cursor_position: Some(json!(seq)),
            sequence_number: Some(json!(seq)),
        }
    }

    fn batch(events: Vec<KeystrokeEventInput>) -> KeystrokeBatchInput {
        KeystrokeBatchInput {
            document_id: Some("doc-1".into()),
            verification_id: None,
            events,
        }
    }

    fn field_errors(result: Result<ValidatedBatch, StorageError>) -> Vec<FieldError> {
        match result {
            Err(StorageError::Validation(errors)) => errors.0,
            other => panic!("expected validation error, got {:?}", other.map(|b| b.target)),
        }
    }

    #[test]
    fn test_valid_batch_is_sorted() {
        let validated = validate_batch(batch(vec![event(2), event(0), event(1)]), 10).unwrap();
        assert_eq!(validated.target, OwnerTarget::Document("doc-1".into()));
        assert_eq!(validated.sequence_numbers(), vec![0, 1, 2]);
    }

    #[test]
    fn test_owner_must_be_exactly_one() {
        let mut both = batch(vec![event(0)]);
        both.verification_id = Some("ver".into());
        let errors = field_errors(validate_batch(both, 10));
        assert_eq!(errors[0].field, "owner");
        assert_eq!(errors[0].index, None);

        let mut neither = batch(vec![event(0)]);
        neither.document_id = Some("   ".into());
        let errors = field_errors(validate_batch(neither, 10));
        assert_eq!(errors[0].field, "owner");
    }

    #[test]
    fn test_every_offending_field_is_reported() {
        let mut bad = event(1);
        bad.event_type = Some(json!("keypress"));
        bad.cursor_position = Some(json!(-1));
        bad.timestamp = None;

        let errors = field_errors(validate_batch(batch(vec![event(0), bad]), 10));
        let fields: Vec<(Option<usize>, &str)> =
            errors.iter().map(|e| (e.index, e.field.as_str())).collect();
        assert_eq!(
            fields,
            vec![
                (Some(1), "eventType"),
                (Some(1), "timestamp"),
                (Some(1), "cursorPosition"),
            ]
        );
    }

    #[test]
    fn test_wrong_types_are_field_errors() {
        let json = r#"{
            "documentId": "doc-1",
            "events": [
                {"eventType": 5, "keyCode": "KeyA", "timestamp": 1,
                 "cursorPosition": "abc", "sequenceNumber": 0},
                {"eventType": "keydown", "keyCode": ["KeyA"], "timestamp": "12",
                 "cursorPosition": 0, "sequenceNumber": 1.5},
                {"eventType": "keyup", "keyCode": "KeyA", "character": 7, "timestamp": 2,
                 "cursorPosition": 0, "sequenceNumber": 18446744073709551615}
            ]
        }"#;
        let input: KeystrokeBatchInput = serde_json::from_str(json).unwrap();
        let errors = field_errors(validate_batch(input, 10));
        let fields: Vec<(Option<usize>, &str)> =
            errors.iter().map(|e| (e.index, e.field.as_str())).collect();
        assert_eq!(
            fields,
            vec![
                (Some(0), "eventType"),
                (Some(0), "cursorPosition"),
                (Some(1), "keyCode"),
                (Some(1), "timestamp"),
                (Some(1), "sequenceNumber"),
                (Some(2), "character"),
                (Some(2), "sequenceNumber"),
            ]
        );
        assert_eq!(errors[0].message, "must be a string");
        assert_eq!(errors[1].message, "must be a non-negative integer");
        assert_eq!(errors[4].message, "must be a non-negative integer");
        assert_eq!(errors[6].message, format!("must be at most {}", i64::MAX));
    }

    #[test]
    fn test_null_fields_count_as_missing() {
        let mut bad = event(0);
        bad.timestamp = Some(Value::Null);
        bad.character = Some(Value::Null);
        let errors = field_errors(validate_batch(batch(vec![bad]), 10));
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "timestamp");
        assert_eq!(errors[0].message, "is required");
    }

    #[test]
    fn test_repeated_sequence_number_in_batch() {
        let errors = field_errors(validate_batch(batch(vec![event(3), event(3)]), 10));
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].index, Some(1));
        assert_eq!(errors[0].field, "sequenceNumber");
    }

    #[test]
    fn test_empty_and_oversized_batches() {
        let errors = field_errors(validate_batch(batch(vec![]), 10));
        assert_eq!(errors[0].field, "events");

        let events = (0..3).map(event).collect();
        let errors = field_errors(validate_batch(batch(events), 2));
        assert_eq!(errors[0].field, "events");
    }

    #[test]
    fn test_empty_character_becomes_none() {
        let mut shift = event(0);
        shift.key_code = Some(json!("ShiftLeft"));
        shift.character = Some(json!(""));
        let events = validate_events(&[shift], 10).unwrap();
        assert_eq!(events[0].character, None);
    }

    #[test]
    fn test_wire_format() {
        let json = r#"{
            "verificationId": "abc",
            "events": [{
                "eventType": "keyup",
                "keyCode": "KeyZ",
                "character": "z",
                "timestamp": 12.5,
                "cursorPosition": 4,
                "sequenceNumber": 9
            }]
        }"#;
        let input: KeystrokeBatchInput = serde_json::from_str(json).unwrap();
        let validated = validate_batch(input, 10).unwrap();
        assert_eq!(validated.target, OwnerTarget::Verification("abc".into()));
        assert_eq!(validated.events[0].event_type, event_types::KEYUP);
        assert_eq!(validated.events[0].timestamp_ms, 12.5);
    }
}

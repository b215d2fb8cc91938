//! Wire serialization: JSON bodies in, flat JSON mappings out.
//!
//! Decoding is deliberately permissive: unknown body keys are dropped, never
//! rejected, so one handler set works for arbitrary entity shapes. Declared
//! fields that are present are still type-checked against their tag.

use crate::descriptor::{EntityDescriptor, FieldDescriptor, FieldType};
use crate::error::ApiError;
use crate::store::Record;
use serde_json::Value;

/// Decode a request body for an entity. Keeps declared fields only; the
/// primary key is store-assigned and is dropped if supplied.
pub fn decode_body(entity: &EntityDescriptor, bytes: &[u8]) -> Result<Record, ApiError> {
    let value: Value = serde_json::from_slice(bytes)
        .map_err(|_| ApiError::Validation("Invalid request body".into()))?;
    let Value::Object(map) = value else {
        return Err(ApiError::Validation("Request body must be a JSON object".into()));
    };

    let mut record = Record::new();
    for field in &entity.fields {
        if let Some(v) = map.get(&field.name) {
            check_type(field, v)?;
            record.insert(field.name.clone(), v.clone());
        }
    }
    Ok(record)
}

fn check_type(field: &FieldDescriptor, v: &Value) -> Result<(), ApiError> {
    if v.is_null() {
        return Ok(());
    }
    let ok = match field.type_tag {
        FieldType::Integer => v.is_i64() || v.is_u64(),
        FieldType::Float => v.is_number(),
        FieldType::Text => v.is_string(),
        FieldType::Boolean => v.is_boolean(),
        FieldType::Timestamp => v
            .as_str()
            .map(|s| chrono::DateTime::parse_from_rfc3339(s).is_ok())
            .unwrap_or(false),
        FieldType::Json => true,
    };
    if ok {
        Ok(())
    } else {
        Err(ApiError::Validation(format!(
            "Invalid value for field '{}'",
            field.name
        )))
    }
}

/// Flat wire mapping: primary key plus declared fields, nothing else.
pub fn to_wire(entity: &EntityDescriptor, record: &Record) -> Value {
    let mut out = serde_json::Map::new();
    let pk = &entity.primary_key_field;
    out.insert(pk.clone(), record.get(pk).cloned().unwrap_or(Value::Null));
    for field in &entity.fields {
        out.insert(
            field.name.clone(),
            record.get(&field.name).cloned().unwrap_or(Value::Null),
        );
    }
    Value::Object(out)
}

pub fn to_wire_list(entity: &EntityDescriptor, records: &[Record]) -> Vec<Value> {
    records.iter().map(|r| to_wire(entity, r)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn person() -> EntityDescriptor {
        EntityDescriptor::new("person")
            .with_field("name", FieldType::Text)
            .with_unique_field("email", FieldType::Text)
            .with_field("email_verified", FieldType::Boolean)
    }

    #[test]
    fn unknown_fields_are_dropped_not_rejected() {
        let body = br#"{"name":"John","hobby":"chess","pk":99}"#;
        let record = decode_body(&person(), body).unwrap();
        assert_eq!(record.get("name"), Some(&json!("John")));
        assert!(!record.contains_key("hobby"));
        assert!(!record.contains_key("pk"));
    }

    #[test]
    fn malformed_body_is_a_validation_error() {
        let err = decode_body(&person(), b"{not json").unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
        let err = decode_body(&person(), b"[1,2,3]").unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[test]
    fn declared_fields_are_type_checked() {
        let err = decode_body(&person(), br#"{"email_verified":"yes"}"#).unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
        // null is always accepted
        decode_body(&person(), br#"{"email_verified":null}"#).unwrap();
    }

    #[test]
    fn timestamps_must_be_rfc3339() {
        let entity = EntityDescriptor::new("event").with_field("at", FieldType::Timestamp);
        decode_body(&entity, br#"{"at":"2026-08-07T12:00:00Z"}"#).unwrap();
        let err = decode_body(&entity, br#"{"at":"yesterday"}"#).unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[test]
    fn wire_shape_is_flat_and_complete() {
        let entity = person();
        let record: Record = [
            ("pk".to_string(), json!(1)),
            ("name".to_string(), json!("John")),
            ("internal_note".to_string(), json!("hidden")),
        ]
        .into_iter()
        .collect();
        let wire = to_wire(&entity, &record);
        assert_eq!(wire["pk"], json!(1));
        assert_eq!(wire["name"], json!("John"));
        assert_eq!(wire["email"], Value::Null);
        assert!(wire.get("internal_note").is_none());
    }
}

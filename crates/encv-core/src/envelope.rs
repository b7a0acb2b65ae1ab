//! Unwrapping of stage inputs.
//!
//! Stages hand batches to each other either as a bare JSON array, as the raw
//! vendor response (`{"statistics": [...]}`), or wrapped in the invocation
//! envelope every command prints (`{"statusCode": 200, "body": {"data": [...]}}`).

use serde_json::Value;

use crate::FormatError;

/// Pull the list of rows out of any accepted input shape.
///
/// # Errors
///
/// Returns [`FormatError::NotAList`] if no array is found where one is expected.
pub fn extract_rows(payload: Value) -> Result<Vec<Value>, FormatError> {
    match payload {
        Value::Array(rows) => Ok(rows),
        Value::Object(mut object) => {
            if let Some(Value::Array(rows)) = object.remove("statistics") {
                return Ok(rows);
            }
            match object.remove("body") {
                Some(Value::Object(mut body)) => match body.remove("data") {
                    Some(Value::Array(rows)) => Ok(rows),
                    _ => Err(FormatError::NotAList),
                },
                _ => Err(FormatError::NotAList),
            }
        }
        _ => Err(FormatError::NotAList),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn accepts_bare_arrays() {
        let rows = extract_rows(json!([{"date": "2020-01-01"}])).unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn accepts_vendor_responses() {
        let rows = extract_rows(json!({"statistics": [{}, {}]})).unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn accepts_invocation_envelopes() {
        let payload = json!({"statusCode": 200, "body": {"data": [{"id": 1}, {"id": 2}]}});
        assert_eq!(extract_rows(payload).unwrap().len(), 2);
    }

    #[test]
    fn rejects_other_shapes() {
        assert_eq!(extract_rows(json!({"body": {}})).unwrap_err(), FormatError::NotAList);
        assert_eq!(extract_rows(json!("rows")).unwrap_err(), FormatError::NotAList);
    }
}

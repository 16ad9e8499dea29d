//! Conversions between row values and expression values.

use sync_core::RowValue;

use crate::Value;

/// Convert a column value into an expression value.
///
/// Valid UTF-8 byte strings become text. Temporal values become their
/// canonical text form so they can be compared against string literals.
pub fn from_row_value(value: &RowValue) -> Value {
    match value {
        RowValue::Null => Value::Null,
        RowValue::Int(i) => Value::Int(*i),
        RowValue::UInt(u) => match i64::try_from(*u) {
            Ok(i) => Value::Int(i),
            Err(_) => Value::Float(*u as f64),
        },
        RowValue::Float(f) => Value::Float(f64::from(*f)),
        RowValue::Double(d) => Value::Float(*d),
        RowValue::Bytes(b) => match String::from_utf8(b.clone()) {
            Ok(s) => Value::Str(s),
            Err(_) => Value::Bytes(b.clone()),
        },
        RowValue::Date { .. } | RowValue::Time { .. } => {
            Value::Str(value.to_string().trim_matches('\'').to_string())
        }
    }
}

/// Convert an expression result back into a bindable column value.
pub fn to_row_value(value: Value) -> RowValue {
    match value {
        Value::Null => RowValue::Null,
        Value::Bool(b) => RowValue::Int(i64::from(b)),
        Value::Int(i) => RowValue::Int(i),
        Value::Float(f) => RowValue::Double(f),
        Value::Str(s) => RowValue::Bytes(s.into_bytes()),
        Value::Bytes(b) => RowValue::Bytes(b),
        other @ (Value::List(_) | Value::Map(_)) => {
            RowValue::Bytes(to_json(&other).to_string().into_bytes())
        }
    }
}

fn to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Int(i) => serde_json::Value::from(*i),
        Value::Float(f) => serde_json::Value::from(*f),
        Value::Str(s) => serde_json::Value::String(s.clone()),
        Value::Bytes(b) => serde_json::Value::String(String::from_utf8_lossy(b).into_owned()),
        Value::List(items) => serde_json::Value::Array(items.iter().map(to_json).collect()),
        Value::Map(map) => serde_json::Value::Object(
            map.iter().map(|(k, v)| (k.clone(), to_json(v))).collect(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_bytes_become_strings() {
        assert_eq!(from_row_value(&RowValue::from("abc")), Value::Str("abc".into()));
        assert_eq!(
            from_row_value(&RowValue::Bytes(vec![0xff])),
            Value::Bytes(vec![0xff])
        );
    }

    #[test]
    fn test_large_unsigned_becomes_float() {
        assert_eq!(from_row_value(&RowValue::UInt(7)), Value::Int(7));
        assert_eq!(
            from_row_value(&RowValue::UInt(u64::MAX)),
            Value::Float(u64::MAX as f64)
        );
    }

    #[test]
    fn test_dates_become_text() {
        let date = RowValue::Date {
            year: 2024,
            month: 3,
            day: 9,
            hour: 0,
            minute: 0,
            second: 0,
            micros: 0,
        };
        assert_eq!(
            from_row_value(&date),
            Value::Str("2024-03-09 00:00:00.000000".into())
        );
    }

    #[test]
    fn test_back_to_row_value() {
        assert_eq!(to_row_value(Value::Bool(true)), RowValue::Int(1));
        assert_eq!(to_row_value(Value::Str("x".into())), RowValue::from("x"));
        assert_eq!(
            to_row_value(Value::List(vec![Value::Int(1), Value::Int(2)])),
            RowValue::from("[1,2]")
        );
    }
}

//! Bind parameter conversion.

use mysql_async::{Params, Value};
use sync_core::RowValue;

/// Convert a column value into a `mysql_async` bind value.
pub fn to_mysql_value(value: &RowValue) -> Value {
    match value {
        RowValue::Null => Value::NULL,
        RowValue::Int(i) => Value::Int(*i),
        RowValue::UInt(u) => Value::UInt(*u),
        RowValue::Float(f) => Value::Float(*f),
        RowValue::Double(d) => Value::Double(*d),
        RowValue::Bytes(b) => Value::Bytes(b.clone()),
        RowValue::Date {
            year,
            month,
            day,
            hour,
            minute,
            second,
            micros,
        } => Value::Date(*year, *month, *day, *hour, *minute, *second, *micros),
        RowValue::Time {
            negative,
            days,
            hours,
            minutes,
            seconds,
            micros,
        } => Value::Time(*negative, *days, *hours, *minutes, *seconds, *micros),
    }
}

pub(crate) fn to_params(values: &[RowValue]) -> Params {
    if values.is_empty() {
        Params::Empty
    } else {
        Params::Positional(values.iter().map(to_mysql_value).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_values() {
        assert_eq!(to_mysql_value(&RowValue::Null), Value::NULL);
        assert_eq!(to_mysql_value(&RowValue::Int(-3)), Value::Int(-3));
        assert_eq!(to_mysql_value(&RowValue::UInt(u64::MAX)), Value::UInt(u64::MAX));
        assert_eq!(to_mysql_value(&RowValue::from("x")), Value::Bytes(b"x".to_vec()));
    }

    #[test]
    fn test_temporal_values() {
        let date = RowValue::Date {
            year: 2024,
            month: 2,
            day: 29,
            hour: 13,
            minute: 5,
            second: 9,
            micros: 120,
        };
        assert_eq!(to_mysql_value(&date), Value::Date(2024, 2, 29, 13, 5, 9, 120));
        let time = RowValue::Time {
            negative: true,
            days: 1,
            hours: 2,
            minutes: 3,
            seconds: 4,
            micros: 0,
        };
        assert_eq!(to_mysql_value(&time), Value::Time(true, 1, 2, 3, 4, 0));
    }

    #[test]
    fn test_params() {
        assert!(matches!(to_params(&[]), Params::Empty));
        match to_params(&[RowValue::Int(1)]) {
            Params::Positional(values) => assert_eq!(values, vec![Value::Int(1)]),
            other => panic!("expected positional params, got {other:?}"),
        }
    }
}

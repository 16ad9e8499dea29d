//! `mysql_async` value conversion.

use mysql_async::Value;
use sync_core::RowValue;

pub fn from_mysql_value(value: &Value) -> RowValue {
    match value {
        Value::NULL => RowValue::Null,
        Value::Bytes(b) => RowValue::Bytes(b.clone()),
        Value::Int(i) => RowValue::Int(*i),
        Value::UInt(u) => RowValue::UInt(*u),
        Value::Float(f) => RowValue::Float(*f),
        Value::Double(d) => RowValue::Double(*d),
        Value::Date(year, month, day, hour, minute, second, micros) => RowValue::Date {
            year: *year,
            month: *month,
            day: *day,
            hour: *hour,
            minute: *minute,
            second: *second,
            micros: *micros,
        },
        Value::Time(negative, days, hours, minutes, seconds, micros) => RowValue::Time {
            negative: *negative,
            days: *days,
            hours: *hours,
            minutes: *minutes,
            seconds: *seconds,
            micros: *micros,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversions() {
        assert_eq!(from_mysql_value(&Value::NULL), RowValue::Null);
        assert_eq!(from_mysql_value(&Value::Int(4)), RowValue::Int(4));
        assert_eq!(
            from_mysql_value(&Value::Bytes(b"abc".to_vec())),
            RowValue::from("abc")
        );
        assert_eq!(
            from_mysql_value(&Value::Date(2023, 1, 2, 3, 4, 5, 6)),
            RowValue::Date {
                year: 2023,
                month: 1,
                day: 2,
                hour: 3,
                minute: 4,
                second: 5,
                micros: 6
            }
        );
    }
}

//! Column values carried by row images.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single column value.
///
/// The variants mirror what a MySQL row image can hold. Character data is
/// carried as raw bytes, exactly as the source delivers it; use
/// [`RowValue::as_str`] to view it as text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum RowValue {
    Null,
    Int(i64),
    UInt(u64),
    Float(f32),
    Double(f64),
    Bytes(Vec<u8>),
    Date {
        year: u16,
        month: u8,
        day: u8,
        hour: u8,
        minute: u8,
        second: u8,
        micros: u32,
    },
    Time {
        negative: bool,
        days: u32,
        hours: u8,
        minutes: u8,
        seconds: u8,
        micros: u32,
    },
}

impl RowValue {
    pub fn is_null(&self) -> bool {
        matches!(self, RowValue::Null)
    }

    /// View byte values as UTF-8 text.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            RowValue::Bytes(b) => std::str::from_utf8(b).ok(),
            _ => None,
        }
    }

    /// Numeric view used by expression evaluation and comparisons.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            RowValue::Int(i) => Some(*i as f64),
            RowValue::UInt(u) => Some(*u as f64),
            RowValue::Float(f) => Some(*f as f64),
            RowValue::Double(d) => Some(*d),
            _ => None,
        }
    }
}

impl From<i64> for RowValue {
    fn from(v: i64) -> Self {
        RowValue::Int(v)
    }
}

impl From<u64> for RowValue {
    fn from(v: u64) -> Self {
        RowValue::UInt(v)
    }
}

impl From<f64> for RowValue {
    fn from(v: f64) -> Self {
        RowValue::Double(v)
    }
}

impl From<bool> for RowValue {
    fn from(v: bool) -> Self {
        RowValue::Int(i64::from(v))
    }
}

impl From<&str> for RowValue {
    fn from(v: &str) -> Self {
        RowValue::Bytes(v.as_bytes().to_vec())
    }
}

impl From<String> for RowValue {
    fn from(v: String) -> Self {
        RowValue::Bytes(v.into_bytes())
    }
}

impl From<Vec<u8>> for RowValue {
    fn from(v: Vec<u8>) -> Self {
        RowValue::Bytes(v)
    }
}

impl<T: Into<RowValue>> From<Option<T>> for RowValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(RowValue::Null)
    }
}

impl fmt::Display for RowValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowValue::Null => f.write_str("NULL"),
            RowValue::Int(i) => write!(f, "{i}"),
            RowValue::UInt(u) => write!(f, "{u}"),
            RowValue::Float(v) => write!(f, "{v}"),
            RowValue::Double(v) => write!(f, "{v}"),
            RowValue::Bytes(b) => match std::str::from_utf8(b) {
                Ok(s) => write!(f, "'{s}'"),
                Err(_) => write!(f, "0x{}", b.iter().map(|x| format!("{x:02x}")).collect::<String>()),
            },
            RowValue::Date {
                year,
                month,
                day,
                hour,
                minute,
                second,
                micros,
            } => write!(
                f,
                "'{year:04}-{month:02}-{day:02} {hour:02}:{minute:02}:{second:02}.{micros:06}'"
            ),
            RowValue::Time {
                negative,
                days,
                hours,
                minutes,
                seconds,
                micros,
            } => {
                let sign = if *negative { "-" } else { "" };
                let total_hours = *days * 24 + u32::from(*hours);
                write!(
                    f,
                    "'{sign}{total_hours:02}:{minutes:02}:{seconds:02}.{micros:06}'"
                )
            }
        }
    }
}

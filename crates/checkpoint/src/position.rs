//! MySQL binlog position.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// A position within the MySQL binlog: log file name plus byte offset.
///
/// Positions are totally ordered by file, then offset. Files compare by
/// base name, then by the numeric sequence after the last `.`, so
/// `mysql-bin.1000000` follows `mysql-bin.999999`. Names without a
/// numeric suffix compare as plain strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct BinlogPosition {
    #[serde(rename = "Name", alias = "name")]
    pub name: String,
    #[serde(rename = "Pos", alias = "pos")]
    pub pos: u32,
}

impl BinlogPosition {
    pub fn new(name: impl Into<String>, pos: u32) -> Self {
        Self {
            name: name.into(),
            pos,
        }
    }

    /// An offset of zero never corresponds to an applied event.
    pub fn is_unset(&self) -> bool {
        self.pos == 0
    }

    fn file_key(&self) -> (&str, Option<u64>, &str) {
        match self.name.rsplit_once('.') {
            Some((base, suffix)) => match suffix.parse::<u64>() {
                Ok(sequence) => (base, Some(sequence), &self.name),
                Err(_) => (&self.name, None, &self.name),
            },
            None => (&self.name, None, &self.name),
        }
    }
}

impl Ord for BinlogPosition {
    fn cmp(&self, other: &Self) -> Ordering {
        self.file_key()
            .cmp(&other.file_key())
            .then_with(|| self.pos.cmp(&other.pos))
    }
}

impl PartialOrd for BinlogPosition {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for BinlogPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.name, self.pos)
    }
}

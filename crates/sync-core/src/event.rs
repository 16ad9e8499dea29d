//! Row-level change events.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::value::RowValue;

/// The kind of row change carried by a [`ChangeEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeAction {
    Insert,
    Update,
    Delete,
}

impl ChangeAction {
    /// Lowercase name used in filter configuration (`ignoreActions`).
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeAction::Insert => "insert",
            ChangeAction::Update => "update",
            ChangeAction::Delete => "delete",
        }
    }
}

impl fmt::Display for ChangeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("Unknown change action: {0}")]
pub struct ParseActionError(pub String);

impl FromStr for ChangeAction {
    type Err = ParseActionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "insert" => Ok(ChangeAction::Insert),
            "update" => Ok(ChangeAction::Update),
            "delete" => Ok(ChangeAction::Delete),
            _ => Err(ParseActionError(s.to_string())),
        }
    }
}

/// Column metadata as known to the change stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    /// Column name in the source table
    pub name: String,
    /// Zero-based position of the column in every row image
    pub ordinal: usize,
    /// Whether the column is part of the primary key
    pub primary_key: bool,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, ordinal: usize, primary_key: bool) -> Self {
        Self {
            name: name.into(),
            ordinal,
            primary_key,
        }
    }
}

/// One unit of replication input.
///
/// For `Insert` and `Delete` there is one image per affected row. For
/// `Update` the images come in pairs, before-image followed by after-image.
/// Events are not mutated once constructed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub schema: String,
    pub table: String,
    pub action: ChangeAction,
    pub columns: Vec<ColumnDef>,
    pub rows: Vec<Vec<RowValue>>,
    /// Set when the event was produced by the bulk dump rather than the stream
    #[serde(default)]
    pub from_dump: bool,
}

impl ChangeEvent {
    pub fn new(
        schema: impl Into<String>,
        table: impl Into<String>,
        action: ChangeAction,
        columns: Vec<ColumnDef>,
        rows: Vec<Vec<RowValue>>,
    ) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
            action,
            columns,
            rows,
            from_dump: false,
        }
    }

    pub fn with_dump(mut self, from_dump: bool) -> Self {
        self.from_dump = from_dump;
        self
    }

    /// Positions of the primary-key columns, in column order.
    pub fn pk_positions(&self) -> Vec<usize> {
        self.columns
            .iter()
            .filter(|c| c.primary_key)
            .map(|c| c.ordinal)
            .collect()
    }

    /// Position of the column with the given name.
    pub fn column_position(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.ordinal)
    }

    /// Number of logical rows affected (update pairs count once).
    pub fn image_count(&self) -> usize {
        match self.action {
            ChangeAction::Update => self.rows.len() / 2,
            _ => self.rows.len(),
        }
    }

    /// Before/after image pairs of an update event.
    ///
    /// Returns an empty iterator for other actions. A trailing unpaired image
    /// is ignored.
    pub fn update_pairs(&self) -> impl Iterator<Item = (&[RowValue], &[RowValue])> {
        let rows: &[Vec<RowValue>] = if self.action == ChangeAction::Update {
            &self.rows
        } else {
            &[]
        };
        rows.chunks_exact(2)
            .map(|pair| (pair[0].as_slice(), pair[1].as_slice()))
    }

    /// The image that represents the row's current state: the after-image of
    /// the first update pair, or the first image for inserts and deletes.
    pub fn current_image(&self) -> Option<&[RowValue]> {
        match self.action {
            ChangeAction::Update => self.rows.get(1).map(|r| r.as_slice()),
            _ => self.rows.first().map(|r| r.as_slice()),
        }
    }

    /// Whether any update pair changes a primary-key value.
    pub fn is_primary_key_update(&self) -> bool {
        let pk = self.pk_positions();
        self.update_pairs()
            .any(|(before, after)| primary_key_changed(&pk, before, after))
    }
}

/// Compare the primary-key columns of two images.
pub fn primary_key_changed(pk: &[usize], before: &[RowValue], after: &[RowValue]) -> bool {
    pk.iter().any(|&p| before.get(p) != after.get(p))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn columns() -> Vec<ColumnDef> {
        vec![
            ColumnDef::new("id", 0, true),
            ColumnDef::new("name", 1, false),
        ]
    }

    #[test]
    fn test_action_parse_is_case_insensitive() {
        assert_eq!("INSERT".parse::<ChangeAction>().unwrap(), ChangeAction::Insert);
        assert_eq!("Delete".parse::<ChangeAction>().unwrap(), ChangeAction::Delete);
        assert!("truncate".parse::<ChangeAction>().is_err());
    }

    #[test]
    fn test_update_pairs_and_current_image() {
        let event = ChangeEvent::new(
            "db",
            "t",
            ChangeAction::Update,
            columns(),
            vec![
                vec![RowValue::Int(1), RowValue::from("a")],
                vec![RowValue::Int(1), RowValue::from("b")],
                vec![RowValue::Int(2), RowValue::from("c")],
                vec![RowValue::Int(2), RowValue::from("d")],
            ],
        );

        assert_eq!(event.image_count(), 2);
        assert_eq!(event.update_pairs().count(), 2);
        assert_eq!(event.current_image().unwrap()[1], RowValue::from("b"));
        assert!(!event.is_primary_key_update());
    }

    #[test]
    fn test_primary_key_update_detected() {
        let event = ChangeEvent::new(
            "db",
            "t",
            ChangeAction::Update,
            columns(),
            vec![
                vec![RowValue::Int(1), RowValue::from("a")],
                vec![RowValue::Int(2), RowValue::from("a")],
            ],
        );
        assert!(event.is_primary_key_update());
    }

    #[test]
    fn test_insert_has_no_update_pairs() {
        let event = ChangeEvent::new(
            "db",
            "t",
            ChangeAction::Insert,
            columns(),
            vec![vec![RowValue::Int(1), RowValue::Null]],
        );
        assert_eq!(event.update_pairs().count(), 0);
        assert!(!event.is_primary_key_update());
        assert_eq!(event.column_position("name"), Some(1));
        assert_eq!(event.column_position("missing"), None);
    }
}

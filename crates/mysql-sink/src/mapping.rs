//! Source to destination table mapping.

use serde::{Deserialize, Serialize};
use sync_core::ChangeEvent;

use crate::error::{MappingError, Result};

/// Where one source table is written.
///
/// When `col_mappings` is empty every source column is written under its own
/// name. Otherwise only the listed columns are written, and each one must be
/// present in the change event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableMapping {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    pub src_table: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub dst_table: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub col_mappings: Vec<ColumnMapping>,
}

/// A single column correspondence with an optional transform expression.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMapping {
    pub src: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub dst: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub expr: String,
}

impl ColumnMapping {
    pub fn new(src: impl Into<String>, dst: impl Into<String>) -> Self {
        Self {
            src: src.into(),
            dst: dst.into(),
            expr: String::new(),
        }
    }

    pub fn with_expr(mut self, expr: impl Into<String>) -> Self {
        self.expr = expr.into();
        self
    }

    pub fn dst_name(&self) -> &str {
        if self.dst.is_empty() {
            &self.src
        } else {
            &self.dst
        }
    }
}

/// A destination column bound to a source position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundColumn {
    /// Position of the value inside a row image.
    pub position: usize,
    pub dst: String,
    /// Index into `col_mappings`, when the column came from one.
    pub mapping: Option<usize>,
}

impl TableMapping {
    /// A 1:1 mapping of `table` onto a table of the same name.
    pub fn identity(table: impl Into<String>) -> Self {
        Self {
            src_table: table.into(),
            ..Self::default()
        }
    }

    pub fn with_dst_table(mut self, table: impl Into<String>) -> Self {
        self.dst_table = table.into();
        self
    }

    pub fn with_columns(mut self, columns: Vec<ColumnMapping>) -> Self {
        self.col_mappings = columns;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.src_table.is_empty() {
            return Err(MappingError::Config("srcTable must not be empty".to_string()));
        }
        if let Some(c) = self.col_mappings.iter().find(|c| c.src.is_empty()) {
            return Err(MappingError::Config(format!(
                "column mapping for table '{}' has empty src (dst '{}')",
                self.src_table, c.dst
            )));
        }
        Ok(())
    }

    pub fn dst_table(&self) -> &str {
        if self.dst_table.is_empty() {
            &self.src_table
        } else {
            &self.dst_table
        }
    }

    /// Whether change events of this source table belong to this mapping.
    pub fn handles(&self, event: &ChangeEvent) -> bool {
        event.table == self.src_table
            && self.database.as_ref().is_none_or(|db| *db == event.schema)
    }

    /// Index of the column mapping for a source column.
    pub fn mapping_for(&self, src: &str) -> Option<usize> {
        self.col_mappings.iter().position(|c| c.src == src)
    }

    /// Destination name of a source column, falling back to the source name.
    pub fn dst_column<'a>(&'a self, src: &'a str) -> &'a str {
        self.mapping_for(src)
            .map(|i| self.col_mappings[i].dst_name())
            .unwrap_or(src)
    }

    /// Columns written for `event`, in destination order.
    pub fn bind_columns(&self, event: &ChangeEvent) -> Result<Vec<BoundColumn>> {
        if self.col_mappings.is_empty() {
            return Ok(event
                .columns
                .iter()
                .map(|c| BoundColumn {
                    position: c.ordinal,
                    dst: c.name.clone(),
                    mapping: None,
                })
                .collect());
        }
        self.col_mappings
            .iter()
            .enumerate()
            .map(|(i, m)| {
                let position =
                    event
                        .column_position(&m.src)
                        .ok_or_else(|| MappingError::UnknownColumn {
                            table: event.table.clone(),
                            column: m.src.clone(),
                        })?;
                Ok(BoundColumn {
                    position,
                    dst: m.dst_name().to_string(),
                    mapping: Some(i),
                })
            })
            .collect()
    }

    /// Primary-key columns of `event` under their destination names.
    pub fn bind_primary_key(&self, event: &ChangeEvent) -> Result<Vec<BoundColumn>> {
        let pk: Vec<BoundColumn> = event
            .columns
            .iter()
            .filter(|c| c.primary_key)
            .map(|c| BoundColumn {
                position: c.ordinal,
                dst: self.dst_column(&c.name).to_string(),
                mapping: self.mapping_for(&c.name),
            })
            .collect();
        if pk.is_empty() {
            return Err(MappingError::NoPrimaryKey(event.table.clone()));
        }
        Ok(pk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sync_core::{ChangeAction, ColumnDef, RowValue};

    fn event() -> ChangeEvent {
        ChangeEvent::new(
            "shop",
            "orders",
            ChangeAction::Insert,
            vec![
                ColumnDef::new("id", 0, true),
                ColumnDef::new("status", 1, false),
                ColumnDef::new("amount", 2, false),
            ],
            vec![vec![RowValue::Int(1), RowValue::from("new"), RowValue::Int(5)]],
        )
    }

    #[test]
    fn test_identity_binds_all_columns() {
        let mapping = TableMapping::identity("orders");
        let cols = mapping.bind_columns(&event()).unwrap();
        let names: Vec<_> = cols.iter().map(|c| c.dst.as_str()).collect();
        assert_eq!(names, vec!["id", "status", "amount"]);
        assert_eq!(mapping.dst_table(), "orders");
    }

    #[test]
    fn test_explicit_columns_are_exhaustive() {
        let mapping = TableMapping::identity("orders")
            .with_dst_table("orders_copy")
            .with_columns(vec![
                ColumnMapping::new("amount", "total"),
                ColumnMapping::new("id", ""),
            ]);
        let cols = mapping.bind_columns(&event()).unwrap();
        assert_eq!(
            cols,
            vec![
                BoundColumn { position: 2, dst: "total".into(), mapping: Some(0) },
                BoundColumn { position: 0, dst: "id".into(), mapping: Some(1) },
            ]
        );
    }

    #[test]
    fn test_unknown_source_column_rejected() {
        let mapping = TableMapping::identity("orders")
            .with_columns(vec![ColumnMapping::new("missing", "x")]);
        assert_eq!(
            mapping.bind_columns(&event()).unwrap_err(),
            MappingError::UnknownColumn {
                table: "orders".into(),
                column: "missing".into()
            }
        );
    }

    #[test]
    fn test_primary_key_names_follow_mapping() {
        let mapping = TableMapping::identity("orders")
            .with_columns(vec![ColumnMapping::new("id", "order_id")]);
        let pk = mapping.bind_primary_key(&event()).unwrap();
        assert_eq!(pk[0].dst, "order_id");

        let unmapped = TableMapping::identity("orders")
            .with_columns(vec![ColumnMapping::new("status", "state")]);
        assert_eq!(unmapped.bind_primary_key(&event()).unwrap()[0].dst, "id");
    }

    #[test]
    fn test_handles_table_and_optional_database() {
        let mut mapping = TableMapping::identity("orders");
        assert!(mapping.handles(&event()));
        mapping.database = Some("crm".into());
        assert!(!mapping.handles(&event()));
        assert!(!TableMapping::identity("users").handles(&event()));
    }

    #[test]
    fn test_deserialize_camel_case() {
        let mapping: TableMapping = serde_json::from_str(
            r#"{"srcTable": "orders", "dstTable": "o", "colMappings": [{"src": "id", "dst": "oid", "expr": "current + 1"}]}"#,
        )
        .unwrap();
        assert_eq!(mapping.dst_table(), "o");
        assert_eq!(mapping.col_mappings[0].expr, "current + 1");
        assert!(mapping.validate().is_ok());
        assert!(TableMapping::default().validate().is_err());
    }
}

//! Statement generation.
//!
//! | change                          | statements                                   |
//! |---------------------------------|----------------------------------------------|
//! | insert                          | `INSERT IGNORE INTO t (..) VALUES (..), (..)` |
//! | update, primary key unchanged   | `REPLACE INTO t (..) VALUES (..)` (after-images) |
//! | update, primary key changed     | per pair: `DELETE` before-image key, `INSERT IGNORE` after-image, in one transaction |
//! | delete                          | `DELETE FROM t WHERE (pk..) IN ((..), (..))`  |
//!
//! Multi-row statements are split so that none binds more than
//! [`MAX_PLACEHOLDERS`] parameters.

use std::collections::HashMap;
use std::fmt::Write;
use std::sync::Mutex;

use sync_core::{event::primary_key_changed, ChangeAction, ChangeEvent, RowValue};

use crate::error::{MappingError, Result};
use crate::mapping::{BoundColumn, TableMapping};
use crate::transform::ColumnTransforms;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatementKind {
    InsertIgnore,
    Replace,
    Delete,
}

/// A parameterized statement ready to execute.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub kind: StatementKind,
    pub table: String,
    /// Written columns, or the key columns for a delete.
    pub columns: Vec<String>,
    pub sql: String,
    pub params: Vec<RowValue>,
}

impl Statement {
    pub fn rows(&self) -> usize {
        if self.columns.is_empty() {
            0
        } else {
            self.params.len() / self.columns.len()
        }
    }
}

/// Statements for one change event.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WritePlan {
    pub statements: Vec<Statement>,
    /// Execute all statements in a single transaction.
    pub atomic: bool,
}

impl WritePlan {
    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }
}

/// Most parameters MySQL accepts in one prepared statement.
pub const MAX_PLACEHOLDERS: usize = 65_535;

/// Row images per statement for a row `width` columns wide.
fn rows_per_statement(width: usize) -> usize {
    (MAX_PLACEHOLDERS / width.max(1)).max(1)
}

/// Quote a MySQL identifier with backticks.
pub fn quote_identifier(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

fn placeholders(out: &mut String, width: usize, rows: usize) {
    for r in 0..rows {
        if r > 0 {
            out.push_str(", ");
        }
        out.push('(');
        for c in 0..width {
            if c > 0 {
                out.push_str(", ");
            }
            out.push('?');
        }
        out.push(')');
    }
}

fn column_list(columns: &[String]) -> String {
    columns
        .iter()
        .map(|c| quote_identifier(c))
        .collect::<Vec<_>>()
        .join(", ")
}

/// SQL text for a statement of `kind` covering `rows` row images.
pub fn render_sql(kind: StatementKind, table: &str, columns: &[String], rows: usize) -> String {
    let mut sql = String::with_capacity(64 + columns.len() * 8 * rows.max(1));
    let table = quote_identifier(table);
    let cols = column_list(columns);
    match kind {
        StatementKind::InsertIgnore | StatementKind::Replace => {
            let verb = if kind == StatementKind::Replace {
                "REPLACE INTO"
            } else {
                "INSERT IGNORE INTO"
            };
            let _ = write!(sql, "{verb} {table} ({cols}) VALUES ");
            placeholders(&mut sql, columns.len(), rows);
        }
        StatementKind::Delete => {
            let _ = write!(sql, "DELETE FROM {table} WHERE ({cols}) IN (");
            placeholders(&mut sql, columns.len(), rows);
            sql.push(')');
        }
    }
    sql
}

#[derive(Default)]
struct SqlCache {
    /// Column names of the event shape the entries were built for.
    shape: Vec<String>,
    entries: HashMap<(StatementKind, usize), String>,
}

/// Turns change events into statements for one table mapping.
///
/// SQL text is cached per statement kind and row count. The cache resets
/// when the source table's column list changes.
pub struct StatementGenerator {
    mapping: TableMapping,
    transforms: ColumnTransforms,
    cache: Mutex<SqlCache>,
}

impl StatementGenerator {
    pub fn new(mapping: TableMapping) -> Self {
        let transforms = ColumnTransforms::compile(&mapping);
        Self {
            mapping,
            transforms,
            cache: Mutex::new(SqlCache::default()),
        }
    }

    pub fn mapping(&self) -> &TableMapping {
        &self.mapping
    }

    pub fn generate(&self, event: &ChangeEvent) -> Result<WritePlan> {
        if event.rows.is_empty() {
            return Ok(WritePlan::default());
        }
        match event.action {
            ChangeAction::Insert => {
                let columns = self.mapping.bind_columns(event)?;
                let images: Vec<(&[RowValue], Option<&[RowValue]>)> =
                    event.rows.iter().map(|r| (r.as_slice(), None)).collect();
                let statements = images
                    .chunks(rows_per_statement(columns.len()))
                    .map(|chunk| self.write_statement(event, StatementKind::InsertIgnore, &columns, chunk))
                    .collect::<Result<Vec<_>>>()?;
                Ok(WritePlan { statements, atomic: false })
            }
            ChangeAction::Update => self.update_plan(event),
            ChangeAction::Delete => {
                let pk = self.mapping.bind_primary_key(event)?;
                let images: Vec<&[RowValue]> = event.rows.iter().map(|r| r.as_slice()).collect();
                let statements = images
                    .chunks(rows_per_statement(pk.len()))
                    .map(|chunk| self.delete_statement(event, &pk, chunk))
                    .collect::<Result<Vec<_>>>()?;
                Ok(WritePlan { statements, atomic: false })
            }
        }
    }

    fn update_plan(&self, event: &ChangeEvent) -> Result<WritePlan> {
        let columns = self.mapping.bind_columns(event)?;
        let pk_positions = event.pk_positions();
        let pairs: Vec<_> = event.update_pairs().collect();

        let key_changed = !pk_positions.is_empty()
            && pairs
                .iter()
                .any(|(before, after)| primary_key_changed(&pk_positions, before, after));

        if !key_changed {
            let images: Vec<_> = pairs.iter().map(|(b, a)| (*a, Some(*b))).collect();
            if images.is_empty() {
                return Ok(WritePlan::default());
            }
            let statements = images
                .chunks(rows_per_statement(columns.len()))
                .map(|chunk| self.write_statement(event, StatementKind::Replace, &columns, chunk))
                .collect::<Result<Vec<_>>>()?;
            return Ok(WritePlan { statements, atomic: false });
        }

        let pk = self.mapping.bind_primary_key(event)?;
        let mut statements = Vec::with_capacity(pairs.len() * 2);
        for (before, after) in pairs {
            if primary_key_changed(&pk_positions, before, after) {
                statements.push(self.delete_statement(event, &pk, &[before])?);
                statements.push(self.write_statement(
                    event,
                    StatementKind::InsertIgnore,
                    &columns,
                    &[(after, Some(before))],
                )?);
            } else {
                statements.push(self.write_statement(
                    event,
                    StatementKind::Replace,
                    &columns,
                    &[(after, Some(before))],
                )?);
            }
        }
        Ok(WritePlan { statements, atomic: true })
    }

    /// `images` pairs a row image with its before-image, if any.
    fn write_statement(
        &self,
        event: &ChangeEvent,
        kind: StatementKind,
        columns: &[BoundColumn],
        images: &[(&[RowValue], Option<&[RowValue]>)],
    ) -> Result<Statement> {
        let mut params = Vec::with_capacity(columns.len() * images.len());
        for (row, before) in images {
            for col in columns {
                let current = value_at(event, row, col.position)?;
                let last = match before {
                    Some(b) => Some(value_at(event, b, col.position)?),
                    None => None,
                };
                params.push(self.transforms.apply(col.mapping, current, last));
            }
        }
        let names: Vec<String> = columns.iter().map(|c| c.dst.clone()).collect();
        Ok(self.statement(event, kind, names, images.len(), params))
    }

    fn delete_statement(
        &self,
        event: &ChangeEvent,
        pk: &[BoundColumn],
        images: &[&[RowValue]],
    ) -> Result<Statement> {
        let mut params = Vec::with_capacity(pk.len() * images.len());
        for row in images {
            for col in pk {
                let current = value_at(event, row, col.position)?;
                params.push(self.transforms.apply(col.mapping, current, None));
            }
        }
        let names: Vec<String> = pk.iter().map(|c| c.dst.clone()).collect();
        Ok(self.statement(event, StatementKind::Delete, names, images.len(), params))
    }

    fn statement(
        &self,
        event: &ChangeEvent,
        kind: StatementKind,
        columns: Vec<String>,
        rows: usize,
        params: Vec<RowValue>,
    ) -> Statement {
        let table = self.mapping.dst_table().to_string();
        let sql = self.cached_sql(event, kind, &table, &columns, rows);
        Statement { kind, table, columns, sql, params }
    }

    fn cached_sql(
        &self,
        event: &ChangeEvent,
        kind: StatementKind,
        table: &str,
        columns: &[String],
        rows: usize,
    ) -> String {
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        let same_shape = cache.shape.len() == event.columns.len()
            && cache.shape.iter().zip(&event.columns).all(|(a, b)| *a == b.name);
        if !same_shape {
            cache.entries.clear();
            cache.shape = event.columns.iter().map(|c| c.name.clone()).collect();
        }
        cache
            .entries
            .entry((kind, rows))
            .or_insert_with(|| render_sql(kind, table, columns, rows))
            .clone()
    }

    #[cfg(test)]
    fn cached_entries(&self) -> usize {
        self.cache.lock().map(|c| c.entries.len()).unwrap_or(0)
    }
}

fn value_at<'a>(event: &ChangeEvent, row: &'a [RowValue], position: usize) -> Result<&'a RowValue> {
    row.get(position).ok_or_else(|| MappingError::MissingValue {
        table: event.table.clone(),
        position,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::ColumnMapping;
    use sync_core::ColumnDef;

    fn columns() -> Vec<ColumnDef> {
        vec![
            ColumnDef::new("id", 0, true),
            ColumnDef::new("status", 1, false),
        ]
    }

    fn row(id: i64, status: &str) -> Vec<RowValue> {
        vec![RowValue::Int(id), RowValue::from(status)]
    }

    fn event(action: ChangeAction, rows: Vec<Vec<RowValue>>) -> ChangeEvent {
        ChangeEvent::new("shop", "orders", action, columns(), rows)
    }

    fn generator() -> StatementGenerator {
        StatementGenerator::new(TableMapping::identity("orders"))
    }

    // ============================================================================
    // SQL rendering
    // ============================================================================

    #[test]
    fn test_render_insert_multi_row() {
        let sql = render_sql(
            StatementKind::InsertIgnore,
            "orders",
            &["id".into(), "status".into()],
            2,
        );
        assert_eq!(sql, "INSERT IGNORE INTO `orders` (`id`, `status`) VALUES (?, ?), (?, ?)");
    }

    #[test]
    fn test_render_delete_composite_key() {
        let sql = render_sql(StatementKind::Delete, "t", &["a".into(), "b".into()], 2);
        assert_eq!(sql, "DELETE FROM `t` WHERE (`a`, `b`) IN ((?, ?), (?, ?))");
    }

    #[test]
    fn test_quote_identifier_escapes_backticks() {
        assert_eq!(quote_identifier("we`ird"), "`we``ird`");
    }

    // ============================================================================
    // Plans
    // ============================================================================

    #[test]
    fn test_insert_batches_rows() {
        let plan = generator()
            .generate(&event(ChangeAction::Insert, vec![row(1, "a"), row(2, "b")]))
            .unwrap();
        assert!(!plan.atomic);
        let stmt = &plan.statements[0];
        assert_eq!(stmt.kind, StatementKind::InsertIgnore);
        assert_eq!(stmt.rows(), 2);
        assert_eq!(stmt.params, vec![
            RowValue::Int(1),
            RowValue::from("a"),
            RowValue::Int(2),
            RowValue::from("b"),
        ]);
    }

    #[test]
    fn test_update_without_key_change_is_replace_of_after_images() {
        let plan = generator()
            .generate(&event(ChangeAction::Update, vec![row(1, "a"), row(1, "b")]))
            .unwrap();
        assert_eq!(plan.statements.len(), 1);
        let stmt = &plan.statements[0];
        assert_eq!(stmt.sql, "REPLACE INTO `orders` (`id`, `status`) VALUES (?, ?)");
        assert_eq!(stmt.params, row(1, "b"));
    }

    #[test]
    fn test_primary_key_update_is_delete_then_insert() {
        let plan = generator()
            .generate(&event(ChangeAction::Update, vec![row(1, "a"), row(2, "b")]))
            .unwrap();
        assert!(plan.atomic);
        assert_eq!(plan.statements.len(), 2);
        let delete = &plan.statements[0];
        assert_eq!(delete.sql, "DELETE FROM `orders` WHERE (`id`) IN ((?))");
        assert_eq!(delete.params, vec![RowValue::Int(1)]);
        let insert = &plan.statements[1];
        assert_eq!(insert.sql, "INSERT IGNORE INTO `orders` (`id`, `status`) VALUES (?, ?)");
        assert_eq!(insert.params, row(2, "b"));
    }

    #[test]
    fn test_mixed_update_pairs_keep_order() {
        let plan = generator()
            .generate(&event(
                ChangeAction::Update,
                vec![row(1, "a"), row(1, "b"), row(2, "x"), row(3, "x")],
            ))
            .unwrap();
        let kinds: Vec<_> = plan.statements.iter().map(|s| s.kind).collect();
        assert_eq!(kinds, vec![
            StatementKind::Replace,
            StatementKind::Delete,
            StatementKind::InsertIgnore,
        ]);
    }

    #[test]
    fn test_delete_uses_mapped_key_names() {
        let generator = StatementGenerator::new(
            TableMapping::identity("orders")
                .with_dst_table("orders_v2")
                .with_columns(vec![ColumnMapping::new("id", "order_id")]),
        );
        let plan = generator
            .generate(&event(ChangeAction::Delete, vec![row(1, "a"), row(9, "z")]))
            .unwrap();
        let stmt = &plan.statements[0];
        assert_eq!(stmt.sql, "DELETE FROM `orders_v2` WHERE (`order_id`) IN ((?), (?))");
        assert_eq!(stmt.params, vec![RowValue::Int(1), RowValue::Int(9)]);
    }

    #[test]
    fn test_delete_without_primary_key_rejected() {
        let e = ChangeEvent::new(
            "shop",
            "log",
            ChangeAction::Delete,
            vec![ColumnDef::new("msg", 0, false)],
            vec![vec![RowValue::from("x")]],
        );
        assert_eq!(
            StatementGenerator::new(TableMapping::identity("log")).generate(&e).unwrap_err(),
            MappingError::NoPrimaryKey("log".into())
        );
    }

    #[test]
    fn test_mapped_columns_and_transform() {
        let generator = StatementGenerator::new(TableMapping::identity("orders").with_columns(vec![
            ColumnMapping::new("id", "id"),
            ColumnMapping::new("status", "state").with_expr(r#"mapTo(current, "a", "active")"#),
        ]));
        let plan = generator
            .generate(&event(ChangeAction::Insert, vec![row(1, "a")]))
            .unwrap();
        assert_eq!(plan.statements[0].sql, "INSERT IGNORE INTO `orders` (`id`, `state`) VALUES (?, ?)");
        assert_eq!(plan.statements[0].params, row(1, "active"));
    }

    #[test]
    fn test_invalid_transform_keeps_source_value() {
        let generator = StatementGenerator::new(TableMapping::identity("orders").with_columns(vec![
            ColumnMapping::new("id", "id"),
            ColumnMapping::new("status", "status").with_expr("current ++ )"),
        ]));
        let plan = generator
            .generate(&event(ChangeAction::Insert, vec![row(1, "a")]))
            .unwrap();
        assert_eq!(plan.statements[0].params, row(1, "a"));
    }

    #[test]
    fn test_short_row_image_rejected() {
        let e = event(ChangeAction::Insert, vec![vec![RowValue::Int(1)]]);
        assert_eq!(
            generator().generate(&e).unwrap_err(),
            MappingError::MissingValue { table: "orders".into(), position: 1 }
        );
    }

    fn wide_event(action: ChangeAction, width: usize, rows: usize) -> ChangeEvent {
        let columns = (0..width)
            .map(|i| ColumnDef::new(format!("c{i}"), i, i == 0))
            .collect();
        let images = (0..rows)
            .map(|r| (0..width).map(|c| RowValue::Int((r * width + c) as i64)).collect())
            .collect();
        ChangeEvent::new("shop", "wide", action, columns, images)
    }

    #[test]
    fn test_wide_batch_split_under_placeholder_limit() {
        let generator = StatementGenerator::new(TableMapping::identity("wide"));
        let plan = generator.generate(&wide_event(ChangeAction::Insert, 200, 500)).unwrap();

        // 65535 / 200 = 327 rows per statement.
        assert_eq!(plan.statements.len(), 2);
        assert!(plan.statements.iter().all(|s| s.params.len() <= MAX_PLACEHOLDERS));
        assert_eq!(plan.statements[0].rows(), 327);
        assert_eq!(plan.statements[1].rows(), 173);
        assert_eq!(plan.statements.iter().map(Statement::rows).sum::<usize>(), 500);
        assert_eq!(plan.statements[1].params[0], RowValue::Int(327 * 200));
        assert!(!plan.atomic);
    }

    #[test]
    fn test_wide_replace_and_delete_split() {
        let generator = StatementGenerator::new(TableMapping::identity("wide"));

        // Before and after images are identical, so the key never changes.
        let mut update = wide_event(ChangeAction::Update, 300, 250);
        update.rows = update.rows.iter().flat_map(|r| [r.clone(), r.clone()]).collect();
        let plan = generator.generate(&update).unwrap();
        assert_eq!(plan.statements.len(), 2);
        assert!(plan.statements.iter().all(|s| s.kind == StatementKind::Replace));
        assert!(plan.statements.iter().all(|s| s.params.len() <= MAX_PLACEHOLDERS));

        let plan = generator.generate(&wide_event(ChangeAction::Delete, 300, 250)).unwrap();
        assert_eq!(plan.statements.len(), 1);
        assert_eq!(plan.statements[0].params.len(), 250);
    }

    #[test]
    fn test_sql_cache_reused_and_reset_on_shape_change() {
        let generator = generator();
        generator.generate(&event(ChangeAction::Insert, vec![row(1, "a")])).unwrap();
        generator.generate(&event(ChangeAction::Insert, vec![row(2, "b")])).unwrap();
        assert_eq!(generator.cached_entries(), 1);
        generator
            .generate(&event(ChangeAction::Insert, vec![row(1, "a"), row(2, "b")]))
            .unwrap();
        assert_eq!(generator.cached_entries(), 2);

        let mut wider = columns();
        wider.push(ColumnDef::new("note", 2, false));
        let e = ChangeEvent::new(
            "shop",
            "orders",
            ChangeAction::Insert,
            wider,
            vec![vec![RowValue::Int(1), RowValue::from("a"), RowValue::Null]],
        );
        let plan = generator.generate(&e).unwrap();
        assert_eq!(generator.cached_entries(), 1);
        assert!(plan.statements[0].sql.contains("`note`"));
    }
}

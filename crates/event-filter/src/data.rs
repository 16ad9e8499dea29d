use std::collections::BTreeMap;
use std::sync::OnceLock;

use row_expr::{from_row_value, nest, Env, Program, Value};
use serde::{Deserialize, Serialize};
use sync_core::ChangeEvent;
use tracing::debug;

use crate::EventFilter;

/// Row content filter driven by expressions.
///
/// Expressions see the current image as `schema.table.column`. An event
/// outside the `databases` / `tables` scope always matches. A true
/// `exclude` result matches; a non-bool `exclude` result defers to
/// `include`, whose true result also matches. Expressions that fail to
/// compile or evaluate never match.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub databases: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tables: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub exclude: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub include: String,

    #[serde(skip)]
    pub(crate) exclude_program: OnceLock<Option<Program>>,
    #[serde(skip)]
    pub(crate) include_program: OnceLock<Option<Program>>,
}

impl DataFilter {
    pub fn new(exclude: impl Into<String>, include: impl Into<String>) -> Self {
        Self {
            exclude: exclude.into(),
            include: include.into(),
            ..Self::default()
        }
    }

    pub fn with_scope(mut self, databases: Option<Vec<String>>, tables: Option<Vec<String>>) -> Self {
        self.databases = databases;
        self.tables = tables;
        self
    }

    fn out_of_scope(&self, event: &ChangeEvent) -> bool {
        if let Some(databases) = &self.databases {
            if !databases.iter().any(|d| *d == event.schema) {
                return true;
            }
        }
        if let Some(tables) = &self.tables {
            if !tables.iter().any(|t| *t == event.table) {
                return true;
            }
        }
        false
    }
}

impl EventFilter for DataFilter {
    fn matches(&self, event: &ChangeEvent) -> bool {
        if self.out_of_scope(event) {
            return true;
        }
        if self.exclude.is_empty() {
            return false;
        }

        let env = row_env(event);
        if let Some(result) = evaluate(&self.exclude, &self.exclude_program, &env) {
            match result {
                Value::Bool(b) => return b,
                other => debug!(
                    expression = %self.exclude,
                    result = other.type_name(),
                    "Exclude expression did not produce a bool"
                ),
            }
        } else {
            return false;
        }

        if self.include.is_empty() {
            return false;
        }
        match evaluate(&self.include, &self.include_program, &env) {
            Some(Value::Bool(b)) => b,
            _ => false,
        }
    }
}

/// Runs a lazily compiled expression. `None` means it failed.
fn evaluate(source: &str, slot: &OnceLock<Option<Program>>, env: &Env) -> Option<Value> {
    let program = slot
        .get_or_init(|| match Program::compile(source) {
            Ok(p) => Some(p),
            Err(e) => {
                debug!(expression = %source, error = %e, "Failed to compile filter expression");
                None
            }
        })
        .as_ref()?;
    match program.run(env) {
        Ok(v) => Some(v),
        Err(e) => {
            debug!(expression = %source, error = %e, "Failed to evaluate filter expression");
            None
        }
    }
}

fn row_env(event: &ChangeEvent) -> Env {
    let mut columns = BTreeMap::new();
    if let Some(image) = event.current_image() {
        for (col, value) in event.columns.iter().zip(image) {
            columns.insert(col.name.clone(), from_row_value(value));
        }
    }
    Env::with_builtins().with_var(
        event.schema.clone(),
        nest(&[event.table.as_str()], Value::Map(columns)),
    )
}

use serde::{Deserialize, Serialize};
use sync_core::ChangeEvent;

use crate::EventFilter;

/// Name based filter over tables, databases and actions.
///
/// Names compare case-insensitively. When `include_tables` is non-empty it
/// is the only list consulted: every table outside it is filtered.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableFilter {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ignore_tables: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ignore_actions: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ignore_databases: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub include_tables: Vec<String>,
}

impl EventFilter for TableFilter {
    fn matches(&self, event: &ChangeEvent) -> bool {
        if !self.include_tables.is_empty() {
            return !in_list(&event.table, &self.include_tables);
        }
        in_list(&event.table, &self.ignore_tables)
            || in_list(&event.schema, &self.ignore_databases)
            || in_list(event.action.as_str(), &self.ignore_actions)
    }
}

fn in_list(name: &str, list: &[String]) -> bool {
    list.iter().any(|v| v.eq_ignore_ascii_case(name))
}

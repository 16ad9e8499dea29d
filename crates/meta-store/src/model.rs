//! Persisted records.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use checkpoint::BinlogPosition;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Running,
    Stopped,
}

impl TaskState {
    pub fn code(&self) -> i32 {
        match self {
            TaskState::Running => 1,
            TaskState::Stopped => 2,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(TaskState::Running),
            2 => Some(TaskState::Stopped),
            _ => None,
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskState::Running => f.write_str("running"),
            TaskState::Stopped => f.write_str("stopped"),
        }
    }
}

/// A row of the `tasks` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRecord {
    pub id: i64,
    pub title: String,
    pub src_type: i32,
    /// Source configuration JSON
    pub src: String,
    /// Comma-separated destination ids
    pub dest: String,
    pub state: i32,
    pub info: Option<String>,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

impl TaskRecord {
    pub fn dest_ids(&self) -> Result<Vec<i64>> {
        parse_dest_ids(&self.dest)
    }

    pub fn task_state(&self) -> Option<TaskState> {
        TaskState::from_code(self.state)
    }

    /// Position stored in `info`, if any.
    ///
    /// An unparseable blob is treated as absent.
    pub fn position(&self) -> Option<BinlogPosition> {
        let info = self.info.as_deref()?;
        serde_json::from_str::<TaskInfo>(info)
            .ok()
            .and_then(|i| i.position)
            .filter(|p| !p.is_unset())
    }
}

/// The `info` column of a task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<BinlogPosition>,
}

/// A row of the `task_dests` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DestinationRecord {
    pub id: i64,
    #[serde(rename = "type")]
    pub dest_type: i32,
    pub name: String,
    /// Sink configuration JSON
    pub config: String,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDestination {
    #[serde(rename = "type", default = "default_type")]
    pub dest_type: i32,
    pub name: String,
    /// Sink configuration, stored as JSON text
    pub config: serde_json::Value,
}

/// Request body for creating a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTask {
    pub title: String,
    #[serde(default = "default_type")]
    pub src_type: i32,
    /// Source configuration, stored as JSON text
    pub src: serde_json::Value,
    #[serde(default)]
    pub destinations: Vec<NewDestination>,
}

/// MySQL for both sources and destinations.
fn default_type() -> i32 {
    1
}

pub fn parse_dest_ids(dest: &str) -> Result<Vec<i64>> {
    dest.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<i64>()
                .with_context(|| format!("Invalid destination id '{s}'"))
        })
        .collect()
}

/// Normalize paging: sizes outside `1..=50` become 10, pages start at 1.
/// Returns `(offset, limit)`.
pub fn page_bounds(page: usize, size: usize) -> (usize, usize) {
    let size = if size == 0 || size > 50 { 10 } else { size };
    let page = page.max(1);
    ((page - 1) * size, size)
}

/// `src` with its `dumpConfig` replaced, or removed when `dump_config` is `None`.
pub fn dump_config_rewritten(src: &str, dump_config: Option<serde_json::Value>) -> Result<String> {
    let mut value: serde_json::Value =
        serde_json::from_str(src).context("Task source is not valid JSON")?;
    let object = value
        .as_object_mut()
        .ok_or_else(|| anyhow!("Task source is not a JSON object"))?;
    match dump_config {
        Some(config) => {
            object.insert("dumpConfig".to_string(), config);
        }
        None => {
            object.remove("dumpConfig");
        }
    }
    Ok(value.to_string())
}

pub(crate) fn position_info(position: &BinlogPosition) -> Result<String> {
    serde_json::to_string(&TaskInfo {
        position: Some(position.clone()),
    })
    .context("Failed to serialize task info")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(info: Option<&str>) -> TaskRecord {
        TaskRecord {
            id: 1,
            title: "t".into(),
            src_type: 1,
            src: "{}".into(),
            dest: "3, 4,".into(),
            state: 2,
            info: info.map(str::to_string),
            created: Utc::now(),
            updated: Utc::now(),
        }
    }

    #[test]
    fn test_dest_ids() {
        assert_eq!(record(None).dest_ids().unwrap(), vec![3, 4]);
        assert!(parse_dest_ids("").unwrap().is_empty());
        assert!(parse_dest_ids("1,x").is_err());
    }

    #[test]
    fn test_position_from_info() {
        let info = position_info(&BinlogPosition::new("mysql-bin.000002", 120)).unwrap();
        assert_eq!(info, r#"{"position":{"Name":"mysql-bin.000002","Pos":120}}"#);
        assert_eq!(
            record(Some(&info)).position(),
            Some(BinlogPosition::new("mysql-bin.000002", 120))
        );
        assert_eq!(record(Some("not json")).position(), None);
        assert_eq!(record(Some(r#"{"position":{"Name":"b","Pos":0}}"#)).position(), None);
        assert_eq!(record(None).position(), None);
    }

    #[test]
    fn test_page_bounds() {
        assert_eq!(page_bounds(0, 0), (0, 10));
        assert_eq!(page_bounds(3, 20), (40, 20));
        assert_eq!(page_bounds(2, 100), (10, 10));
    }

    #[test]
    fn test_dump_config_rewritten() {
        let src = r#"{"host":"h","dumpConfig":{"databases":["shop"]}}"#;
        let cleared: serde_json::Value =
            serde_json::from_str(&dump_config_rewritten(src, None).unwrap()).unwrap();
        assert!(cleared.get("dumpConfig").is_none());
        assert_eq!(cleared["host"], "h");

        let set: serde_json::Value = serde_json::from_str(
            &dump_config_rewritten(r#"{"host":"h"}"#, Some(serde_json::json!({"tables":["a"]}))).unwrap(),
        )
        .unwrap();
        assert_eq!(set["dumpConfig"]["tables"][0], "a");
        assert!(dump_config_rewritten("[]", None).is_err());
    }

    #[test]
    fn test_state_codes() {
        assert_eq!(TaskState::Running.code(), 1);
        assert_eq!(TaskState::from_code(2), Some(TaskState::Stopped));
        assert_eq!(TaskState::from_code(0), None);
    }
}

//! Task endpoints.

use axum::extract::{Query, State};
use axum::Json;
use meta_store::{NewTask, TaskRecord};
use mysql_binlog_source::SourceConfig;
use mysql_sink::MySQLSinkConfig;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::response::{ApiError, ApiResponse};
use super::AppState;
use crate::task::TaskDetail;

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

#[derive(Debug, Deserialize)]
pub struct IdParams {
    id: Option<String>,
}

impl IdParams {
    fn id(&self) -> Result<i64, ApiError> {
        let raw = self
            .id
            .as_deref()
            .ok_or_else(|| ApiError::BadRequest("missing task id".to_string()))?;
        raw.trim()
            .parse::<i64>()
            .ok()
            .filter(|id| *id > 0)
            .ok_or_else(|| ApiError::BadRequest(format!("invalid task id: {raw}")))
    }
}

#[derive(Debug, Deserialize)]
pub struct PageParams {
    page: Option<usize>,
    size: Option<usize>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSummary {
    #[serde(flatten)]
    pub task: TaskRecord,
    pub running: bool,
    pub last_error: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskView {
    #[serde(flatten)]
    pub detail: TaskDetail,
    pub last_error: Option<String>,
}

pub async fn list_tasks(State(state): State<AppState>, Query(params): Query<PageParams>) -> ApiResult<Vec<TaskSummary>> {
    let tasks = state
        .store
        .list_tasks(params.page.unwrap_or(1), params.size.unwrap_or(10))
        .await?;
    let summaries = tasks
        .into_iter()
        .map(|task| TaskSummary {
            running: state.registry.contains(task.id),
            last_error: state.registry.last_error(task.id),
            task,
        })
        .collect();
    Ok(ApiResponse::ok(summaries))
}

pub async fn task_detail(State(state): State<AppState>, Query(params): Query<IdParams>) -> ApiResult<TaskView> {
    let id = params.id()?;
    let detail = match state.registry.get(id) {
        Some(task) => task.detail(),
        None => {
            let record = state
                .store
                .get_task(id)
                .await?
                .ok_or_else(|| ApiError::NotFound("task not found.".to_string()))?;
            let destinations = state.store.get_destinations(&record).await?;
            TaskDetail::stopped(record, &destinations)
        }
    };
    Ok(ApiResponse::ok(TaskView {
        detail,
        last_error: state.registry.last_error(id),
    }))
}

/// Start in the background and answer right away; failures show up in
/// the task's `lastError`.
pub async fn start_task(State(state): State<AppState>, Query(params): Query<IdParams>) -> ApiResult<()> {
    let id = params.id()?;
    if state.registry.contains(id) {
        return Ok(ApiResponse::message("task already started"));
    }
    let task = state
        .builder
        .build(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("task not found.".to_string()))?;

    let registry = state.registry.clone();
    tokio::spawn(async move {
        if let Err(e) = task.start().await {
            registry.record_error(task.id(), format!("{e:#}"));
        }
        if task.running() {
            task.stop().await;
        }
    });
    info!(task = id, "Start requested");
    Ok(ApiResponse::message("task starting"))
}

pub async fn stop_task(State(state): State<AppState>, Query(params): Query<IdParams>) -> ApiResult<()> {
    let id = params.id()?;
    match state.registry.get(id) {
        Some(task) => {
            task.stop().await;
            Ok(ApiResponse::message("task stopped"))
        }
        None if state.store.get_task(id).await?.is_some() => {
            Ok(ApiResponse::message("task not running"))
        }
        None => Err(ApiError::NotFound("task not found.".to_string())),
    }
}

pub async fn create_task(State(state): State<AppState>, Json(task): Json<NewTask>) -> ApiResult<TaskRecord> {
    if task.title.trim().is_empty() {
        return Err(ApiError::BadRequest("task title is required".to_string()));
    }
    serde_json::from_value::<SourceConfig>(task.src.clone())
        .map_err(|e| ApiError::BadRequest(format!("invalid source config: {e}")))?;
    for dest in &task.destinations {
        serde_json::from_value::<MySQLSinkConfig>(dest.config.clone()).map_err(|e| {
            ApiError::BadRequest(format!("invalid config for destination {}: {e}", dest.name))
        })?;
    }
    let record = state.store.create_task(task).await?;
    Ok(ApiResponse::ok(record))
}

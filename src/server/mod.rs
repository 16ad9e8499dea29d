//! HTTP control plane.
//!
//! | method | path | action |
//! |---|---|---|
//! | GET | `/api/tasks?page=&size=` | list tasks with running flags |
//! | GET | `/api/task?id=` | task detail |
//! | POST | `/api/task` | create a task with its destinations |
//! | GET | `/api/task/start?id=` | start a task in the background |
//! | GET | `/api/task/stop?id=` | stop a running task |

mod handlers;
mod response;

pub use handlers::{TaskSummary, TaskView};
pub use response::{ApiError, ApiResponse};

use std::future::Future;
use std::sync::Arc;

use anyhow::Context;
use axum::routing::get;
use axum::Router;
use meta_store::MetaStore;
use tokio::net::TcpListener;
use tracing::info;

use crate::builder::TaskBuilder;
use crate::task::TaskRegistry;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn MetaStore>,
    pub registry: Arc<TaskRegistry>,
    pub builder: Arc<TaskBuilder>,
}

impl AppState {
    pub fn new(builder: Arc<TaskBuilder>) -> Self {
        let ctx = builder.context();
        Self {
            store: ctx.store.clone(),
            registry: ctx.registry.clone(),
            builder,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/tasks", get(handlers::list_tasks))
        .route("/api/task", get(handlers::task_detail).post(handlers::create_task))
        .route("/api/task/start", get(handlers::start_task))
        .route("/api/task/stop", get(handlers::stop_task))
        .with_state(state)
}

/// Serve until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr().context("Listener has no local address")?;
    info!("Control plane listening on {addr}");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .context("HTTP server failed")
}

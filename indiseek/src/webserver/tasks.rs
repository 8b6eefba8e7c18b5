use axum::extract::Path;
use axum::response::{sse, IntoResponse, Sse};
use axum::Extension;
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use uuid::Uuid;

use crate::application::application::Application;
use crate::tasks::{TaskEvent, TaskSnapshot};

use super::types::{json, ApiError, ApiResponse, Result};

#[derive(Serialize, Debug)]
pub(crate) struct TaskList {
    tasks: Vec<TaskSnapshot>,
}

impl ApiResponse for TaskList {}
impl ApiResponse for TaskSnapshot {}

pub async fn list(Extension(app): Extension<Application>) -> Result<impl IntoResponse> {
    Ok(json(TaskList {
        tasks: app.task_manager.list(),
    }))
}

pub async fn detail(
    Path(task_id): Path<Uuid>,
    Extension(app): Extension<Application>,
) -> Result<impl IntoResponse> {
    app.task_manager
        .get(task_id)
        .map(json)
        .ok_or_else(|| ApiError::not_found(format!("task {task_id}")))
}

fn is_terminal(event: &TaskEvent) -> bool {
    matches!(event, TaskEvent::Done { .. } | TaskEvent::Error { .. })
}

/// Server-sent events: replay the ring, then stream live until the
/// terminal event. One JSON object per message. A subscriber that lags
/// behind the bounded channel is cut off rather than slowing the task.
pub async fn stream(
    Path(task_id): Path<Uuid>,
    Extension(app): Extension<Application>,
) -> Result<impl IntoResponse> {
    let (replay, mut receiver) = app
        .task_manager
        .subscribe(task_id)
        .ok_or_else(|| ApiError::not_found(format!("task {task_id}")))?;

    let stream = async_stream::stream! {
        let mut finished = false;
        for event in replay {
            let terminal = is_terminal(&event);
            yield sse::Event::default().json_data(&event);
            if terminal {
                finished = true;
                break;
            }
        }
        while !finished {
            match receiver.recv().await {
                Ok(event) => {
                    let terminal = is_terminal(&event);
                    yield sse::Event::default().json_data(&event);
                    if terminal {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    let error = TaskEvent::Error {
                        error: format!("subscriber dropped after lagging {skipped} events"),
                    };
                    yield sse::Event::default().json_data(&error);
                    break;
                }
                Err(RecvError::Closed) => break,
            }
        }
    };

    Ok(Sse::new(Box::pin(stream)))
}

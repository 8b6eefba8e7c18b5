//! Single-writer background executor. At most one indexing or sync task
//! runs at a time across the process; concurrent submissions get a
//! `Conflict`. Progress fans out through a bounded ring (replayed to late
//! subscribers) plus a broadcast channel — a lagging subscriber is dropped
//! by the SSE layer, never blocking the producer.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{error, info};
use uuid::Uuid;

use crate::pipeline::progress::{ProgressEvent, ProgressReporter};

const RING_CAPACITY: usize = 256;
const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("a task is already running")]
    Conflict,
}

#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl TaskStatus {
    fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

#[derive(Serialize, Clone, Debug)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskEvent {
    Progress {
        #[serde(flatten)]
        event: ProgressEvent,
    },
    Done {
        result: serde_json::Value,
    },
    Error {
        error: String,
    },
}

#[derive(Serialize, Clone, Debug)]
pub struct TaskSnapshot {
    pub id: Uuid,
    pub name: String,
    pub status: TaskStatus,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub created_at: String,
}

struct TaskInner {
    status: TaskStatus,
    result: Option<serde_json::Value>,
    error: Option<String>,
    ring: VecDeque<TaskEvent>,
}

struct TaskState {
    id: Uuid,
    name: String,
    created_at: String,
    inner: Mutex<TaskInner>,
    sender: broadcast::Sender<TaskEvent>,
}

impl TaskState {
    /// Ring append and broadcast happen under one lock so a subscriber
    /// joining mid-task sees every event exactly once: replay then live.
    fn push(&self, event: TaskEvent) {
        let mut inner = self.inner.lock().expect("task state lock poisoned");
        if inner.ring.len() == RING_CAPACITY {
            inner.ring.pop_front();
        }
        inner.ring.push_back(event.clone());
        let _ = self.sender.send(event);
    }

    fn snapshot(&self) -> TaskSnapshot {
        let inner = self.inner.lock().expect("task state lock poisoned");
        TaskSnapshot {
            id: self.id,
            name: self.name.clone(),
            status: inner.status,
            result: inner.result.clone(),
            error: inner.error.clone(),
            created_at: self.created_at.clone(),
        }
    }
}

pub struct TaskManager {
    tasks: DashMap<Uuid, Arc<TaskState>>,
    running: Mutex<Option<Uuid>>,
    timeout: Option<Duration>,
}

impl TaskManager {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self {
            tasks: DashMap::new(),
            running: Mutex::new(None),
            timeout,
        }
    }

    /// Claim the single writer slot and spawn the task. The factory
    /// receives a reporter wired into this task's ring and channel.
    pub fn submit<F, Fut>(self: &Arc<Self>, name: &str, work: F) -> Result<Uuid, TaskError>
    where
        F: FnOnce(ProgressReporter) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<serde_json::Value>> + Send + 'static,
    {
        let id = Uuid::new_v4();
        {
            let mut running = self.running.lock().expect("running slot lock poisoned");
            if let Some(current) = *running {
                let still_going = self
                    .tasks
                    .get(&current)
                    .map(|t| !t.snapshot().status.is_terminal())
                    .unwrap_or(false);
                if still_going {
                    return Err(TaskError::Conflict);
                }
            }
            *running = Some(id);
        }

        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        let state = Arc::new(TaskState {
            id,
            name: name.to_owned(),
            created_at: chrono::Utc::now().to_rfc3339(),
            inner: Mutex::new(TaskInner {
                status: TaskStatus::Pending,
                result: None,
                error: None,
                ring: VecDeque::new(),
            }),
            sender,
        });
        self.tasks.insert(id, state.clone());

        let manager = Arc::clone(self);
        let timeout = self.timeout;
        let task_name = name.to_owned();
        tokio::spawn(async move {
            {
                let mut inner = state.inner.lock().expect("task state lock poisoned");
                inner.status = TaskStatus::Running;
            }
            info!(task = %task_name, %id, "task started");

            let reporter_state = state.clone();
            let reporter = ProgressReporter::new(move |event: ProgressEvent| {
                reporter_state.push(TaskEvent::Progress { event });
            });

            let outcome = match timeout {
                Some(limit) => match tokio::time::timeout(limit, work(reporter)).await {
                    Ok(result) => result,
                    Err(_) => Err(anyhow::anyhow!(
                        "task exceeded wall-clock budget of {}s",
                        limit.as_secs()
                    )),
                },
                None => work(reporter).await,
            };

            match outcome {
                Ok(result) => {
                    {
                        let mut inner = state.inner.lock().expect("task state lock poisoned");
                        inner.status = TaskStatus::Completed;
                        inner.result = Some(result.clone());
                    }
                    info!(task = %task_name, %id, "task completed");
                    state.push(TaskEvent::Done { result });
                }
                Err(err) => {
                    let message = format!("{err:#}");
                    {
                        let mut inner = state.inner.lock().expect("task state lock poisoned");
                        inner.status = TaskStatus::Failed;
                        inner.error = Some(message.clone());
                    }
                    error!(task = %task_name, %id, error = %message, "task failed");
                    state.push(TaskEvent::Error { error: message });
                }
            }

            let mut running = manager.running.lock().expect("running slot lock poisoned");
            if *running == Some(id) {
                *running = None;
            }
        });

        Ok(id)
    }

    pub fn get(&self, id: Uuid) -> Option<TaskSnapshot> {
        self.tasks.get(&id).map(|state| state.snapshot())
    }

    pub fn list(&self) -> Vec<TaskSnapshot> {
        let mut snapshots: Vec<_> = self.tasks.iter().map(|e| e.value().snapshot()).collect();
        snapshots.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        snapshots
    }

    /// Replay of everything so far plus a live receiver; events between the
    /// two cannot be lost because push holds the same lock.
    pub fn subscribe(
        &self,
        id: Uuid,
    ) -> Option<(Vec<TaskEvent>, broadcast::Receiver<TaskEvent>)> {
        let state = self.tasks.get(&id)?;
        let inner = state.inner.lock().expect("task state lock poisoned");
        let replay = inner.ring.iter().cloned().collect();
        let receiver = state.sender.subscribe();
        Some((replay, receiver))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> Arc<TaskManager> {
        Arc::new(TaskManager::new(None))
    }

    #[tokio::test]
    async fn second_submission_conflicts_while_first_runs() {
        let manager = manager();
        let (hold_tx, hold_rx) = tokio::sync::oneshot::channel::<()>();

        let first = manager
            .submit("embed", move |_reporter| async move {
                let _ = hold_rx.await;
                Ok(serde_json::json!({"embedded": 1}))
            })
            .unwrap();

        // first task is parked, the slot is taken
        tokio::time::sleep(Duration::from_millis(20)).await;
        let err = manager.submit("embed", |_| async { Ok(serde_json::Value::Null) });
        assert!(matches!(err, Err(TaskError::Conflict)));

        hold_tx.send(()).unwrap();
        for _ in 0..50 {
            if manager.get(first).unwrap().status == TaskStatus::Completed {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(manager.get(first).unwrap().status, TaskStatus::Completed);

        // slot is free again
        assert!(manager
            .submit("embed", |_| async { Ok(serde_json::Value::Null) })
            .is_ok());
    }

    #[tokio::test]
    async fn subscribers_replay_ring_then_stream_live() {
        let manager = manager();
        let (go_tx, go_rx) = tokio::sync::oneshot::channel::<()>();

        let id = manager
            .submit("parse", move |reporter| async move {
                reporter.emit("parse", 1, 2, Some("src/a.ts"));
                let _ = go_rx.await;
                reporter.emit("parse", 2, 2, Some("src/b.ts"));
                Ok(serde_json::json!({"parsed": 2}))
            })
            .unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;
        let (replay, mut live) = manager.subscribe(id).unwrap();
        assert_eq!(replay.len(), 1);
        assert!(matches!(replay[0], TaskEvent::Progress { .. }));

        go_tx.send(()).unwrap();
        let second = live.recv().await.unwrap();
        assert!(matches!(second, TaskEvent::Progress { .. }));
        let done = live.recv().await.unwrap();
        match done {
            TaskEvent::Done { result } => assert_eq!(result["parsed"], 2),
            other => panic!("expected done, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn failure_is_recorded_and_streamed() {
        let manager = manager();
        let id = manager
            .submit("sync", |_| async { Err(anyhow::anyhow!("git pull failed")) })
            .unwrap();

        for _ in 0..50 {
            if manager.get(id).unwrap().status == TaskStatus::Failed {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let snapshot = manager.get(id).unwrap();
        assert_eq!(snapshot.status, TaskStatus::Failed);
        assert!(snapshot.error.unwrap().contains("git pull failed"));
    }

    #[tokio::test]
    async fn timeout_flips_task_to_failed() {
        let manager = Arc::new(TaskManager::new(Some(Duration::from_millis(20))));
        let id = manager
            .submit("slow", |_| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(serde_json::Value::Null)
            })
            .unwrap();

        for _ in 0..100 {
            if manager.get(id).unwrap().status == TaskStatus::Failed {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let snapshot = manager.get(id).unwrap();
        assert_eq!(snapshot.status, TaskStatus::Failed);
        assert!(snapshot.error.unwrap().contains("wall-clock budget"));
    }

    #[test]
    fn progress_event_serializes_flat() {
        let event = TaskEvent::Progress {
            event: ProgressEvent {
                stage: "embed".to_owned(),
                current: 3,
                total: 10,
                subject: None,
            },
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "progress");
        assert_eq!(json["stage"], "embed");
        assert_eq!(json["current"], 3);
        assert!(json.get("subject").is_none());
    }
}

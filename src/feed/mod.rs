//! Live update feed: authoritative changes pushed by the server.
//!
//! Every event is wrapped in a [`FeedEnvelope`] naming the project it belongs
//! to. The reconciler ignores envelopes for projects it is not subscribed to.

pub mod ws;

use crate::models::{EntityId, List, Task};
use crate::reconciler::Reconciler;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

pub use ws::WsFeed;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ProjectEvent {
    #[serde(rename = "list.created")]
    ListCreated { list: List },

    #[serde(rename = "list.updated")]
    ListUpdated { list: List },

    #[serde(rename = "list.deleted")]
    ListDeleted {
        #[serde(rename = "listId")]
        list_id: EntityId,
    },

    /// The complete column order of the project
    #[serde(rename = "lists.reordered")]
    ListsReordered { lists: Vec<List> },

    #[serde(rename = "task.created")]
    TaskCreated { task: Task },

    #[serde(rename = "task.updated")]
    TaskUpdated { task: Task },

    #[serde(rename = "task.deleted")]
    TaskDeleted {
        #[serde(rename = "taskId")]
        task_id: EntityId,
    },

    /// The complete contents of one list, in order
    #[serde(rename = "tasks.reordered")]
    TasksReordered {
        #[serde(rename = "listId")]
        list_id: EntityId,
        tasks: Vec<Task>,
    },
}

impl ProjectEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            ProjectEvent::ListCreated { .. } => "list.created",
            ProjectEvent::ListUpdated { .. } => "list.updated",
            ProjectEvent::ListDeleted { .. } => "list.deleted",
            ProjectEvent::ListsReordered { .. } => "lists.reordered",
            ProjectEvent::TaskCreated { .. } => "task.created",
            ProjectEvent::TaskUpdated { .. } => "task.updated",
            ProjectEvent::TaskDeleted { .. } => "task.deleted",
            ProjectEvent::TasksReordered { .. } => "tasks.reordered",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedEnvelope {
    pub project_id: EntityId,
    pub event: ProjectEvent,
}

impl FeedEnvelope {
    pub fn new(project_id: impl Into<EntityId>, event: ProjectEvent) -> Self {
        Self {
            project_id: project_id.into(),
            event,
        }
    }
}

/// Drain `rx` into the reconciler until the sender side closes.
/// Returns how many envelopes were applied.
pub async fn pump_feed(reconciler: &Reconciler, mut rx: mpsc::Receiver<FeedEnvelope>) -> usize {
    let mut applied = 0;
    while let Some(envelope) = rx.recv().await {
        if reconciler.apply_remote_update(envelope).await {
            applied += 1;
        }
    }
    tracing::debug!(applied, "Live feed channel closed");
    applied
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope_wire_format() {
        let envelope: FeedEnvelope = serde_json::from_value(json!({
            "projectId": "p1",
            "event": {"type": "list.deleted", "listId": "l2"}
        }))
        .unwrap();

        assert_eq!(envelope.project_id, EntityId::from("p1"));
        assert_eq!(
            envelope.event,
            ProjectEvent::ListDeleted {
                list_id: "l2".into()
            }
        );
        assert_eq!(envelope.event.kind(), "list.deleted");
    }

    #[test]
    fn test_tasks_reordered_carries_list() {
        let envelope: FeedEnvelope = serde_json::from_value(json!({
            "projectId": "p1",
            "event": {
                "type": "tasks.reordered",
                "listId": "l1",
                "tasks": [{
                    "id": "t1", "title": "A", "listId": "l1", "projectId": "p1",
                    "position": 0, "priority": "high", "userId": "u1"
                }]
            }
        }))
        .unwrap();

        match envelope.event {
            ProjectEvent::TasksReordered { list_id, tasks } => {
                assert_eq!(list_id, EntityId::from("l1"));
                assert_eq!(tasks.len(), 1);
            },
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_unknown_event_type_is_rejected() {
        let parsed = serde_json::from_value::<FeedEnvelope>(json!({
            "projectId": "p1",
            "event": {"type": "project.archived"}
        }));
        assert!(parsed.is_err());
    }
}

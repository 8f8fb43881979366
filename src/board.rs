//! Read-only views of a board.

use crate::models::{EntityId, List, Project, Task};
use crate::ordering;
use crate::priority::Priority;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// A consistent copy of the board taken under one read lock
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardSnapshot {
    pub project: Option<Project>,
    pub lists: Vec<List>,
    pub tasks: Vec<Task>,
    pub selected: Vec<EntityId>,
    pub revision: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListSummary {
    pub list_id: EntityId,
    pub title: String,
    pub task_count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PriorityBreakdown {
    pub low: usize,
    pub medium: usize,
    pub high: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardSummary {
    pub lists: Vec<ListSummary>,
    pub total_tasks: usize,
    pub by_priority: PriorityBreakdown,
    pub overdue: usize,
}

impl BoardSnapshot {
    /// Lists in column order
    pub fn ordered_lists(&self) -> Vec<&List> {
        let mut lists: Vec<&List> = self.lists.iter().collect();
        lists.sort_by_key(|l| l.position);
        lists
    }

    pub fn tasks_in(&self, list_id: &EntityId) -> Vec<&Task> {
        ordering::tasks_in(&self.tasks, list_id)
    }

    pub fn summary(&self) -> BoardSummary {
        self.summary_at(Utc::now())
    }

    pub fn summary_at(&self, now: DateTime<Utc>) -> BoardSummary {
        let lists = self
            .ordered_lists()
            .into_iter()
            .map(|l| ListSummary {
                list_id: l.id.clone(),
                title: l.title.clone(),
                task_count: self.tasks.iter().filter(|t| t.list_id == l.id).count(),
            })
            .collect();

        let mut by_priority = PriorityBreakdown::default();
        for task in &self.tasks {
            match task.priority {
                Priority::Low => by_priority.low += 1,
                Priority::Medium => by_priority.medium += 1,
                Priority::High => by_priority.high += 1,
            }
        }

        BoardSummary {
            lists,
            total_tasks: self.tasks.len(),
            by_priority,
            overdue: self.tasks.iter().filter(|t| t.is_overdue(now)).count(),
        }
    }
}

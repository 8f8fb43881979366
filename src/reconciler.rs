//! Board reconciler: the single owner of a project's lists and tasks.
//!
//! Every mutation follows the same shape. Under the write lock it checks its
//! preconditions, copies the state it is about to touch, applies the change
//! and releases the lock. It then awaits the gateway without holding any lock
//! and finally re-takes the lock to either keep the change or put its own copy
//! back. Two operations may therefore be in flight at once; if the earlier one
//! fails, its rollback also discards whatever the later one did to the same
//! collection.

use crate::board::BoardSnapshot;
use crate::error::{BoardError, Result};
use crate::feed::{FeedEnvelope, ProjectEvent};
use crate::gateway::Gateway;
use crate::models::{
    CreateListRequest, CreateTaskRequest, EntityId, List, ListPosition, Project, Task, TaskDraft,
    TaskPatch, TaskPosition, UserId,
};
use crate::ordering;
use crate::permissions::{require, Action, PermissionOracle, Role};
use crate::selection::Selection;
use crate::{log_board_operation, log_rollback};
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Arc;
use tokio::sync::{watch, RwLock};

#[derive(Debug, Default)]
struct BoardState {
    project: Option<Project>,
    lists: Vec<List>,
    tasks: Vec<Task>,
    selection: Selection,
    subscribed: Option<EntityId>,
}

impl BoardState {
    fn has_list(&self, list_id: &EntityId) -> bool {
        self.lists.iter().any(|l| &l.id == list_id)
    }

    fn task_index(&self, task_id: &EntityId) -> Option<usize> {
        self.tasks.iter().position(|t| &t.id == task_id)
    }

    fn require_list(&self, list_id: &EntityId) -> Result<()> {
        if self.has_list(list_id) {
            Ok(())
        } else {
            Err(BoardError::not_found("list", list_id))
        }
    }

    /// Remove a list and its tasks in one step
    fn remove_list(&mut self, list_id: &EntityId) -> bool {
        let before = self.lists.len();
        self.lists.retain(|l| &l.id != list_id);
        if self.lists.len() == before {
            return false;
        }
        let removed: Vec<EntityId> = self
            .tasks
            .iter()
            .filter(|t| &t.list_id == list_id)
            .map(|t| t.id.clone())
            .collect();
        self.tasks.retain(|t| &t.list_id != list_id);
        self.selection.forget(&removed);
        ordering::renumber_lists(&mut self.lists);
        true
    }

    /// Drop tasks whose list is gone
    fn drop_orphans(&mut self) {
        let known: HashSet<EntityId> = self.lists.iter().map(|l| l.id.clone()).collect();
        let orphans: Vec<EntityId> = self
            .tasks
            .iter()
            .filter(|t| !known.contains(&t.list_id))
            .map(|t| t.id.clone())
            .collect();
        if !orphans.is_empty() {
            self.tasks.retain(|t| known.contains(&t.list_id));
            self.selection.forget(&orphans);
        }
    }

    /// Put back a tasks snapshot. Tasks whose list was removed since the
    /// snapshot was taken stay removed.
    fn restore_tasks(&mut self, snapshot: Vec<Task>) {
        self.tasks = snapshot;
        self.drop_orphans();
    }

    /// Put back the column order of a snapshot. Lists removed since stay
    /// removed; lists added since follow the restored ones.
    fn restore_list_order(&mut self, snapshot: &[List]) {
        let rank: HashMap<&EntityId, usize> = snapshot.iter().map(|l| (&l.id, l.position)).collect();
        let mut lists = std::mem::take(&mut self.lists);
        lists.sort_by_key(|l| match rank.get(&l.id) {
            Some(&position) => (0, position),
            None => (1, l.position),
        });
        for (position, list) in lists.iter_mut().enumerate() {
            list.position = position;
        }
        self.lists = lists;
    }

    /// Undo a list delete: the list returns to its old column with the tasks
    /// it held
    fn restore_list(&mut self, list_id: &EntityId, lists: &[List], tasks: Vec<Task>) {
        if self.has_list(list_id) {
            return;
        }
        let Some(list) = lists.iter().find(|l| &l.id == list_id).cloned() else {
            return;
        };
        let mut ordered = std::mem::take(&mut self.lists);
        ordered.sort_by_key(|l| l.position);
        let at = list.position.min(ordered.len());
        ordered.insert(at, list);
        for (position, l) in ordered.iter_mut().enumerate() {
            l.position = position;
        }
        self.lists = ordered;

        let present: HashSet<EntityId> = self.tasks.iter().map(|t| t.id.clone()).collect();
        self.tasks.extend(
            tasks
                .into_iter()
                .filter(|t| &t.list_id == list_id && !present.contains(&t.id)),
        );
        ordering::renumber_list(&mut self.tasks, list_id);
    }

    /// Move the selection mark from a provisional id to its confirmed id
    fn carry_selection(&mut self, from: &EntityId, to: &EntityId) {
        if self.selection.contains(from) {
            self.selection.forget([from]);
            if !self.selection.contains(to) {
                self.selection.toggle(to);
            }
        }
    }

    /// Replace the persisted lists with `incoming`; local provisional lists
    /// follow them.
    fn replace_lists(&mut self, mut incoming: Vec<List>) {
        incoming.sort_by_key(|l| l.position);
        let mut provisional: Vec<List> = self
            .lists
            .iter()
            .filter(|l| l.id.is_temporary())
            .cloned()
            .collect();
        provisional.sort_by_key(|l| l.position);
        incoming.extend(provisional);
        for (position, list) in incoming.iter_mut().enumerate() {
            list.position = position;
        }
        self.lists = incoming;
        self.drop_orphans();
    }

    fn upsert_list(&mut self, list: List) {
        let mut lists: Vec<List> = self
            .lists
            .drain(..)
            .filter(|l| l.id != list.id)
            .collect();
        lists.sort_by_key(|l| l.position);
        let persisted = lists.iter().filter(|l| !l.id.is_temporary()).count();
        let at = list.position.min(persisted);
        lists.insert(at, list);
        for (position, l) in lists.iter_mut().enumerate() {
            l.position = position;
        }
        self.lists = lists;
    }

    fn upsert_task(&mut self, task: Task) -> bool {
        if !self.has_list(&task.list_id) {
            return false;
        }
        if let Some(i) = self.task_index(&task.id) {
            let old = self.tasks.remove(i);
            if old.list_id != task.list_id {
                ordering::renumber_list(&mut self.tasks, &old.list_id);
            }
        }

        let list_id = task.list_id.clone();
        let mut seq = ordering::ordered_task_ids(&self.tasks, &list_id);
        let persisted = seq.iter().filter(|id| !id.is_temporary()).count();
        seq.insert(task.position.min(persisted), task.id.clone());
        self.tasks.push(task);
        ordering::set_sequence(&mut self.tasks, &list_id, &seq);
        true
    }

    /// Make `incoming` the persisted content of `list_id`; local provisional
    /// tasks of that list follow them.
    fn replace_list_tasks(&mut self, list_id: &EntityId, mut incoming: Vec<Task>) -> bool {
        if !self.has_list(list_id) {
            return false;
        }
        let incoming_ids: HashSet<EntityId> = incoming.iter().map(|t| t.id.clone()).collect();

        let mut other_lists: Vec<EntityId> = Vec::new();
        let mut dropped: Vec<EntityId> = Vec::new();
        for t in &self.tasks {
            if &t.list_id == list_id {
                if !t.id.is_temporary() && !incoming_ids.contains(&t.id) {
                    dropped.push(t.id.clone());
                }
            } else if incoming_ids.contains(&t.id) && !other_lists.contains(&t.list_id) {
                other_lists.push(t.list_id.clone());
            }
        }
        let provisional: Vec<EntityId> = ordering::ordered_task_ids(&self.tasks, list_id)
            .into_iter()
            .filter(|id| id.is_temporary())
            .collect();

        self.tasks.retain(|t| {
            let persisted_here = &t.list_id == list_id && !t.id.is_temporary();
            !persisted_here && !incoming_ids.contains(&t.id)
        });

        incoming.sort_by_key(|t| t.position);
        let mut seq: Vec<EntityId> = Vec::with_capacity(incoming.len() + provisional.len());
        for mut task in incoming {
            task.list_id = list_id.clone();
            seq.push(task.id.clone());
            self.tasks.push(task);
        }
        seq.extend(provisional);
        ordering::set_sequence(&mut self.tasks, list_id, &seq);

        for other in &other_lists {
            ordering::renumber_list(&mut self.tasks, other);
        }
        self.selection.forget(&dropped);
        true
    }
}

/// Decrements the in-flight counter when the gateway call finishes
struct SavingGuard<'a>(&'a AtomicUsize);

impl Drop for SavingGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, AtomicOrdering::SeqCst);
    }
}

fn persistence_failure(operation: &'static str, error: BoardError) -> BoardError {
    log_rollback!(operation, error);
    BoardError::PersistenceFailure {
        operation,
        reason: error.to_string(),
    }
}

fn require_title(title: &str) -> Result<String> {
    let title = title.trim();
    if title.is_empty() {
        return Err(BoardError::ValidationError("Title cannot be empty".into()));
    }
    Ok(title.to_string())
}

fn require_persisted(kind: &str, id: &EntityId) -> Result<()> {
    if id.is_temporary() {
        return Err(BoardError::ValidationError(format!(
            "{} {} has not been saved yet",
            kind, id
        )));
    }
    Ok(())
}

/// Reorder batch for the given lists: every persisted task with its list
/// and current position
fn reorder_payload(tasks: &[Task], list_ids: &[EntityId]) -> Vec<TaskPosition> {
    let mut seen: HashSet<&EntityId> = HashSet::new();
    let mut payload = Vec::new();
    for list_id in list_ids {
        if !seen.insert(list_id) {
            continue;
        }
        for task in ordering::tasks_in(tasks, list_id) {
            if task.id.is_temporary() {
                continue;
            }
            payload.push(TaskPosition {
                id: task.id.clone(),
                list_id: Some(list_id.clone()),
                position: task.position,
            });
        }
    }
    payload
}

fn list_payload(lists: &[List]) -> Vec<ListPosition> {
    lists
        .iter()
        .filter(|l| !l.id.is_temporary())
        .map(|l| ListPosition {
            id: l.id.clone(),
            position: l.position,
        })
        .collect()
}

pub struct Reconciler {
    gateway: Arc<dyn Gateway>,
    oracle: Arc<dyn PermissionOracle>,
    user: Option<UserId>,
    state: RwLock<BoardState>,
    in_flight: AtomicUsize,
    revision: watch::Sender<u64>,
}

impl Reconciler {
    /// `user` is the signed-in session; `None` rejects every operation with
    /// `Unauthorized`.
    pub fn new(
        gateway: Arc<dyn Gateway>,
        oracle: Arc<dyn PermissionOracle>,
        user: Option<UserId>,
    ) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            gateway,
            oracle,
            user,
            state: RwLock::new(BoardState::default()),
            in_flight: AtomicUsize::new(0),
            revision,
        }
    }

    pub fn user(&self) -> Option<&UserId> {
        self.user.as_ref()
    }

    fn session(&self) -> Result<&UserId> {
        self.user.as_ref().ok_or(BoardError::Unauthorized)
    }

    fn bump(&self) {
        self.revision.send_modify(|r| *r = r.wrapping_add(1));
    }

    fn begin_save(&self) -> SavingGuard<'_> {
        self.in_flight.fetch_add(1, AtomicOrdering::SeqCst);
        SavingGuard(&self.in_flight)
    }

    async fn active_project(&self) -> Result<EntityId> {
        self.state
            .read()
            .await
            .project
            .as_ref()
            .map(|p| p.id.clone())
            .ok_or_else(|| BoardError::ValidationError("No project loaded".into()))
    }

    async fn current_role(&self) -> Result<Option<Role>> {
        let user = self.session()?;
        let project_id = self.active_project().await?;
        self.oracle.role(&project_id, user).await
    }

    fn check(&self, role: Option<Role>, action: Action) -> Result<()> {
        require(self.oracle.as_ref(), role, action).inspect_err(|_| {
            tracing::warn!(action = %action, "Permission denied");
        })
    }

    async fn authorize(&self, action: Action) -> Result<Option<Role>> {
        let role = self.current_role().await?;
        self.check(role, action)?;
        Ok(role)
    }

    /// Fetch a project and make it the board's content
    pub async fn load_project(&self, project_id: &EntityId) -> Result<()> {
        self.session()?;
        let data = self.gateway.fetch_board(project_id).await?;
        let mut lists = data.lists;
        let mut tasks = data.tasks;
        let report = ordering::normalize_board(&mut lists, &mut tasks);
        if !report.is_clean() {
            tracing::warn!(
                project = %project_id,
                lists_renumbered = report.lists_renumbered,
                task_lists_renumbered = report.task_lists_renumbered.len(),
                orphans_dropped = report.orphans_dropped.len(),
                "Server positions were not dense, renumbered"
            );
        }

        let mut state = self.state.write().await;
        if state.subscribed.as_ref().is_some_and(|s| s != project_id) {
            state.subscribed = None;
        }
        tracing::info!(
            project = %project_id,
            lists = lists.len(),
            tasks = tasks.len(),
            "Board loaded"
        );
        state.project = Some(data.project);
        state.lists = lists;
        state.tasks = tasks;
        state.selection.clear();
        drop(state);
        self.bump();
        Ok(())
    }

    /// Merge the server's view of reordered tasks, id by id.
    ///
    /// The merge is kept only if every affected list stays dense.
    async fn merge_reordered(&self, confirmed: Vec<Task>, touched: &[EntityId]) {
        let mut state = self.state.write().await;
        let mut merged = state.tasks.clone();
        let index: HashMap<EntityId, usize> = merged
            .iter()
            .enumerate()
            .map(|(i, t)| (t.id.clone(), i))
            .collect();

        let mut check: Vec<EntityId> = touched.to_vec();
        let mut changed = false;
        for server_task in confirmed {
            let Some(&i) = index.get(&server_task.id) else {
                continue;
            };
            if !state.has_list(&server_task.list_id) {
                tracing::warn!(
                    task = %server_task.id,
                    list = %server_task.list_id,
                    "Reorder response names an unknown list, keeping local order"
                );
                return;
            }
            if !check.contains(&merged[i].list_id) {
                check.push(merged[i].list_id.clone());
            }
            if !check.contains(&server_task.list_id) {
                check.push(server_task.list_id.clone());
            }
            if merged[i] != server_task {
                merged[i] = server_task;
                changed = true;
            }
        }

        if !changed {
            return;
        }
        if let Some(bad) = check
            .iter()
            .find(|list_id| !ordering::list_is_dense(&merged, list_id))
        {
            tracing::warn!(list = %bad, "Reorder response breaks position order, keeping local order");
            return;
        }
        state.tasks = merged;
        drop(state);
        self.bump();
    }

    async fn confirm_reorder(
        &self,
        operation: &'static str,
        payload: Vec<TaskPosition>,
        touched: Vec<EntityId>,
        snapshot: Vec<Task>,
    ) -> Result<()> {
        if payload.is_empty() {
            log_board_operation!(operation, "skipped", "nothing persisted to reorder");
            return Ok(());
        }
        let result = {
            let _saving = self.begin_save();
            self.gateway.reorder_tasks(&payload).await
        };
        match result {
            Ok(response) => {
                if let Some(confirmed) = response {
                    self.merge_reordered(confirmed, &touched).await;
                }
                tracing::info!(operation, entries = payload.len(), "Reorder confirmed");
                Ok(())
            },
            Err(e) => {
                self.state.write().await.restore_tasks(snapshot);
                self.bump();
                Err(persistence_failure(operation, e))
            },
        }
    }

    /// Move a task to `target_index` of `target_list_id`
    pub async fn move_task(
        &self,
        task_id: &EntityId,
        target_list_id: &EntityId,
        target_index: usize,
    ) -> Result<()> {
        self.authorize(Action::TaskReorder).await?;
        let (payload, touched, snapshot) = {
            let mut state = self.state.write().await;
            state.require_list(target_list_id)?;
            require_persisted("List", target_list_id)?;
            let snapshot = state.tasks.clone();
            let source =
                ordering::move_task(&mut state.tasks, task_id, target_list_id, target_index)?;
            let touched = vec![source, target_list_id.clone()];
            let payload = reorder_payload(&state.tasks, &touched);
            (payload, touched, snapshot)
        };
        self.bump();
        log_board_operation!("move_task", "applied", task_id);

        self.confirm_reorder("move_task", payload, touched, snapshot)
            .await
    }

    /// Append several tasks, in display order, to the end of `target_list_id`
    pub async fn move_tasks(&self, task_ids: &[EntityId], target_list_id: &EntityId) -> Result<()> {
        self.authorize(Action::TaskReorder).await?;
        let mut ids: Vec<EntityId> = Vec::with_capacity(task_ids.len());
        for id in task_ids {
            if !ids.contains(id) {
                ids.push(id.clone());
            }
        }
        if ids.is_empty() {
            return Err(BoardError::ValidationError("No tasks to move".into()));
        }

        let (payload, touched, snapshot) = {
            let mut state = self.state.write().await;
            state.require_list(target_list_id)?;
            require_persisted("List", target_list_id)?;
            let snapshot = state.tasks.clone();
            let BoardState { lists, tasks, .. } = &mut *state;
            let touched = ordering::move_tasks_to_end(tasks, lists, &ids, target_list_id)?;
            let payload = reorder_payload(tasks, &touched);
            (payload, touched, snapshot)
        };
        self.bump();
        log_board_operation!("move_tasks", "applied", format!("{} tasks", ids.len()));

        self.confirm_reorder("move_tasks", payload, touched, snapshot)
            .await
    }

    /// Move a list to `target_index` in the column order
    pub async fn move_list(&self, list_id: &EntityId, target_index: usize) -> Result<()> {
        self.authorize(Action::ListReorder).await?;

        let (payload, snapshot) = {
            let mut state = self.state.write().await;
            state.require_list(list_id)?;
            let snapshot = state.lists.clone();
            ordering::move_list(&mut state.lists, list_id, target_index)?;
            (list_payload(&state.lists), snapshot)
        };
        self.bump();
        log_board_operation!("move_list", "applied", list_id);

        if payload.is_empty() {
            return Ok(());
        }
        let result = {
            let _saving = self.begin_save();
            self.gateway.reorder_lists(&payload).await
        };
        match result {
            Ok(()) => {
                tracing::info!(list = %list_id, "List move confirmed");
                Ok(())
            },
            Err(e) => {
                self.state.write().await.restore_list_order(&snapshot);
                self.bump();
                Err(persistence_failure("move_list", e))
            },
        }
    }

    /// Append a task to a list under a temporary id until the server confirms it
    pub async fn create_task(&self, list_id: &EntityId, draft: TaskDraft) -> Result<Task> {
        let user = self.session()?.clone();
        self.authorize(Action::TaskCreate).await?;
        let title = require_title(&draft.title)?;

        let (temp_id, request) = {
            let mut state = self.state.write().await;
            state.require_list(list_id)?;
            require_persisted("List", list_id)?;
            let project_id = state
                .project
                .as_ref()
                .map(|p| p.id.clone())
                .ok_or_else(|| BoardError::ValidationError("No project loaded".into()))?;

            let position = state.tasks.iter().filter(|t| &t.list_id == list_id).count();
            let now = Utc::now();
            let temp_id = EntityId::temporary();
            state.tasks.push(Task {
                id: temp_id.clone(),
                title: title.clone(),
                description: draft.description.clone(),
                list_id: list_id.clone(),
                project_id: project_id.clone(),
                position,
                priority: draft.priority,
                due_date: draft.due_date,
                assignee_id: draft.assignee_id.clone(),
                user_id: user,
                created_at: Some(now),
                updated_at: Some(now),
            });
            let request = CreateTaskRequest {
                title,
                description: draft.description,
                priority: draft.priority,
                list_id: list_id.clone(),
                project_id,
                position,
                due_date: draft.due_date,
                assignee_id: draft.assignee_id,
            };
            (temp_id, request)
        };
        self.bump();
        log_board_operation!("create_task", "applied", temp_id);

        let result = {
            let _saving = self.begin_save();
            self.gateway.create_task(&request).await
        };

        let mut state = self.state.write().await;
        match result {
            Ok(mut confirmed) => {
                let echoed = state.task_index(&confirmed.id);
                match (state.task_index(&temp_id), echoed) {
                    // the feed delivered the task first; its entry is authoritative
                    (Some(_), Some(_)) => {
                        ordering::remove_tasks(&mut state.tasks, std::slice::from_ref(&temp_id));
                        state.carry_selection(&temp_id, &confirmed.id);
                        if let Some(j) = state.task_index(&confirmed.id) {
                            confirmed = state.tasks[j].clone();
                        }
                    },
                    (Some(i), None) => {
                        confirmed.list_id = state.tasks[i].list_id.clone();
                        confirmed.position = state.tasks[i].position;
                        state.carry_selection(&temp_id, &confirmed.id);
                        state.tasks[i] = confirmed.clone();
                    },
                    (None, Some(j)) => {
                        confirmed = state.tasks[j].clone();
                    },
                    (None, None) if state.has_list(&confirmed.list_id) => {
                        confirmed.position = state
                            .tasks
                            .iter()
                            .filter(|t| t.list_id == confirmed.list_id)
                            .count();
                        state.tasks.push(confirmed.clone());
                    },
                    (None, None) => {
                        tracing::debug!(task = %confirmed.id, "Created task's list is gone locally");
                    },
                }
                drop(state);
                self.bump();
                tracing::info!(task = %confirmed.id, "Task created");
                Ok(confirmed)
            },
            Err(e) => {
                ordering::remove_tasks(&mut state.tasks, std::slice::from_ref(&temp_id));
                state.selection.forget([&temp_id]);
                drop(state);
                self.bump();
                Err(persistence_failure("create_task", e))
            },
        }
    }

    /// Append a list under a temporary id until the server confirms it
    pub async fn create_list(&self, title: &str) -> Result<List> {
        self.authorize(Action::ListCreate).await?;
        let title = require_title(title)?;

        let (temp_id, request) = {
            let mut state = self.state.write().await;
            let project_id = state
                .project
                .as_ref()
                .map(|p| p.id.clone())
                .ok_or_else(|| BoardError::ValidationError("No project loaded".into()))?;
            let now = Utc::now();
            let temp_id = EntityId::temporary();
            let position = state.lists.len();
            state.lists.push(List {
                id: temp_id.clone(),
                title: title.clone(),
                project_id: project_id.clone(),
                position,
                created_at: Some(now),
                updated_at: Some(now),
            });
            (temp_id, CreateListRequest { title, project_id })
        };
        self.bump();
        log_board_operation!("create_list", "applied", temp_id);

        let result = {
            let _saving = self.begin_save();
            self.gateway.create_list(&request).await
        };

        let mut state = self.state.write().await;
        match result {
            Ok(mut confirmed) => {
                let provisional = state.lists.iter().position(|l| l.id == temp_id);
                let echoed = state.lists.iter().position(|l| l.id == confirmed.id);
                match (provisional, echoed) {
                    (Some(i), Some(_)) => {
                        state.lists.remove(i);
                        ordering::renumber_lists(&mut state.lists);
                        if let Some(list) = state.lists.iter().find(|l| l.id == confirmed.id) {
                            confirmed = list.clone();
                        }
                    },
                    (Some(i), None) => {
                        confirmed.position = state.lists[i].position;
                        state.lists[i] = confirmed.clone();
                    },
                    (None, Some(j)) => {
                        confirmed = state.lists[j].clone();
                    },
                    (None, None) => {
                        confirmed.position = state.lists.len();
                        state.lists.push(confirmed.clone());
                    },
                }
                drop(state);
                self.bump();
                tracing::info!(list = %confirmed.id, "List created");
                Ok(confirmed)
            },
            Err(e) => {
                state.lists.retain(|l| l.id != temp_id);
                ordering::renumber_lists(&mut state.lists);
                drop(state);
                self.bump();
                Err(persistence_failure("create_list", e))
            },
        }
    }

    /// Apply a partial update; on failure only the touched fields are restored
    pub async fn update_task(&self, task_id: &EntityId, patch: TaskPatch) -> Result<Task> {
        if patch.is_empty() {
            return Err(BoardError::ValidationError("No updates provided".into()));
        }
        if let Some(title) = &patch.title {
            require_title(title)?;
        }
        require_persisted("Task", task_id)?;

        let role = self.authorize(Action::TaskUpdate).await?;
        if patch.touches_assignee() {
            let current = self
                .task(task_id)
                .await
                .ok_or_else(|| BoardError::not_found("task", task_id))?;
            if patch.assignee_id.as_ref() != Some(&current.assignee_id) {
                self.check(role, Action::TaskAssign)?;
            }
        }

        let previous = {
            let mut state = self.state.write().await;
            let i = state
                .task_index(task_id)
                .ok_or_else(|| BoardError::not_found("task", task_id))?;
            let previous = state.tasks[i].clone();
            patch.apply_to(&mut state.tasks[i]);
            state.tasks[i].updated_at = Some(Utc::now());
            previous
        };
        self.bump();
        log_board_operation!("update_task", "applied", task_id);

        let result = {
            let _saving = self.begin_save();
            self.gateway.update_task(task_id, &patch).await
        };

        let mut state = self.state.write().await;
        match result {
            Ok(confirmed) => {
                let Some(i) = state.task_index(task_id) else {
                    // saved, but removed locally while the request was out
                    drop(state);
                    tracing::debug!(task = %task_id, "Updated task is gone locally");
                    return Ok(confirmed.unwrap_or_else(|| {
                        let mut task = previous;
                        patch.apply_to(&mut task);
                        task
                    }));
                };
                if let Some(mut confirmed) = confirmed {
                    confirmed.list_id = state.tasks[i].list_id.clone();
                    confirmed.position = state.tasks[i].position;
                    state.tasks[i] = confirmed;
                }
                let task = state.tasks[i].clone();
                drop(state);
                self.bump();
                tracing::info!(task = %task_id, "Task update confirmed");
                Ok(task)
            },
            Err(e) => {
                if let Some(i) = state.task_index(task_id) {
                    patch.restore_from(&previous, &mut state.tasks[i]);
                }
                drop(state);
                self.bump();
                Err(persistence_failure("update_task", e))
            },
        }
    }

    pub async fn rename_list(&self, list_id: &EntityId, title: &str) -> Result<List> {
        self.authorize(Action::ListCreate).await?;
        let title = require_title(title)?;
        require_persisted("List", list_id)?;

        let (previous_title, previous_updated) = {
            let mut state = self.state.write().await;
            let list = state
                .lists
                .iter_mut()
                .find(|l| &l.id == list_id)
                .ok_or_else(|| BoardError::not_found("list", list_id))?;
            let previous = (list.title.clone(), list.updated_at);
            list.title = title.clone();
            list.updated_at = Some(Utc::now());
            previous
        };
        self.bump();
        log_board_operation!("rename_list", "applied", list_id);

        let result = {
            let _saving = self.begin_save();
            self.gateway.update_list(list_id, &title).await
        };

        let mut state = self.state.write().await;
        let Some(list) = state.lists.iter_mut().find(|l| &l.id == list_id) else {
            return match result {
                Ok(_) => Err(BoardError::not_found("list", list_id)),
                Err(e) => Err(persistence_failure("rename_list", e)),
            };
        };
        match result {
            Ok(confirmed) => {
                list.title = confirmed.title;
                list.updated_at = confirmed.updated_at.or(list.updated_at);
                let list = list.clone();
                drop(state);
                self.bump();
                tracing::info!(list = %list_id, "List rename confirmed");
                Ok(list)
            },
            Err(e) => {
                list.title = previous_title;
                list.updated_at = previous_updated;
                drop(state);
                self.bump();
                Err(persistence_failure("rename_list", e))
            },
        }
    }

    pub async fn delete_task(&self, task_id: &EntityId) -> Result<()> {
        self.authorize(Action::TaskDelete).await?;
        require_persisted("Task", task_id)?;

        let snapshot = {
            let mut state = self.state.write().await;
            if state.task_index(task_id).is_none() {
                return Err(BoardError::not_found("task", task_id));
            }
            let snapshot = state.tasks.clone();
            ordering::remove_tasks(&mut state.tasks, std::slice::from_ref(task_id));
            state.selection.forget([task_id]);
            snapshot
        };
        self.bump();
        log_board_operation!("delete_task", "applied", task_id);

        let result = {
            let _saving = self.begin_save();
            self.gateway.delete_task(task_id).await
        };
        match result {
            Ok(()) => {
                tracing::info!(task = %task_id, "Task deleted");
                Ok(())
            },
            Err(e) => {
                self.state.write().await.restore_tasks(snapshot);
                self.bump();
                Err(persistence_failure("delete_task", e))
            },
        }
    }

    /// Delete several tasks with one gateway call. Returns the ids the
    /// server reports as deleted.
    pub async fn bulk_delete_tasks(&self, task_ids: &[EntityId]) -> Result<Vec<EntityId>> {
        self.authorize(Action::TaskDelete).await?;
        let mut ids: Vec<EntityId> = Vec::with_capacity(task_ids.len());
        for id in task_ids {
            require_persisted("Task", id)?;
            if !ids.contains(id) {
                ids.push(id.clone());
            }
        }
        if ids.is_empty() {
            return Err(BoardError::ValidationError("No tasks to delete".into()));
        }

        let snapshot = {
            let mut state = self.state.write().await;
            if let Some(missing) = ids.iter().find(|id| state.task_index(id).is_none()) {
                return Err(BoardError::not_found("task", missing));
            }
            let snapshot = state.tasks.clone();
            ordering::remove_tasks(&mut state.tasks, &ids);
            state.selection.forget(&ids);
            snapshot
        };
        self.bump();
        log_board_operation!("bulk_delete_tasks", "applied", format!("{} tasks", ids.len()));

        let result = {
            let _saving = self.begin_save();
            self.gateway.bulk_delete_tasks(&ids).await
        };
        match result {
            Ok(deleted) => {
                tracing::info!(count = deleted.len(), "Tasks deleted");
                Ok(deleted)
            },
            Err(e) => {
                self.state.write().await.restore_tasks(snapshot);
                self.bump();
                Err(persistence_failure("bulk_delete_tasks", e))
            },
        }
    }

    /// Delete a list together with its tasks
    pub async fn delete_list(&self, list_id: &EntityId) -> Result<()> {
        self.authorize(Action::ListDelete).await?;
        require_persisted("List", list_id)?;

        let (lists_snapshot, tasks_snapshot) = {
            let mut state = self.state.write().await;
            state.require_list(list_id)?;
            let snapshot = (state.lists.clone(), state.tasks.clone());
            state.remove_list(list_id);
            snapshot
        };
        self.bump();
        log_board_operation!("delete_list", "applied", list_id);

        let result = {
            let _saving = self.begin_save();
            self.gateway.delete_list(list_id).await
        };
        match result {
            Ok(()) => {
                tracing::info!(list = %list_id, "List deleted");
                Ok(())
            },
            Err(e) => {
                self.state
                    .write()
                    .await
                    .restore_list(list_id, &lists_snapshot, tasks_snapshot);
                self.bump();
                Err(persistence_failure("delete_list", e))
            },
        }
    }

    /// Apply an authoritative change from the live feed.
    ///
    /// Returns false when the envelope was ignored: not subscribed to its
    /// project, or it names a list the board does not have.
    pub async fn apply_remote_update(&self, envelope: FeedEnvelope) -> bool {
        let mut state = self.state.write().await;
        if state.subscribed.as_ref() != Some(&envelope.project_id) {
            tracing::debug!(
                project = %envelope.project_id,
                event = envelope.event.kind(),
                "Ignoring feed event for unsubscribed project"
            );
            return false;
        }

        let kind = envelope.event.kind();
        let applied = match envelope.event {
            ProjectEvent::ListCreated { list } | ProjectEvent::ListUpdated { list } => {
                state.upsert_list(list);
                true
            },
            ProjectEvent::ListDeleted { list_id } => state.remove_list(&list_id),
            ProjectEvent::ListsReordered { lists } => {
                state.replace_lists(lists);
                true
            },
            ProjectEvent::TaskCreated { task } | ProjectEvent::TaskUpdated { task } => {
                state.upsert_task(task)
            },
            ProjectEvent::TaskDeleted { task_id } => {
                let removed =
                    ordering::remove_tasks(&mut state.tasks, std::slice::from_ref(&task_id));
                state.selection.forget([&task_id]);
                !removed.is_empty()
            },
            ProjectEvent::TasksReordered { list_id, tasks } => {
                state.replace_list_tasks(&list_id, tasks)
            },
        };
        drop(state);

        if applied {
            self.bump();
            tracing::info!(event = kind, "Applied remote update");
        } else {
            tracing::debug!(event = kind, "Remote update did not match local state");
        }
        applied
    }

    /// Start accepting feed events for `project_id`
    pub async fn subscribe(&self, project_id: &EntityId) {
        self.state.write().await.subscribed = Some(project_id.clone());
        tracing::debug!(project = %project_id, "Subscribed to live feed");
    }

    pub async fn unsubscribe(&self) {
        if let Some(project) = self.state.write().await.subscribed.take() {
            tracing::debug!(project = %project, "Unsubscribed from live feed");
        }
    }

    pub async fn subscription(&self) -> Option<EntityId> {
        self.state.read().await.subscribed.clone()
    }

    pub async fn select_single(&self, task_id: &EntityId) {
        self.state.write().await.selection.select_single(task_id);
        self.bump();
    }

    pub async fn toggle_selection(&self, task_id: &EntityId) {
        self.state.write().await.selection.toggle(task_id);
        self.bump();
    }

    /// Select from the anchor to `task_id` in display order
    pub async fn select_range(&self, task_id: &EntityId) {
        {
            let mut state = self.state.write().await;
            let BoardState {
                tasks, selection, ..
            } = &mut *state;
            selection.select_range(tasks, task_id);
        }
        self.bump();
    }

    /// Select every task, or every task of one list
    pub async fn select_all(&self, list_id: Option<&EntityId>) {
        {
            let mut state = self.state.write().await;
            let ids: Vec<EntityId> = match list_id {
                Some(list_id) => ordering::ordered_task_ids(&state.tasks, list_id),
                None => state.tasks.iter().map(|t| t.id.clone()).collect(),
            };
            state.selection.select_all(ids);
        }
        self.bump();
    }

    pub async fn clear_selection(&self) {
        self.state.write().await.selection.clear();
        self.bump();
    }

    pub async fn selected_ids(&self) -> Vec<EntityId> {
        self.state.read().await.selection.ids()
    }

    pub async fn snapshot(&self) -> BoardSnapshot {
        let state = self.state.read().await;
        BoardSnapshot {
            project: state.project.clone(),
            lists: state.lists.clone(),
            tasks: state.tasks.clone(),
            selected: state.selection.ids(),
            revision: *self.revision.borrow(),
        }
    }

    /// Lists in column order
    pub async fn lists(&self) -> Vec<List> {
        let mut lists = self.state.read().await.lists.clone();
        lists.sort_by_key(|l| l.position);
        lists
    }

    /// Tasks of one list in display order
    pub async fn tasks_in(&self, list_id: &EntityId) -> Vec<Task> {
        let state = self.state.read().await;
        ordering::tasks_in(&state.tasks, list_id)
            .into_iter()
            .cloned()
            .collect()
    }

    pub async fn task(&self, task_id: &EntityId) -> Option<Task> {
        let state = self.state.read().await;
        state.tasks.iter().find(|t| &t.id == task_id).cloned()
    }

    pub async fn project(&self) -> Option<Project> {
        self.state.read().await.project.clone()
    }

    /// True while any gateway call is outstanding
    pub fn is_saving(&self) -> bool {
        self.in_flight.load(AtomicOrdering::SeqCst) > 0
    }

    /// Receiver that ticks on every committed change
    pub fn changes(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    pub fn revision(&self) -> u64 {
        *self.revision.borrow()
    }
}

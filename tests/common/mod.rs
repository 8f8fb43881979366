//! Common utilities for integration tests
//!
//! A scripted in-memory gateway plus board fixtures. The gateway records
//! every call before it responds, can hold a call until the test releases
//! it, and can be told to fail the next call of a given kind.

#![allow(dead_code)]

use async_trait::async_trait;
use kanban_sync::error::{BoardError, Result};
use kanban_sync::gateway::Gateway;
use kanban_sync::models::{
    BoardData, CreateListRequest, CreateTaskRequest, EntityId, List, ListPosition, Project, Task,
    TaskPatch, TaskPosition, UserId,
};
use kanban_sync::permissions::{Role, StaticRoles};
use kanban_sync::priority::Priority;
use kanban_sync::reconciler::Reconciler;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

pub const PROJECT: &str = "p1";
pub const OWNER: &str = "owner";
pub const MANAGER: &str = "mgr";
pub const MEMBER: &str = "mem";

#[derive(Debug, Clone)]
pub enum Call {
    FetchBoard(EntityId),
    CreateList(CreateListRequest),
    UpdateList(EntityId, String),
    DeleteList(EntityId),
    ReorderLists(Vec<ListPosition>),
    CreateTask(CreateTaskRequest),
    UpdateTask(EntityId, TaskPatch),
    DeleteTask(EntityId),
    ReorderTasks(Vec<TaskPosition>),
    BulkDelete(Vec<EntityId>),
}

impl Call {
    pub fn name(&self) -> &'static str {
        match self {
            Call::FetchBoard(_) => "fetch_board",
            Call::CreateList(_) => "create_list",
            Call::UpdateList(..) => "update_list",
            Call::DeleteList(_) => "delete_list",
            Call::ReorderLists(_) => "reorder_lists",
            Call::CreateTask(_) => "create_task",
            Call::UpdateTask(..) => "update_task",
            Call::DeleteTask(_) => "delete_task",
            Call::ReorderTasks(_) => "reorder_tasks",
            Call::BulkDelete(_) => "bulk_delete_tasks",
        }
    }
}

#[derive(Default)]
pub struct MockGateway {
    board: Mutex<Option<BoardData>>,
    calls: Mutex<Vec<Call>>,
    failures: Mutex<Vec<&'static str>>,
    holds: Mutex<HashMap<&'static str, Arc<Notify>>>,
    reorder_response: Mutex<Option<Vec<Task>>>,
    update_response: Mutex<Option<Task>>,
    next_id: AtomicUsize,
}

impl MockGateway {
    pub fn new(board: BoardData) -> Self {
        Self {
            board: Mutex::new(Some(board)),
            ..Default::default()
        }
    }

    /// Make the next call of `operation` fail with a 500
    pub fn fail_next(&self, operation: &'static str) {
        self.failures.lock().unwrap().push(operation);
    }

    /// Hold the next call of `operation` until the returned handle is notified
    pub fn hold_next(&self, operation: &'static str) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        self.holds
            .lock()
            .unwrap()
            .insert(operation, notify.clone());
        notify
    }

    /// Answer the next task reorder with this list of tasks
    pub fn respond_to_reorder(&self, tasks: Vec<Task>) {
        *self.reorder_response.lock().unwrap() = Some(tasks);
    }

    pub fn respond_to_update(&self, task: Task) {
        *self.update_response.lock().unwrap() = Some(task);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_named(&self, name: &str) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| c.name() == name)
            .collect()
    }

    /// Every call except the initial board fetch
    pub fn write_calls(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| !matches!(c, Call::FetchBoard(_)))
            .collect()
    }

    async fn enter(&self, call: Call) -> Result<()> {
        let name = call.name();
        self.calls.lock().unwrap().push(call);

        let hold = self.holds.lock().unwrap().remove(name);
        if let Some(notify) = hold {
            notify.notified().await;
        }

        let mut failures = self.failures.lock().unwrap();
        if let Some(i) = failures.iter().position(|f| *f == name) {
            failures.remove(i);
            return Err(BoardError::Gateway {
                status: 500,
                message: "Internal Server Error".into(),
            });
        }
        Ok(())
    }

    fn next_id(&self, prefix: &str) -> EntityId {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        EntityId::from(format!("{}-{}", prefix, n))
    }
}

#[async_trait]
impl Gateway for MockGateway {
    async fn fetch_board(&self, project_id: &EntityId) -> Result<BoardData> {
        self.enter(Call::FetchBoard(project_id.clone())).await?;
        self.board
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| BoardError::not_found("project", project_id))
    }

    async fn create_list(&self, request: &CreateListRequest) -> Result<List> {
        self.enter(Call::CreateList(request.clone())).await?;
        Ok(List {
            id: self.next_id("list"),
            title: request.title.clone(),
            project_id: request.project_id.clone(),
            position: 99,
            created_at: None,
            updated_at: None,
        })
    }

    async fn update_list(&self, list_id: &EntityId, title: &str) -> Result<List> {
        self.enter(Call::UpdateList(list_id.clone(), title.to_string()))
            .await?;
        Ok(list(list_id.as_str(), title, 99))
    }

    async fn delete_list(&self, list_id: &EntityId) -> Result<()> {
        self.enter(Call::DeleteList(list_id.clone())).await
    }

    async fn reorder_lists(&self, positions: &[ListPosition]) -> Result<()> {
        self.enter(Call::ReorderLists(positions.to_vec())).await
    }

    async fn create_task(&self, request: &CreateTaskRequest) -> Result<Task> {
        self.enter(Call::CreateTask(request.clone())).await?;
        let mut created = task(
            self.next_id("task").as_str(),
            request.list_id.as_str(),
            request.position,
        );
        created.title = request.title.clone();
        created.priority = request.priority;
        created.assignee_id = request.assignee_id.clone();
        Ok(created)
    }

    async fn update_task(&self, task_id: &EntityId, patch: &TaskPatch) -> Result<Option<Task>> {
        self.enter(Call::UpdateTask(task_id.clone(), patch.clone()))
            .await?;
        Ok(self.update_response.lock().unwrap().take())
    }

    async fn delete_task(&self, task_id: &EntityId) -> Result<()> {
        self.enter(Call::DeleteTask(task_id.clone())).await
    }

    async fn reorder_tasks(&self, positions: &[TaskPosition]) -> Result<Option<Vec<Task>>> {
        self.enter(Call::ReorderTasks(positions.to_vec())).await?;
        Ok(self.reorder_response.lock().unwrap().take())
    }

    async fn bulk_delete_tasks(&self, task_ids: &[EntityId]) -> Result<Vec<EntityId>> {
        self.enter(Call::BulkDelete(task_ids.to_vec())).await?;
        Ok(task_ids.to_vec())
    }
}

pub fn project() -> Project {
    Project {
        id: PROJECT.into(),
        name: "Launch".into(),
        description: None,
        owner_id: UserId::from(OWNER),
        due_date: None,
    }
}

pub fn list(id: &str, title: &str, position: usize) -> List {
    List {
        id: id.into(),
        title: title.into(),
        project_id: PROJECT.into(),
        position,
        created_at: None,
        updated_at: None,
    }
}

pub fn task(id: &str, list_id: &str, position: usize) -> Task {
    Task {
        id: id.into(),
        title: id.to_uppercase(),
        description: None,
        list_id: list_id.into(),
        project_id: PROJECT.into(),
        position,
        priority: Priority::Medium,
        due_date: None,
        assignee_id: None,
        user_id: UserId::from(OWNER),
        created_at: None,
        updated_at: None,
    }
}

/// Todo `[t1, t2, t3]`, Doing `[t4]`, Done `[]`
pub fn sample_board() -> BoardData {
    BoardData {
        project: project(),
        lists: vec![
            list("todo", "Todo", 0),
            list("doing", "Doing", 1),
            list("done", "Done", 2),
        ],
        tasks: vec![
            task("t1", "todo", 0),
            task("t2", "todo", 1),
            task("t3", "todo", 2),
            task("t4", "doing", 0),
        ],
    }
}

pub fn roles() -> StaticRoles {
    StaticRoles::new()
        .with_owner(PROJECT, OWNER)
        .with_member(PROJECT, MANAGER, Role::Manager)
        .with_member(PROJECT, MEMBER, Role::Member)
}

/// Reconciler for `user` with `board` already loaded
pub async fn setup_board_as(
    board: BoardData,
    user: Option<&str>,
) -> (Arc<Reconciler>, Arc<MockGateway>) {
    let gateway = Arc::new(MockGateway::new(board));
    let reconciler = Arc::new(Reconciler::new(
        gateway.clone(),
        Arc::new(roles()),
        user.map(UserId::from),
    ));
    if user.is_some() {
        reconciler
            .load_project(&PROJECT.into())
            .await
            .expect("board should load");
    }
    (reconciler, gateway)
}

pub async fn setup_board() -> (Arc<Reconciler>, Arc<MockGateway>) {
    setup_board_as(sample_board(), Some(OWNER)).await
}

/// `(id, position)` pairs of one list in display order
pub async fn order(reconciler: &Reconciler, list_id: &str) -> Vec<(String, usize)> {
    reconciler
        .tasks_in(&list_id.into())
        .await
        .into_iter()
        .map(|t| (t.id.to_string(), t.position))
        .collect()
}

pub fn pairs(expected: &[(&str, usize)]) -> Vec<(String, usize)> {
    expected
        .iter()
        .map(|(id, pos)| (id.to_string(), *pos))
        .collect()
}

/// Yield until the gateway has seen `count` calls named `name`
pub async fn wait_for_call(gateway: &MockGateway, name: &str, count: usize) {
    for _ in 0..1000 {
        if gateway.calls_named(name).len() >= count {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("gateway never received {} x {}", count, name);
}

//! Persistence calls the board issues after applying a change locally.
//!
//! The reconciler only knows the [`Gateway`] trait; [`http::HttpGateway`]
//! speaks the project server's REST routes.

pub mod http;

use crate::error::Result;
use crate::models::{
    BoardData, CreateListRequest, CreateTaskRequest, EntityId, List, ListPosition, Task,
    TaskPatch, TaskPosition,
};
use async_trait::async_trait;

pub use http::HttpGateway;

#[async_trait]
pub trait Gateway: Send + Sync {
    /// Project record plus all of its lists and tasks
    async fn fetch_board(&self, project_id: &EntityId) -> Result<BoardData>;

    async fn create_list(&self, request: &CreateListRequest) -> Result<List>;

    async fn update_list(&self, list_id: &EntityId, title: &str) -> Result<List>;

    /// Deletes the list and every task in it
    async fn delete_list(&self, list_id: &EntityId) -> Result<()>;

    async fn reorder_lists(&self, positions: &[ListPosition]) -> Result<()>;

    async fn create_task(&self, request: &CreateTaskRequest) -> Result<Task>;

    /// The updated task, when the server sends it back
    async fn update_task(&self, task_id: &EntityId, patch: &TaskPatch) -> Result<Option<Task>>;

    async fn delete_task(&self, task_id: &EntityId) -> Result<()>;

    /// Applies the batch; may answer with the canonical ordering of the
    /// touched lists. Not assumed atomic.
    async fn reorder_tasks(&self, positions: &[TaskPosition]) -> Result<Option<Vec<Task>>>;

    /// Ids the server reports as deleted
    async fn bulk_delete_tasks(&self, task_ids: &[EntityId]) -> Result<Vec<EntityId>>;
}

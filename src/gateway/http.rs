/// HTTP gateway - reqwest client for the project server's REST routes
///
/// Every request carries the signed-in user as a bearer token. Status codes
/// are mapped onto `BoardError` so callers see the same error kinds no matter
/// which gateway they run against.
use super::Gateway;
use crate::error::{BoardError, Result};
use crate::models::{
    BoardData, CreateListRequest, CreateTaskRequest, EntityId, List, ListPosition, Project, Task,
    TaskPatch, TaskPosition, UserId,
};
use crate::permissions::{resolve_role, Membership, PermissionOracle, Role};
use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

/// Default request timeout
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

pub struct HttpGateway {
    base_url: String,
    user: Option<UserId>,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct BulkDeleteResponse {
    #[serde(default)]
    deleted: Option<Vec<EntityId>>,
}

impl HttpGateway {
    pub fn new(base_url: &str, user: Option<UserId>) -> Result<Self> {
        Self::with_timeout(base_url, user, Duration::from_millis(DEFAULT_TIMEOUT_MS))
    }

    pub fn with_timeout(base_url: &str, user: Option<UserId>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            user,
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let builder = self.client.request(method, url);
        match &self.user {
            Some(user) => builder.bearer_auth(user.as_str()),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder, path: &str) -> Result<Response> {
        let response = builder.send().await?;
        let status = response.status();
        if status.is_success() {
            tracing::trace!(path, status = status.as_u16(), "Gateway request ok");
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        tracing::debug!(path, status = status.as_u16(), body = %body, "Gateway request failed");
        Err(error_for_status(status, body, path))
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.send(self.request(Method::GET, path), path).await?;
        Ok(response.json::<T>().await?)
    }

    /// Read a body the server may or may not fill with `T`
    async fn optional_json<T: DeserializeOwned>(response: Response) -> Result<Option<T>> {
        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(None);
        }
        Ok(serde_json::from_str::<T>(&text).ok())
    }
}

/// Map a non-success status onto the board's error kinds
pub fn error_for_status(status: StatusCode, body: String, path: &str) -> BoardError {
    match status {
        StatusCode::UNAUTHORIZED => BoardError::Unauthorized,
        StatusCode::FORBIDDEN => BoardError::Forbidden(if body.is_empty() {
            path.to_string()
        } else {
            body
        }),
        StatusCode::NOT_FOUND => BoardError::not_found("resource", path),
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            BoardError::ValidationError(body)
        },
        _ => BoardError::Gateway {
            status: status.as_u16(),
            message: body,
        },
    }
}

#[async_trait]
impl Gateway for HttpGateway {
    async fn fetch_board(&self, project_id: &EntityId) -> Result<BoardData> {
        let project: Project = self.get_json(&format!("/api/projects/{}", project_id)).await?;
        let lists: Vec<List> = self.get_json(&format!("/api/lists/{}", project_id)).await?;
        let tasks: Vec<Task> = self
            .get_json(&format!("/api/projects/{}/tasks", project_id))
            .await?;
        Ok(BoardData {
            project,
            lists,
            tasks,
        })
    }

    async fn create_list(&self, request: &CreateListRequest) -> Result<List> {
        let path = "/api/lists/create";
        let response = self
            .send(self.request(Method::POST, path).json(request), path)
            .await?;
        Ok(response.json::<List>().await?)
    }

    async fn update_list(&self, list_id: &EntityId, title: &str) -> Result<List> {
        let path = format!("/api/lists/{}", list_id);
        let response = self
            .send(
                self.request(Method::PATCH, &path)
                    .json(&json!({ "title": title })),
                &path,
            )
            .await?;
        Ok(response.json::<List>().await?)
    }

    async fn delete_list(&self, list_id: &EntityId) -> Result<()> {
        let path = format!("/api/lists/{}", list_id);
        self.send(self.request(Method::DELETE, &path), &path)
            .await?;
        Ok(())
    }

    async fn reorder_lists(&self, positions: &[ListPosition]) -> Result<()> {
        if positions.is_empty() {
            return Ok(());
        }
        let path = "/api/lists/reorder";
        self.send(self.request(Method::PATCH, path).json(positions), path)
            .await?;
        Ok(())
    }

    async fn create_task(&self, request: &CreateTaskRequest) -> Result<Task> {
        let path = "/api/tasks/create";
        let response = self
            .send(self.request(Method::POST, path).json(request), path)
            .await?;
        Ok(response.json::<Task>().await?)
    }

    async fn update_task(&self, task_id: &EntityId, patch: &TaskPatch) -> Result<Option<Task>> {
        let path = format!("/api/tasks/update/{}", task_id);
        let response = self
            .send(self.request(Method::PATCH, &path).json(patch), &path)
            .await?;
        Self::optional_json::<Task>(response).await
    }

    async fn delete_task(&self, task_id: &EntityId) -> Result<()> {
        let path = format!("/api/tasks/{}", task_id);
        self.send(self.request(Method::DELETE, &path), &path)
            .await?;
        Ok(())
    }

    async fn reorder_tasks(&self, positions: &[TaskPosition]) -> Result<Option<Vec<Task>>> {
        // the server answers an empty batch with 400
        if positions.is_empty() {
            return Ok(None);
        }
        let path = "/api/tasks/reorder";
        let response = self
            .send(self.request(Method::PATCH, path).json(positions), path)
            .await?;
        Self::optional_json::<Vec<Task>>(response).await
    }

    async fn bulk_delete_tasks(&self, task_ids: &[EntityId]) -> Result<Vec<EntityId>> {
        let path = "/api/tasks/bulk/delete";
        let response = self
            .send(
                self.request(Method::DELETE, path)
                    .json(&json!({ "taskIds": task_ids })),
                path,
            )
            .await?;
        let body = Self::optional_json::<BulkDeleteResponse>(response).await?;
        Ok(body
            .and_then(|b| b.deleted)
            .unwrap_or_else(|| task_ids.to_vec()))
    }
}

#[async_trait]
impl PermissionOracle for HttpGateway {
    async fn role(&self, project_id: &EntityId, user_id: &UserId) -> Result<Option<Role>> {
        let project: Project = self.get_json(&format!("/api/projects/{}", project_id)).await?;
        let members: Vec<Membership> =
            match self.get_json(&format!("/api/projects/{}/members", project_id)).await {
                Ok(members) => members,
                Err(BoardError::NotFound { .. }) => Vec::new(),
                Err(e) => return Err(e),
            };
        Ok(resolve_role(&project.owner_id, &members, user_id))
    }
}

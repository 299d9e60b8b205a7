//! REST client for the `ClickUp` API.

use async_trait::async_trait;
use reqwest::header::{HeaderValue, AUTHORIZATION};
use reqwest::{Method, RequestBuilder};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::error::UpstreamError;
use crate::models::{
    AccessToken, Folder, List, ListId, ListParent, Space, SpaceId, Task, TaskId, TaskTag, Team,
    TeamId,
};

/// `ClickUp` API endpoint
pub const CLICKUP_API_URL: &str = "https://api.clickup.com/api/v2";

/// Typed operations the tag engine calls through.
///
/// Implementations perform exactly one request per call; retry policy belongs to callers.
#[async_trait]
pub trait Upstream: Send + Sync {
    /// Teams (workspaces) visible to the token.
    async fn list_teams(&self, token: &AccessToken) -> Result<Vec<Team>, UpstreamError>;

    /// Non-archived spaces of a team.
    async fn list_spaces(
        &self,
        token: &AccessToken,
        team_id: &TeamId,
    ) -> Result<Vec<Space>, UpstreamError>;

    /// Non-archived folders of a space.
    async fn list_folders(
        &self,
        token: &AccessToken,
        space_id: &SpaceId,
    ) -> Result<Vec<Folder>, UpstreamError>;

    /// Lists in a folder, or folder-less lists directly under a space.
    async fn list_lists(
        &self,
        token: &AccessToken,
        parent: &ListParent,
    ) -> Result<Vec<List>, UpstreamError>;

    /// First page of tasks in a list. No pagination cursor is followed.
    async fn list_tasks(
        &self,
        token: &AccessToken,
        list_id: &ListId,
    ) -> Result<Vec<Task>, UpstreamError>;

    /// A single task.
    async fn get_task(&self, token: &AccessToken, task_id: &TaskId)
        -> Result<Task, UpstreamError>;

    /// Replace the full tag list of a task.
    async fn update_task_tags(
        &self,
        token: &AccessToken,
        task_id: &TaskId,
        tags: &[TaskTag],
    ) -> Result<(), UpstreamError>;

    /// Tags defined on a space, whether or not any task uses them.
    async fn list_space_tags(
        &self,
        token: &AccessToken,
        space_id: &SpaceId,
    ) -> Result<Vec<TaskTag>, UpstreamError>;
}

/// `ClickUp` REST client
#[derive(Debug, Clone)]
pub struct ClickUpClient {
    client: reqwest::Client,
    api_url: String,
}

/// Build the `Authorization` header value for a token.
///
/// Personal API tokens (`pk_*`) are sent as-is; OAuth access tokens use the Bearer scheme.
fn authorization_value(token: &AccessToken) -> Result<HeaderValue, UpstreamError> {
    let raw = token.expose();
    let value = if raw.starts_with("pk_") {
        raw.to_string()
    } else {
        format!("Bearer {raw}")
    };
    HeaderValue::from_str(&value).map_err(|_| UpstreamError::Status {
        status: 401,
        body: "access token is not a valid header value".to_string(),
    })
}

#[derive(Deserialize)]
struct TeamsResponse {
    teams: Vec<Team>,
}

#[derive(Deserialize)]
struct SpacesResponse {
    spaces: Vec<Space>,
}

#[derive(Deserialize)]
struct FoldersResponse {
    folders: Vec<Folder>,
}

#[derive(Deserialize)]
struct ListsResponse {
    lists: Vec<List>,
}

#[derive(Deserialize)]
struct TasksResponse {
    tasks: Vec<Task>,
}

#[derive(Deserialize)]
struct TagsResponse {
    tags: Vec<TaskTag>,
}

/// Body of a tag list replacement; only name and colors are sent.
#[derive(Serialize)]
struct TagPayload<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    tag_fg: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tag_bg: Option<&'a str>,
}

#[derive(Serialize)]
struct UpdateTagsRequest<'a> {
    tags: Vec<TagPayload<'a>>,
}

impl ClickUpClient {
    /// Create a client against the public `ClickUp` API.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be constructed
    pub fn new() -> Result<Self, UpstreamError> {
        Self::with_url(CLICKUP_API_URL)
    }

    /// Create a client with custom API URL (proxies, testing)
    pub fn with_url(api_url: &str) -> Result<Self, UpstreamError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("tag-manager/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| UpstreamError::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
        })
    }

    fn request(
        &self,
        method: Method,
        token: &AccessToken,
        path: &str,
    ) -> Result<RequestBuilder, UpstreamError> {
        Ok(self
            .client
            .request(method, format!("{}{path}", self.api_url))
            .header(AUTHORIZATION, authorization_value(token)?))
    }

    /// Send a request and map non-success statuses to [`UpstreamError::Status`].
    async fn send(&self, request: RequestBuilder) -> Result<reqwest::Response, UpstreamError> {
        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response)
    }

    async fn get<R: DeserializeOwned>(
        &self,
        token: &AccessToken,
        path: &str,
    ) -> Result<R, UpstreamError> {
        let response = self.send(self.request(Method::GET, token, path)?).await?;
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| UpstreamError::Decode(e.to_string()))
    }
}

#[async_trait]
impl Upstream for ClickUpClient {
    #[instrument(skip(self, token))]
    async fn list_teams(&self, token: &AccessToken) -> Result<Vec<Team>, UpstreamError> {
        let response: TeamsResponse = self.get(token, "/team").await?;
        debug!(count = response.teams.len(), "Retrieved teams");
        Ok(response.teams)
    }

    #[instrument(skip(self, token), fields(team_id = %team_id))]
    async fn list_spaces(
        &self,
        token: &AccessToken,
        team_id: &TeamId,
    ) -> Result<Vec<Space>, UpstreamError> {
        let path = format!("/team/{team_id}/space?archived=false");
        let response: SpacesResponse = self.get(token, &path).await?;
        debug!(count = response.spaces.len(), "Retrieved spaces");
        Ok(response.spaces)
    }

    #[instrument(skip(self, token), fields(space_id = %space_id))]
    async fn list_folders(
        &self,
        token: &AccessToken,
        space_id: &SpaceId,
    ) -> Result<Vec<Folder>, UpstreamError> {
        let path = format!("/space/{space_id}/folder?archived=false");
        let response: FoldersResponse = self.get(token, &path).await?;
        debug!(count = response.folders.len(), "Retrieved folders");
        Ok(response.folders)
    }

    #[instrument(skip(self, token))]
    async fn list_lists(
        &self,
        token: &AccessToken,
        parent: &ListParent,
    ) -> Result<Vec<List>, UpstreamError> {
        let path = match parent {
            ListParent::Folder(folder_id) => format!("/folder/{folder_id}/list?archived=false"),
            ListParent::Space(space_id) => format!("/space/{space_id}/list?archived=false"),
        };
        let response: ListsResponse = self.get(token, &path).await?;
        debug!(count = response.lists.len(), "Retrieved lists");
        Ok(response.lists)
    }

    #[instrument(skip(self, token), fields(list_id = %list_id))]
    async fn list_tasks(
        &self,
        token: &AccessToken,
        list_id: &ListId,
    ) -> Result<Vec<Task>, UpstreamError> {
        let path = format!("/list/{list_id}/task");
        let response: TasksResponse = self.get(token, &path).await?;
        debug!(count = response.tasks.len(), "Retrieved tasks");
        Ok(response.tasks)
    }

    #[instrument(skip(self, token), fields(task_id = %task_id))]
    async fn get_task(
        &self,
        token: &AccessToken,
        task_id: &TaskId,
    ) -> Result<Task, UpstreamError> {
        self.get(token, &format!("/task/{task_id}")).await
    }

    #[instrument(skip(self, token, tags), fields(task_id = %task_id, tag_count = tags.len()))]
    async fn update_task_tags(
        &self,
        token: &AccessToken,
        task_id: &TaskId,
        tags: &[TaskTag],
    ) -> Result<(), UpstreamError> {
        let body = UpdateTagsRequest {
            tags: tags
                .iter()
                .map(|tag| TagPayload {
                    name: tag.name.as_str(),
                    tag_fg: tag.tag_fg.as_deref(),
                    tag_bg: tag.tag_bg.as_deref(),
                })
                .collect(),
        };

        let request = self
            .request(Method::PUT, token, &format!("/task/{task_id}"))?
            .json(&body);
        self.send(request).await?;
        debug!("Updated task tags");
        Ok(())
    }

    #[instrument(skip(self, token), fields(space_id = %space_id))]
    async fn list_space_tags(
        &self,
        token: &AccessToken,
        space_id: &SpaceId,
    ) -> Result<Vec<TaskTag>, UpstreamError> {
        let path = format!("/space/{space_id}/tag");
        let response: TagsResponse = self.get(token, &path).await?;
        debug!(count = response.tags.len(), "Retrieved space tags");
        Ok(response.tags)
    }
}

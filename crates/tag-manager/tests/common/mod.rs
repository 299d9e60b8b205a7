//! In-memory `ClickUp` workspace shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use tag_manager::{
    AccessToken, Folder, List, ListId, ListParent, RetryConfig, Space, SpaceId, TagService, Task,
    TaskId, TaskTag, Team, TeamId, Upstream, UpstreamError,
};

/// Token the fake workspace accepts.
pub const TOKEN: &str = "pk_test_token";

/// Injected failure for one call and key.
struct Failure {
    status: u16,
    /// `None` fails forever.
    remaining: Option<u32>,
}

#[derive(Default)]
struct State {
    teams: Vec<Team>,
    spaces: Vec<Space>,
    folders: HashMap<String, Vec<Folder>>,
    folder_lists: HashMap<String, Vec<List>>,
    space_lists: HashMap<String, Vec<List>>,
    list_tasks: HashMap<String, Vec<TaskId>>,
    tasks: HashMap<String, Task>,
    space_tags: HashMap<String, Vec<TaskTag>>,
    failures: HashMap<(String, String), Failure>,
    cancel_after: Option<(String, String, CancellationToken)>,
    calls: HashMap<String, u32>,
    updates: Vec<(TaskId, Vec<TaskTag>)>,
}

/// Fake upstream with failure injection and call accounting.
pub struct FakeWorkspace {
    state: Mutex<State>,
}

impl Default for FakeWorkspace {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeWorkspace {
    /// Workspace with a single team and nothing in it.
    pub fn new() -> Self {
        let state = State {
            teams: vec![Team {
                id: TeamId::new("team1"),
                name: "Acme".into(),
            }],
            ..State::default()
        };
        Self {
            state: Mutex::new(state),
        }
    }

    /// Workspace whose token sees no team at all.
    pub fn without_teams() -> Self {
        Self {
            state: Mutex::new(State::default()),
        }
    }

    pub fn space(self, id: &str) -> Self {
        self.state.lock().unwrap().spaces.push(Space {
            id: SpaceId::new(id),
            name: format!("Space {id}"),
        });
        self
    }

    pub fn folder(self, space: &str, folder: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .folders
            .entry(space.into())
            .or_default()
            .push(Folder {
                id: folder.into(),
                name: format!("Folder {folder}"),
            });
        self
    }

    pub fn folder_list(self, folder: &str, list: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .folder_lists
            .entry(folder.into())
            .or_default()
            .push(list_named(list));
        self
    }

    pub fn space_list(self, space: &str, list: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .space_lists
            .entry(space.into())
            .or_default()
            .push(list_named(list));
        self
    }

    /// Put a task into a list. The same task may be placed in several lists.
    pub fn task(self, list: &str, task: Task) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state
                .list_tasks
                .entry(list.into())
                .or_default()
                .push(task.id.clone());
            state.tasks.insert(task.id.as_str().to_string(), task);
        }
        self
    }

    pub fn space_tag(self, space: &str, tag: TaskTag) -> Self {
        self.state
            .lock()
            .unwrap()
            .space_tags
            .entry(space.into())
            .or_default()
            .push(tag);
        self
    }

    /// Make every `call` for `key` fail with `status`.
    pub fn fail(self, call: &str, key: &str, status: u16) -> Self {
        self.insert_failure(call, key, status, None)
    }

    /// Make the next `times` calls for `key` fail with `status`.
    pub fn fail_times(self, call: &str, key: &str, status: u16, times: u32) -> Self {
        self.insert_failure(call, key, status, Some(times))
    }

    fn insert_failure(self, call: &str, key: &str, status: u16, remaining: Option<u32>) -> Self {
        self.state
            .lock()
            .unwrap()
            .failures
            .insert((call.into(), key.into()), Failure { status, remaining });
        self
    }

    /// Cancel `token` once `call` for `key` has completed.
    pub fn cancel_after(self, call: &str, key: &str, token: CancellationToken) -> Self {
        self.state.lock().unwrap().cancel_after = Some((call.into(), key.into(), token));
        self
    }

    /// Number of times `call` was issued, retries included.
    pub fn calls(&self, call: &str) -> u32 {
        self.state
            .lock()
            .unwrap()
            .calls
            .get(call)
            .copied()
            .unwrap_or(0)
    }

    /// Current tag names of a task.
    pub fn tag_names(&self, task_id: &str) -> Vec<String> {
        self.state.lock().unwrap().tasks[task_id]
            .tags
            .iter()
            .map(|tag| tag.name.to_string())
            .collect()
    }

    /// Current tags of a task.
    pub fn tags(&self, task_id: &str) -> Vec<TaskTag> {
        self.state.lock().unwrap().tasks[task_id].tags.clone()
    }

    /// Successful tag updates in the order they were applied.
    pub fn updates(&self) -> Vec<(TaskId, Vec<TaskTag>)> {
        self.state.lock().unwrap().updates.clone()
    }

    /// Record the call, check the token and any injected failure.
    fn enter(&self, token: &AccessToken, call: &str, key: &str) -> Result<(), UpstreamError> {
        let mut state = self.state.lock().unwrap();
        *state.calls.entry(call.into()).or_default() += 1;

        if token.expose() != TOKEN {
            return Err(status(401, "Token invalid"));
        }

        let lookup = (call.to_string(), key.to_string());
        if let Some(failure) = state.failures.get_mut(&lookup) {
            match &mut failure.remaining {
                None => return Err(status(failure.status, "injected failure")),
                Some(0) => {}
                Some(remaining) => {
                    *remaining -= 1;
                    return Err(status(failure.status, "injected failure"));
                }
            }
        }
        Ok(())
    }

    fn leave(&self, call: &str, key: &str) {
        let state = self.state.lock().unwrap();
        if let Some((c, k, token)) = &state.cancel_after {
            if c == call && k == key {
                token.cancel();
            }
        }
    }
}

fn status(code: u16, body: &str) -> UpstreamError {
    UpstreamError::Status {
        status: code,
        body: body.to_string(),
    }
}

fn list_named(id: &str) -> List {
    List {
        id: ListId::new(id),
        name: format!("List {id}"),
    }
}

#[async_trait]
impl Upstream for FakeWorkspace {
    async fn list_teams(&self, token: &AccessToken) -> Result<Vec<Team>, UpstreamError> {
        self.enter(token, "list_teams", "")?;
        let teams = self.state.lock().unwrap().teams.clone();
        self.leave("list_teams", "");
        Ok(teams)
    }

    async fn list_spaces(
        &self,
        token: &AccessToken,
        team_id: &TeamId,
    ) -> Result<Vec<Space>, UpstreamError> {
        self.enter(token, "list_spaces", team_id.as_str())?;
        let spaces = self.state.lock().unwrap().spaces.clone();
        self.leave("list_spaces", team_id.as_str());
        Ok(spaces)
    }

    async fn list_folders(
        &self,
        token: &AccessToken,
        space_id: &SpaceId,
    ) -> Result<Vec<Folder>, UpstreamError> {
        let key = space_id.as_str();
        self.enter(token, "list_folders", key)?;
        let folders = self
            .state
            .lock()
            .unwrap()
            .folders
            .get(key)
            .cloned()
            .unwrap_or_default();
        self.leave("list_folders", key);
        Ok(folders)
    }

    async fn list_lists(
        &self,
        token: &AccessToken,
        parent: &ListParent,
    ) -> Result<Vec<List>, UpstreamError> {
        let (call, key) = match parent {
            ListParent::Folder(id) => ("list_folder_lists", id.as_str()),
            ListParent::Space(id) => ("list_space_lists", id.as_str()),
        };
        self.enter(token, call, key)?;
        let lists = {
            let state = self.state.lock().unwrap();
            let source = match parent {
                ListParent::Folder(_) => &state.folder_lists,
                ListParent::Space(_) => &state.space_lists,
            };
            source.get(key).cloned().unwrap_or_default()
        };
        self.leave(call, key);
        Ok(lists)
    }

    async fn list_tasks(
        &self,
        token: &AccessToken,
        list_id: &ListId,
    ) -> Result<Vec<Task>, UpstreamError> {
        let key = list_id.as_str();
        self.enter(token, "list_tasks", key)?;
        let tasks = {
            let state = self.state.lock().unwrap();
            state
                .list_tasks
                .get(key)
                .map(|ids| {
                    ids.iter()
                        .map(|id| state.tasks[id.as_str()].clone())
                        .collect()
                })
                .unwrap_or_default()
        };
        self.leave("list_tasks", key);
        Ok(tasks)
    }

    async fn get_task(&self, token: &AccessToken, task_id: &TaskId) -> Result<Task, UpstreamError> {
        let key = task_id.as_str();
        self.enter(token, "get_task", key)?;
        let task = self.state.lock().unwrap().tasks.get(key).cloned();
        self.leave("get_task", key);
        task.ok_or_else(|| status(404, "Task not found"))
    }

    async fn update_task_tags(
        &self,
        token: &AccessToken,
        task_id: &TaskId,
        tags: &[TaskTag],
    ) -> Result<(), UpstreamError> {
        let key = task_id.as_str();
        self.enter(token, "update_task_tags", key)?;
        {
            let mut state = self.state.lock().unwrap();
            let Some(task) = state.tasks.get_mut(key) else {
                return Err(status(404, "Task not found"));
            };
            task.tags = tags.to_vec();
            state.updates.push((task_id.clone(), tags.to_vec()));
        }
        self.leave("update_task_tags", key);
        Ok(())
    }

    async fn list_space_tags(
        &self,
        token: &AccessToken,
        space_id: &SpaceId,
    ) -> Result<Vec<TaskTag>, UpstreamError> {
        let key = space_id.as_str();
        self.enter(token, "list_space_tags", key)?;
        let tags = self
            .state
            .lock()
            .unwrap()
            .space_tags
            .get(key)
            .cloned()
            .unwrap_or_default();
        self.leave("list_space_tags", key);
        Ok(tags)
    }
}

/// Tag with a white foreground.
pub fn tag(name: &str, background: &str) -> TaskTag {
    TaskTag {
        name: name.into(),
        tag_fg: Some("#ffffff".into()),
        tag_bg: Some(background.into()),
        creator: Some(7),
    }
}

/// Task as the upstream would return it.
pub fn task(id: &str, space: &str, tags: &[TaskTag]) -> Task {
    serde_json::from_value(json!({
        "id": id,
        "name": format!("Task {id}"),
        "status": { "status": "open", "color": "#d3d3d3" },
        "assignees": [],
        "tags": tags,
        "creator": { "id": 42, "username": "ada" },
        "date_created": "1700000000000",
        "space": { "id": space },
    }))
    .unwrap()
}

/// Fast retry settings so failure paths do not slow the suite down.
pub fn fast_retry() -> RetryConfig {
    RetryConfig {
        timeout: Duration::from_secs(2),
        base_delay: Duration::from_millis(1),
        traversal_max_attempts: 2,
        update_max_attempts: 2,
    }
}

pub fn service(workspace: FakeWorkspace) -> TagService<FakeWorkspace> {
    TagService::new(workspace, fast_retry())
}

pub fn token() -> AccessToken {
    AccessToken::new(TOKEN)
}

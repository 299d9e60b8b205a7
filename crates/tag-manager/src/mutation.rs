//! Multi-task tag mutations.
//!
//! `ClickUp` cannot rename or delete a tag across a workspace, so these operations
//! walk the workspace, select every task carrying the tag and rewrite each task's
//! tag list one at a time. There is no transaction: tasks updated before a failure
//! stay updated, and the outcome says which ones did not make it.

use serde::Serialize;
use std::collections::HashSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::client::Upstream;
use crate::error::TagError;
use crate::models::{AccessToken, LocatedTask, TagColor, TagName, Task, TaskId, TaskTag};
use crate::retry::{RetryError, RetryPolicy};
use crate::walker::{BranchFailure, TreeWalker};

/// Per-task update that did not go through.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedUpdate {
    pub task_id: TaskId,
    /// Tag being removed, for per-tag operations.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<TagName>,
    pub attempts: u32,
    pub error: String,
}

/// Result of a batch mutation. Always structured, never a single pass/fail.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationOutcome {
    pub attempted: u32,
    pub succeeded: u32,
    pub failed: Vec<FailedUpdate>,
    /// Branches the selecting walk could not read; tasks in them were never attempted.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skipped_branches: Vec<BranchFailure>,
    /// Caller cancelled before every update was issued.
    pub cancelled: bool,
}

impl MutationOutcome {
    /// Some updates failed or were never issued.
    #[must_use]
    pub fn is_partial(&self) -> bool {
        !self.failed.is_empty() || self.cancelled
    }

    fn record(
        &mut self,
        task_id: &TaskId,
        tag: Option<&TagName>,
        result: Result<(), RetryError>,
    ) -> Result<(), TagError> {
        if let Err(RetryError::Cancelled { attempts: 0 }) = result {
            // Nothing was sent for this task.
            self.cancelled = true;
            return Ok(());
        }

        self.attempted += 1;
        match result {
            Ok(()) => {
                self.succeeded += 1;
                Ok(())
            }
            Err(RetryError::Failed { source, .. }) if source.is_unauthorized() => {
                Err(TagError::Unauthenticated)
            }
            Err(RetryError::Failed { attempts, source }) => {
                warn!(task_id = %task_id, attempts, error = %source, "Task tag update failed");
                self.failed.push(FailedUpdate {
                    task_id: task_id.clone(),
                    tag: tag.cloned(),
                    attempts,
                    error: source.to_string(),
                });
                Ok(())
            }
            Err(err @ RetryError::Cancelled { attempts }) => {
                // A dropped request may or may not have landed upstream.
                self.failed.push(FailedUpdate {
                    task_id: task_id.clone(),
                    tag: tag.cloned(),
                    attempts,
                    error: err.to_string(),
                });
                self.cancelled = true;
                Ok(())
            }
        }
    }
}

/// Result of a single-task tag edit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskTagEdit {
    pub task_id: TaskId,
    pub tag: TagName,
    /// `false` when the task was already in the requested state.
    pub changed: bool,
}

/// Replace `old` with `new` in a tag list, keeping colors and collapsing duplicates.
#[must_use]
pub fn rename_in(tags: &[TaskTag], old: &str, new: &TagName) -> Vec<TaskTag> {
    let mut seen = HashSet::new();
    tags.iter()
        .map(|tag| {
            if tag.name.as_str() == old {
                TaskTag {
                    name: new.clone(),
                    ..tag.clone()
                }
            } else {
                tag.clone()
            }
        })
        .filter(|tag| seen.insert(tag.name.clone()))
        .collect()
}

/// Drop every occurrence of `name` from a tag list.
#[must_use]
pub fn remove_from(tags: &[TaskTag], name: &str) -> Vec<TaskTag> {
    tags.iter()
        .filter(|tag| tag.name.as_str() != name)
        .cloned()
        .collect()
}

/// Replace the colors of `name` in a tag list.
#[must_use]
pub fn recolor_in(tags: &[TaskTag], name: &str, color: &TagColor) -> Vec<TaskTag> {
    tags.iter()
        .map(|tag| {
            if tag.name.as_str() == name {
                TaskTag {
                    tag_fg: Some(color.foreground.clone()),
                    tag_bg: Some(color.background.clone()),
                    ..tag.clone()
                }
            } else {
                tag.clone()
            }
        })
        .collect()
}

fn require_name(name: &TagName) -> Result<(), TagError> {
    if name.is_blank() {
        return Err(TagError::InvalidArgument("tag name must not be empty".into()));
    }
    Ok(())
}

/// Issues tag mutations against an [`Upstream`].
pub struct MutationCoordinator<'a, U: ?Sized> {
    upstream: &'a U,
    traversal: RetryPolicy,
    update: RetryPolicy,
}

impl<'a, U: Upstream + ?Sized> MutationCoordinator<'a, U> {
    /// `traversal` covers the selecting walk; `update` covers task reads and writes.
    pub fn new(upstream: &'a U, traversal: RetryPolicy, update: RetryPolicy) -> Self {
        Self {
            upstream,
            traversal,
            update,
        }
    }

    /// Rename a tag on every task carrying it. Colors are preserved.
    #[instrument(skip(self, token, cancel), fields(old = %old, new = %new))]
    pub async fn rename_tag(
        &self,
        token: &AccessToken,
        old: &TagName,
        new: &TagName,
        cancel: &CancellationToken,
    ) -> Result<MutationOutcome, TagError> {
        require_name(old)?;
        require_name(new)?;
        if old == new {
            return Err(TagError::InvalidArgument(
                "new tag name must differ from the old one".into(),
            ));
        }

        self.apply_to_tagged(token, old, "rename", cancel, |tags| {
            rename_in(tags, old.as_str(), new)
        })
        .await
    }

    /// Remove a tag from every task carrying it.
    #[instrument(skip(self, token, cancel), fields(tag = %name))]
    pub async fn delete_tag(
        &self,
        token: &AccessToken,
        name: &TagName,
        cancel: &CancellationToken,
    ) -> Result<MutationOutcome, TagError> {
        require_name(name)?;
        self.apply_to_tagged(token, name, "delete", cancel, |tags| {
            remove_from(tags, name.as_str())
        })
        .await
    }

    /// Change a tag's colors on every task carrying it. The name is unchanged.
    #[instrument(skip(self, token, cancel), fields(tag = %name))]
    pub async fn recolor_tag(
        &self,
        token: &AccessToken,
        name: &TagName,
        color: &TagColor,
        cancel: &CancellationToken,
    ) -> Result<MutationOutcome, TagError> {
        require_name(name)?;
        self.apply_to_tagged(token, name, "recolor", cancel, |tags| {
            recolor_in(tags, name.as_str(), color)
        })
        .await
    }

    /// Walk the workspace, then rewrite the tag list of every task carrying `name`.
    async fn apply_to_tagged<F>(
        &self,
        token: &AccessToken,
        name: &TagName,
        operation: &'static str,
        cancel: &CancellationToken,
        edit: F,
    ) -> Result<MutationOutcome, TagError>
    where
        F: Fn(&[TaskTag]) -> Vec<TaskTag>,
    {
        let traversal = TreeWalker::new(self.upstream, self.traversal)
            .collect(token, cancel)
            .await?;

        // A task linked into several lists shows up once per list.
        let mut selected = HashSet::new();
        let targets: Vec<&LocatedTask> = traversal
            .tasks
            .iter()
            .filter(|located| located.task.has_tag(name.as_str()))
            .filter(|located| selected.insert(located.task.id.clone()))
            .collect();

        if targets.is_empty() {
            return Err(TagError::NotFound(format!("no task carries tag '{name}'")));
        }

        info!(
            operation,
            tag = %name,
            tasks = targets.len(),
            "Updating tagged tasks"
        );

        let mut outcome = MutationOutcome {
            skipped_branches: traversal.failures.clone(),
            ..MutationOutcome::default()
        };

        for located in targets {
            if cancel.is_cancelled() {
                outcome.cancelled = true;
                break;
            }

            let task = &located.task;
            let tags = edit(&task.tags);
            let result = self
                .update
                .run(cancel, "update_task_tags", || {
                    self.upstream.update_task_tags(token, &task.id, &tags)
                })
                .await;
            outcome.record(&task.id, None, result)?;
            if outcome.cancelled {
                break;
            }
        }

        info!(
            operation,
            tag = %name,
            attempted = outcome.attempted,
            succeeded = outcome.succeeded,
            failed = outcome.failed.len(),
            cancelled = outcome.cancelled,
            "Tag mutation finished"
        );
        Ok(outcome)
    }

    async fn fetch_task(
        &self,
        token: &AccessToken,
        task_id: &TaskId,
        cancel: &CancellationToken,
    ) -> Result<Task, TagError> {
        self.update
            .run(cancel, "get_task", || self.upstream.get_task(token, task_id))
            .await
            .map_err(|err| match TagError::from(err) {
                TagError::NotFound(_) => TagError::NotFound(format!("task {task_id}")),
                other => other,
            })
    }

    /// Colors for `name` from the task's space tag list, if the space defines it.
    async fn space_tag(
        &self,
        token: &AccessToken,
        task: &Task,
        name: &TagName,
        cancel: &CancellationToken,
    ) -> Result<TaskTag, TagError> {
        let Some(space) = &task.space else {
            return Ok(TaskTag::named(name.clone()));
        };

        let fetched = self
            .update
            .run(cancel, "list_space_tags", || {
                self.upstream.list_space_tags(token, &space.id)
            })
            .await;

        match fetched {
            Ok(tags) => Ok(tags
                .into_iter()
                .find(|tag| &tag.name == name)
                .map(|tag| TaskTag {
                    creator: None,
                    ..tag
                })
                .unwrap_or_else(|| TaskTag::named(name.clone()))),
            Err(RetryError::Cancelled { .. }) => Err(TagError::Cancelled),
            Err(RetryError::Failed { source, .. }) if source.is_unauthorized() => {
                Err(TagError::Unauthenticated)
            }
            Err(RetryError::Failed { source, .. }) => {
                warn!(space_id = %space.id, error = %source, "Could not resolve tag colors");
                Ok(TaskTag::named(name.clone()))
            }
        }
    }

    async fn put_tags(
        &self,
        token: &AccessToken,
        task_id: &TaskId,
        tags: &[TaskTag],
        cancel: &CancellationToken,
    ) -> Result<(), TagError> {
        self.update
            .run(cancel, "update_task_tags", || {
                self.upstream.update_task_tags(token, task_id, tags)
            })
            .await
            .map_err(TagError::from)
    }

    /// Add a tag to one task. Adding a tag the task already carries is a no-op.
    #[instrument(skip(self, token, cancel), fields(task_id = %task_id, tag = %name))]
    pub async fn add_tag_to_task(
        &self,
        token: &AccessToken,
        task_id: &TaskId,
        name: &TagName,
        cancel: &CancellationToken,
    ) -> Result<TaskTagEdit, TagError> {
        require_name(name)?;
        let task = self.fetch_task(token, task_id, cancel).await?;

        let mut edit = TaskTagEdit {
            task_id: task_id.clone(),
            tag: name.clone(),
            changed: false,
        };
        if task.has_tag(name.as_str()) {
            info!("Task already carries tag");
            return Ok(edit);
        }

        let mut tags = task.tags.clone();
        tags.push(self.space_tag(token, &task, name, cancel).await?);
        self.put_tags(token, task_id, &tags, cancel).await?;

        info!("Tag added to task");
        edit.changed = true;
        Ok(edit)
    }

    /// Remove a tag from one task. Removing a tag the task does not carry is a no-op.
    #[instrument(skip(self, token, cancel), fields(task_id = %task_id, tag = %name))]
    pub async fn remove_tag_from_task(
        &self,
        token: &AccessToken,
        task_id: &TaskId,
        name: &TagName,
        cancel: &CancellationToken,
    ) -> Result<TaskTagEdit, TagError> {
        require_name(name)?;
        let task = self.fetch_task(token, task_id, cancel).await?;

        let mut edit = TaskTagEdit {
            task_id: task_id.clone(),
            tag: name.clone(),
            changed: false,
        };
        if !task.has_tag(name.as_str()) {
            info!("Task does not carry tag");
            return Ok(edit);
        }

        let tags = remove_from(&task.tags, name.as_str());
        self.put_tags(token, task_id, &tags, cancel).await?;

        info!("Tag removed from task");
        edit.changed = true;
        Ok(edit)
    }

    /// Remove every tag from one task, one update per tag.
    ///
    /// A failed removal is recorded and the remaining tags are still attempted.
    #[instrument(skip(self, token, cancel), fields(task_id = %task_id))]
    pub async fn remove_all_tags_from_task(
        &self,
        token: &AccessToken,
        task_id: &TaskId,
        cancel: &CancellationToken,
    ) -> Result<MutationOutcome, TagError> {
        let task = self.fetch_task(token, task_id, cancel).await?;

        let mut outcome = MutationOutcome::default();
        let mut current = task.tags.clone();

        for tag in &task.tags {
            if cancel.is_cancelled() {
                outcome.cancelled = true;
                break;
            }
            if !current.iter().any(|t| t.name == tag.name) {
                continue;
            }

            let remaining = remove_from(&current, tag.name.as_str());
            let result = self
                .update
                .run(cancel, "update_task_tags", || {
                    self.upstream.update_task_tags(token, task_id, &remaining)
                })
                .await;
            let succeeded = result.is_ok();
            outcome.record(task_id, Some(&tag.name), result)?;
            if succeeded {
                current = remaining;
            }
            if outcome.cancelled {
                break;
            }
        }

        info!(
            removed = outcome.succeeded,
            failed = outcome.failed.len(),
            "Removed tags from task"
        );
        Ok(outcome)
    }
}

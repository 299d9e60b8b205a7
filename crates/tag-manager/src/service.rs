//! Inbound tag operations.
//!
//! Every operation takes the caller's token and a cancellation token, performs a
//! fresh walk where it needs one, and returns a structured report. Nothing is cached
//! between operations.

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use crate::catalogue::TagUsage;
use crate::client::Upstream;
use crate::config::RetryConfig;
use crate::error::TagError;
use crate::models::{AccessToken, LocatedTask, TagCatalogueEntry, TagColor, TagName, TaskId};
use crate::mutation::{MutationCoordinator, MutationOutcome, TaskTagEdit};
use crate::walker::{BranchFailure, TreeWalker};

/// Deduplicated tag catalogue of one walk.
#[derive(Debug, Clone, Serialize)]
pub struct CatalogueReport {
    pub tags: Vec<TagCatalogueEntry>,
    pub failures: Vec<BranchFailure>,
}

/// Every task read by one walk.
#[derive(Debug, Clone, Serialize)]
pub struct TaskReport {
    pub tasks: Vec<LocatedTask>,
    pub failures: Vec<BranchFailure>,
}

/// Known space tags split by whether any task in the walk carries them.
#[derive(Debug, Clone, Serialize)]
pub struct UsageReport {
    #[serde(flatten)]
    pub usage: TagUsage,
    pub failures: Vec<BranchFailure>,
}

/// Tag catalogue and mutation operations over an [`Upstream`].
pub struct TagService<U> {
    upstream: U,
    retry: RetryConfig,
}

fn require_token(token: &AccessToken) -> Result<(), TagError> {
    if token.is_empty() {
        return Err(TagError::Unauthenticated);
    }
    Ok(())
}

impl<U: Upstream> TagService<U> {
    pub fn new(upstream: U, retry: RetryConfig) -> Self {
        Self { upstream, retry }
    }

    #[must_use]
    pub fn upstream(&self) -> &U {
        &self.upstream
    }

    fn walker(&self) -> TreeWalker<'_, U> {
        TreeWalker::new(&self.upstream, self.retry.traversal())
    }

    fn coordinator(&self) -> MutationCoordinator<'_, U> {
        MutationCoordinator::new(&self.upstream, self.retry.traversal(), self.retry.update())
    }

    /// Deduplicated tag catalogue with usage counts.
    #[instrument(skip_all)]
    pub async fn list_tags(
        &self,
        token: &AccessToken,
        cancel: &CancellationToken,
    ) -> Result<CatalogueReport, TagError> {
        require_token(token)?;
        let traversal = self.walker().collect(token, cancel).await?;
        let tags = traversal.catalogue().into_entries();

        info!(
            tags = tags.len(),
            tasks = traversal.tasks.len(),
            partial = traversal.is_partial(),
            "Built tag catalogue"
        );
        Ok(CatalogueReport {
            tags,
            failures: traversal.failures,
        })
    }

    /// Every task in the workspace. Order is not stable across calls.
    #[instrument(skip_all)]
    pub async fn list_tasks(
        &self,
        token: &AccessToken,
        cancel: &CancellationToken,
    ) -> Result<TaskReport, TagError> {
        require_token(token)?;
        let traversal = self.walker().collect(token, cancel).await?;
        Ok(TaskReport {
            tasks: traversal.tasks,
            failures: traversal.failures,
        })
    }

    /// Partition the tags defined on spaces into used and unused.
    #[instrument(skip_all)]
    pub async fn tag_usage(
        &self,
        token: &AccessToken,
        cancel: &CancellationToken,
    ) -> Result<UsageReport, TagError> {
        require_token(token)?;
        let traversal = self
            .walker()
            .with_space_tags(true)
            .collect(token, cancel)
            .await?;
        let usage = traversal.catalogue().partition(&traversal.space_tags);

        info!(
            used = usage.used.len(),
            unused = usage.unused.len(),
            "Computed tag usage"
        );
        Ok(UsageReport {
            usage,
            failures: traversal.failures,
        })
    }

    pub async fn rename_tag(
        &self,
        token: &AccessToken,
        old: &TagName,
        new: &TagName,
        cancel: &CancellationToken,
    ) -> Result<MutationOutcome, TagError> {
        require_token(token)?;
        self.coordinator().rename_tag(token, old, new, cancel).await
    }

    pub async fn delete_tag(
        &self,
        token: &AccessToken,
        name: &TagName,
        cancel: &CancellationToken,
    ) -> Result<MutationOutcome, TagError> {
        require_token(token)?;
        self.coordinator().delete_tag(token, name, cancel).await
    }

    pub async fn recolor_tag(
        &self,
        token: &AccessToken,
        name: &TagName,
        color: &TagColor,
        cancel: &CancellationToken,
    ) -> Result<MutationOutcome, TagError> {
        require_token(token)?;
        self.coordinator()
            .recolor_tag(token, name, color, cancel)
            .await
    }

    pub async fn add_tag_to_task(
        &self,
        token: &AccessToken,
        task_id: &TaskId,
        name: &TagName,
        cancel: &CancellationToken,
    ) -> Result<TaskTagEdit, TagError> {
        require_token(token)?;
        self.coordinator()
            .add_tag_to_task(token, task_id, name, cancel)
            .await
    }

    pub async fn remove_tag_from_task(
        &self,
        token: &AccessToken,
        task_id: &TaskId,
        name: &TagName,
        cancel: &CancellationToken,
    ) -> Result<TaskTagEdit, TagError> {
        require_token(token)?;
        self.coordinator()
            .remove_tag_from_task(token, task_id, name, cancel)
            .await
    }

    pub async fn remove_all_tags_from_task(
        &self,
        token: &AccessToken,
        task_id: &TaskId,
        cancel: &CancellationToken,
    ) -> Result<MutationOutcome, TagError> {
        require_token(token)?;
        self.coordinator()
            .remove_all_tags_from_task(token, task_id, cancel)
            .await
    }
}

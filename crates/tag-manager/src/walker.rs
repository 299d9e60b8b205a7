//! Fan-out traversal of a `ClickUp` workspace.
//!
//! The tree is team → space → {folder → list, list} → task. Folder-less lists are a
//! branch parallel to folders, not a child of them. The walk is driven by an explicit
//! work stack and exposed as a flat stream of [`WalkEvent`]s; a branch that cannot be
//! read is reported as a [`WalkEvent::BranchFailed`] at the point it failed and its
//! siblings carry on.
//!
//! Known limitations: only the first team is walked, and each list contributes the
//! first page of tasks only.

use futures::{Stream, TryStreamExt};
use serde::Serialize;
use std::collections::VecDeque;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::catalogue::TagCatalogue;
use crate::client::Upstream;
use crate::error::TagError;
use crate::models::{
    AccessToken, FolderId, ListParent, LocatedTask, Space, SpaceId, TaskTag, Team, TeamId,
    WorkspaceLocation,
};
use crate::retry::{RetryError, RetryPolicy};

/// Upstream page size for list task reads.
const TASK_PAGE_SIZE: usize = 100;

/// Part of the tree a failed fetch was responsible for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "branch", rename_all = "camelCase")]
pub enum Branch {
    #[serde(rename_all = "camelCase")]
    Folders { space_id: SpaceId },
    #[serde(rename_all = "camelCase")]
    FolderLists {
        space_id: SpaceId,
        folder_id: FolderId,
    },
    #[serde(rename_all = "camelCase")]
    SpaceLists { space_id: SpaceId },
    Tasks { location: WorkspaceLocation },
    #[serde(rename_all = "camelCase")]
    SpaceTags { space_id: SpaceId },
}

/// A branch that could not be read.
#[derive(Debug, Clone, Serialize)]
pub struct BranchFailure {
    #[serde(flatten)]
    pub branch: Branch,
    pub attempts: u32,
    pub error: String,
}

/// Item produced by the walk.
#[derive(Debug, Clone)]
pub enum WalkEvent {
    /// Workspace selected for the walk; always the first event.
    Workspace(Team),
    Task(LocatedTask),
    /// Tags defined on a space (only when enabled with [`TreeWalker::with_space_tags`]).
    SpaceTags {
        space_id: SpaceId,
        tags: Vec<TaskTag>,
    },
    BranchFailed(BranchFailure),
}

/// Everything one walk produced.
#[derive(Debug, Clone, Default)]
pub struct Traversal {
    pub team: Option<Team>,
    pub tasks: Vec<LocatedTask>,
    /// Space-defined tags in walk order, duplicates across spaces included.
    pub space_tags: Vec<TaskTag>,
    pub failures: Vec<BranchFailure>,
}

impl Traversal {
    /// Some branches could not be read.
    #[must_use]
    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty()
    }

    #[must_use]
    pub fn catalogue(&self) -> TagCatalogue {
        TagCatalogue::from_tasks(&self.tasks)
    }
}

/// Workspace traversal over an [`Upstream`].
pub struct TreeWalker<'a, U: ?Sized> {
    upstream: &'a U,
    policy: RetryPolicy,
    space_tags: bool,
}

impl<'a, U: Upstream + ?Sized> TreeWalker<'a, U> {
    pub fn new(upstream: &'a U, policy: RetryPolicy) -> Self {
        Self {
            upstream,
            policy,
            space_tags: false,
        }
    }

    /// Also fetch each space's own tag list.
    #[must_use]
    pub fn with_space_tags(mut self, enabled: bool) -> Self {
        self.space_tags = enabled;
        self
    }

    /// Lazily walk the workspace.
    ///
    /// Failing to list teams or spaces, an unauthorized token, and cancellation end the
    /// stream with an error. Any other failure is yielded as [`WalkEvent::BranchFailed`].
    pub fn stream(
        &self,
        token: &'a AccessToken,
        cancel: &'a CancellationToken,
    ) -> impl Stream<Item = Result<WalkEvent, TagError>> + 'a {
        let state = WalkState {
            upstream: self.upstream,
            policy: self.policy,
            space_tags: self.space_tags,
            token,
            cancel,
            team: None,
            stack: Vec::new(),
            ready: VecDeque::new(),
        };

        futures::stream::try_unfold(state, |mut state| async move {
            let event = state.next_event().await?;
            Ok::<_, TagError>(event.map(|event| (event, state)))
        })
    }

    /// Walk the whole workspace and gather the results.
    pub async fn collect(
        &self,
        token: &'a AccessToken,
        cancel: &'a CancellationToken,
    ) -> Result<Traversal, TagError> {
        let stream = self.stream(token, cancel);
        futures::pin_mut!(stream);

        let mut traversal = Traversal::default();
        while let Some(event) = stream.try_next().await? {
            match event {
                WalkEvent::Workspace(team) => traversal.team = Some(team),
                WalkEvent::Task(task) => traversal.tasks.push(task),
                WalkEvent::SpaceTags { tags, .. } => traversal.space_tags.extend(tags),
                WalkEvent::BranchFailed(failure) => traversal.failures.push(failure),
            }
        }

        info!(
            tasks = traversal.tasks.len(),
            failed_branches = traversal.failures.len(),
            "Workspace traversal complete"
        );
        Ok(traversal)
    }
}

/// Work still to be expanded.
enum Pending {
    Space(Space),
    Folders(SpaceId),
    FolderLists {
        space_id: SpaceId,
        folder_id: FolderId,
    },
    SpaceLists(SpaceId),
    Tasks(WorkspaceLocation),
    SpaceTags(SpaceId),
}

struct WalkState<'a, U: ?Sized> {
    upstream: &'a U,
    policy: RetryPolicy,
    space_tags: bool,
    token: &'a AccessToken,
    cancel: &'a CancellationToken,
    team: Option<Team>,
    stack: Vec<Pending>,
    ready: VecDeque<WalkEvent>,
}

impl<U: Upstream + ?Sized> WalkState<'_, U> {
    async fn next_event(&mut self) -> Result<Option<WalkEvent>, TagError> {
        loop {
            if let Some(event) = self.ready.pop_front() {
                return Ok(Some(event));
            }

            let Some(team_id) = self.team.as_ref().map(|team| team.id.clone()) else {
                self.start().await?;
                continue;
            };

            let Some(node) = self.stack.pop() else {
                return Ok(None);
            };
            self.expand(&team_id, node).await?;
        }
    }

    /// Select the first team and queue its spaces.
    async fn start(&mut self) -> Result<(), TagError> {
        let (upstream, token) = (self.upstream, self.token);

        let teams = self
            .policy
            .run(self.cancel, "list_teams", || upstream.list_teams(token))
            .await?;
        let Some(team) = teams.into_iter().next() else {
            return Err(TagError::NotFound("no workspace visible to this token".into()));
        };

        let team_id = &team.id;
        let spaces = self
            .policy
            .run(self.cancel, "list_spaces", || {
                upstream.list_spaces(token, team_id)
            })
            .await?;

        info!(team_id = %team.id, spaces = spaces.len(), "Walking workspace");

        self.stack
            .extend(spaces.into_iter().rev().map(Pending::Space));
        self.ready.push_back(WalkEvent::Workspace(team.clone()));
        self.team = Some(team);
        Ok(())
    }

    async fn expand(&mut self, team_id: &TeamId, node: Pending) -> Result<(), TagError> {
        let (upstream, token) = (self.upstream, self.token);

        match node {
            Pending::Space(space) => {
                debug!(space_id = %space.id, name = %space.name, "Expanding space");
                // Popped in reverse: folders, then folder-less lists, then space tags.
                if self.space_tags {
                    self.stack.push(Pending::SpaceTags(space.id.clone()));
                }
                self.stack.push(Pending::SpaceLists(space.id.clone()));
                self.stack.push(Pending::Folders(space.id));
            }

            Pending::Folders(space_id) => {
                let fetched = self
                    .policy
                    .run(self.cancel, "list_folders", || {
                        upstream.list_folders(token, &space_id)
                    })
                    .await;
                match fetched {
                    Ok(folders) => {
                        self.stack.extend(folders.into_iter().rev().map(|folder| {
                            Pending::FolderLists {
                                space_id: space_id.clone(),
                                folder_id: folder.id,
                            }
                        }));
                    }
                    Err(err) => self.branch_failed(Branch::Folders { space_id }, err)?,
                }
            }

            Pending::FolderLists {
                space_id,
                folder_id,
            } => {
                let parent = ListParent::Folder(folder_id.clone());
                let fetched = self
                    .policy
                    .run(self.cancel, "list_lists", || upstream.list_lists(token, &parent))
                    .await;
                match fetched {
                    Ok(lists) => {
                        self.stack.extend(lists.into_iter().rev().map(|list| {
                            Pending::Tasks(WorkspaceLocation {
                                team_id: team_id.clone(),
                                space_id: space_id.clone(),
                                folder_id: Some(folder_id.clone()),
                                list_id: list.id,
                            })
                        }));
                    }
                    Err(err) => self.branch_failed(
                        Branch::FolderLists {
                            space_id,
                            folder_id,
                        },
                        err,
                    )?,
                }
            }

            Pending::SpaceLists(space_id) => {
                let parent = ListParent::Space(space_id.clone());
                let fetched = self
                    .policy
                    .run(self.cancel, "list_lists", || upstream.list_lists(token, &parent))
                    .await;
                match fetched {
                    Ok(lists) => {
                        self.stack.extend(lists.into_iter().rev().map(|list| {
                            Pending::Tasks(WorkspaceLocation {
                                team_id: team_id.clone(),
                                space_id: space_id.clone(),
                                folder_id: None,
                                list_id: list.id,
                            })
                        }));
                    }
                    Err(err) => self.branch_failed(Branch::SpaceLists { space_id }, err)?,
                }
            }

            Pending::Tasks(location) => {
                let list_id = &location.list_id;
                let fetched = self
                    .policy
                    .run(self.cancel, "list_tasks", || upstream.list_tasks(token, list_id))
                    .await;
                match fetched {
                    Ok(tasks) => {
                        if tasks.len() >= TASK_PAGE_SIZE {
                            debug!(
                                list_id = %location.list_id,
                                count = tasks.len(),
                                "List returned a full page; later pages are not read"
                            );
                        }
                        self.ready.extend(tasks.into_iter().map(|task| {
                            WalkEvent::Task(LocatedTask {
                                task,
                                location: location.clone(),
                            })
                        }));
                    }
                    Err(err) => self.branch_failed(Branch::Tasks { location }, err)?,
                }
            }

            Pending::SpaceTags(space_id) => {
                let fetched = self
                    .policy
                    .run(self.cancel, "list_space_tags", || {
                        upstream.list_space_tags(token, &space_id)
                    })
                    .await;
                match fetched {
                    Ok(tags) => self.ready.push_back(WalkEvent::SpaceTags { space_id, tags }),
                    Err(err) => self.branch_failed(Branch::SpaceTags { space_id }, err)?,
                }
            }
        }

        Ok(())
    }

    /// Record a failed branch, or end the walk if the failure is not branch-local.
    fn branch_failed(&mut self, branch: Branch, err: RetryError) -> Result<(), TagError> {
        match err {
            RetryError::Cancelled { .. } => Err(TagError::Cancelled),
            RetryError::Failed { source, .. } if source.is_unauthorized() => {
                Err(TagError::Unauthenticated)
            }
            RetryError::Failed { attempts, source } => {
                warn!(?branch, attempts, error = %source, "Workspace branch unreadable, skipping");
                self.ready.push_back(WalkEvent::BranchFailed(BranchFailure {
                    branch,
                    attempts,
                    error: source.to_string(),
                }));
                Ok(())
            }
        }
    }
}

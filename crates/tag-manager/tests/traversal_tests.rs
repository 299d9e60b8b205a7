//! Integration tests for workspace traversal and the tag catalogue.
//!
//! These tests drive [`TagService`] against an in-memory workspace with injected
//! upstream failures.

mod common;

use common::{service, tag, task, token, FakeWorkspace};
use futures::TryStreamExt;
use tag_manager::walker::{Branch, WalkEvent};
use tag_manager::{AccessToken, SpaceId, TagError, TreeWalker};
use tokio_util::sync::CancellationToken;

// =============================================================================
// Fixtures
// =============================================================================

/// Two spaces:
/// - `s1`: folder `f1` with list `l1` (tasks `a`, `b`) and folder-less list `l2` (task `c`)
/// - `s2`: folder-less list `l3` (task `d`)
fn two_space_workspace() -> FakeWorkspace {
    FakeWorkspace::new()
        .space("s1")
        .space("s2")
        .folder("s1", "f1")
        .folder_list("f1", "l1")
        .space_list("s1", "l2")
        .space_list("s2", "l3")
        .task("l1", task("a", "s1", &[tag("bug", "#ff0000"), tag("ui", "#333333")]))
        .task("l1", task("b", "s1", &[tag("bug", "#ff0000")]))
        .task("l2", task("c", "s1", &[tag("backend", "#00ff00")]))
        .task("l3", task("d", "s2", &[tag("bug", "#0000ff")]))
}

fn task_ids(tasks: &[tag_manager::LocatedTask]) -> Vec<&str> {
    tasks.iter().map(|t| t.task.id.as_str()).collect()
}

// =============================================================================
// Traversal
// =============================================================================

#[tokio::test]
async fn test_walk_reaches_folder_and_folderless_lists() {
    let service = service(two_space_workspace());

    let report = service
        .list_tasks(&token(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(task_ids(&report.tasks), vec!["a", "b", "c", "d"]);
    assert!(report.failures.is_empty());

    let c = &report.tasks[2];
    assert_eq!(c.location.space_id.as_str(), "s1");
    assert!(c.location.folder_id.is_none());
    assert_eq!(c.location.list_id.as_str(), "l2");

    let a = &report.tasks[0];
    assert_eq!(a.location.folder_id.as_ref().map(|f| f.as_str()), Some("f1"));
    assert_eq!(a.location.team_id.as_str(), "team1");
}

#[tokio::test]
async fn test_failed_branch_does_not_abort_siblings() {
    // Folders of s2 never load; its folder-less lists and all of s1 still do.
    let workspace = two_space_workspace()
        .folder("s2", "f2")
        .folder_list("f2", "l4")
        .task("l4", task("e", "s2", &[tag("bug", "#ff0000")]))
        .fail("list_folders", "s2", 500);
    let service = service(workspace);

    let report = service
        .list_tasks(&token(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(task_ids(&report.tasks), vec!["a", "b", "c", "d"]);
    assert_eq!(report.failures.len(), 1);

    let failure = &report.failures[0];
    assert_eq!(
        failure.branch,
        Branch::Folders {
            space_id: SpaceId::new("s2")
        }
    );
    assert_eq!(failure.attempts, 2);
    assert_eq!(service.upstream().calls("list_folders"), 3);
}

#[tokio::test]
async fn test_failed_task_list_is_reported_with_location() {
    let workspace = two_space_workspace().fail("list_tasks", "l1", 503);
    let service = service(workspace);

    let report = service
        .list_tags(&token(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.failures.len(), 1);
    match &report.failures[0].branch {
        Branch::Tasks { location } => {
            assert_eq!(location.list_id.as_str(), "l1");
            assert_eq!(location.space_id.as_str(), "s1");
        }
        other => panic!("unexpected branch: {other:?}"),
    }

    // `ui` only lived in the unreadable list.
    let names: Vec<_> = report.tags.iter().map(|e| e.tag.name.as_str()).collect();
    assert_eq!(names, vec!["backend", "bug"]);
}

#[tokio::test]
async fn test_transient_failure_recovers_within_budget() {
    let workspace = two_space_workspace().fail_times("list_tasks", "l2", 502, 1);
    let service = service(workspace);

    let report = service
        .list_tasks(&token(), &CancellationToken::new())
        .await
        .unwrap();

    assert!(report.failures.is_empty());
    assert_eq!(report.tasks.len(), 4);
}

#[tokio::test]
async fn test_invalid_token_is_not_retried() {
    let service = service(two_space_workspace());

    let result = service
        .list_tags(&AccessToken::new("pk_expired"), &CancellationToken::new())
        .await;

    assert!(matches!(result, Err(TagError::Unauthenticated)));
    assert_eq!(service.upstream().calls("list_teams"), 1);
    assert_eq!(service.upstream().calls("list_spaces"), 0);
}

#[tokio::test]
async fn test_empty_token_rejected_before_any_call() {
    let service = service(two_space_workspace());

    let result = service
        .list_tasks(&AccessToken::new(""), &CancellationToken::new())
        .await;

    assert!(matches!(result, Err(TagError::Unauthenticated)));
    assert_eq!(service.upstream().calls("list_teams"), 0);
}

#[tokio::test]
async fn test_unauthorized_branch_aborts_walk() {
    let workspace = two_space_workspace().fail("list_tasks", "l2", 401);
    let service = service(workspace);

    let result = service
        .list_tasks(&token(), &CancellationToken::new())
        .await;

    assert!(matches!(result, Err(TagError::Unauthenticated)));
    // Never retried, and s2 was never reached.
    assert_eq!(service.upstream().calls("list_tasks"), 2);
}

#[tokio::test]
async fn test_spaces_failure_is_fatal() {
    let workspace = two_space_workspace().fail("list_spaces", "team1", 500);
    let service = service(workspace);

    let result = service
        .list_tags(&token(), &CancellationToken::new())
        .await;

    assert!(matches!(
        result,
        Err(TagError::UpstreamUnavailable { attempts: 2, .. })
    ));
}

#[tokio::test]
async fn test_no_team_is_not_found() {
    let service = service(FakeWorkspace::without_teams());

    let result = service
        .list_tags(&token(), &CancellationToken::new())
        .await;

    assert!(matches!(result, Err(TagError::NotFound(_))));
}

#[tokio::test]
async fn test_cancellation_stops_walk() {
    let cancel = CancellationToken::new();
    let workspace = two_space_workspace().cancel_after("list_tasks", "l1", cancel.clone());
    let service = service(workspace);

    let result = service.list_tasks(&token(), &cancel).await;

    assert!(matches!(result, Err(TagError::Cancelled)));
    assert_eq!(service.upstream().calls("list_tasks"), 1);
}

#[tokio::test]
async fn test_stream_yields_workspace_first_and_failures_inline() {
    let workspace = two_space_workspace().fail("list_space_lists", "s1", 404);
    let policy = common::fast_retry().traversal();
    let tok = token();
    let cancel = CancellationToken::new();

    let walker = TreeWalker::new(&workspace, policy);
    let events: Vec<WalkEvent> = walker.stream(&tok, &cancel).try_collect().await.unwrap();

    assert!(matches!(&events[0], WalkEvent::Workspace(team) if team.id.as_str() == "team1"));

    let kinds: Vec<&str> = events
        .iter()
        .map(|event| match event {
            WalkEvent::Workspace(_) => "workspace",
            WalkEvent::Task(_) => "task",
            WalkEvent::SpaceTags { .. } => "space_tags",
            WalkEvent::BranchFailed(_) => "failed",
        })
        .collect();
    // l1 tasks, then the failed folder-less branch of s1, then s2.
    assert_eq!(kinds, vec!["workspace", "task", "task", "failed", "task"]);

    // 404 is not transient: a single attempt.
    assert_eq!(workspace.calls("list_space_lists"), 2);
}

// =============================================================================
// Catalogue
// =============================================================================

#[tokio::test]
async fn test_catalogue_dedupes_by_name_with_first_seen_metadata() {
    let service = service(two_space_workspace());

    let report = service
        .list_tags(&token(), &CancellationToken::new())
        .await
        .unwrap();

    let names: Vec<_> = report.tags.iter().map(|e| e.tag.name.as_str()).collect();
    assert_eq!(names, vec!["backend", "bug", "ui"]);

    let bug = &report.tags[1];
    assert_eq!(bug.usage_count, 3);
    assert_eq!(bug.task_count, 3);
    // First seen on task `a` in l1; the blue copy in s2 is ignored.
    assert_eq!(bug.tag.background_color.as_deref(), Some("#ff0000"));
    assert_eq!(bug.tag.list_id.as_str(), "l1");
    assert_eq!(bug.tag.space_id.as_str(), "s1");
    assert_eq!(bug.tag.creator_id, Some(7));
    assert!(bug.tag.created_date.is_some());
}

#[tokio::test]
async fn test_tag_names_are_case_sensitive() {
    let workspace = FakeWorkspace::new()
        .space("s1")
        .space_list("s1", "l1")
        .task("l1", task("a", "s1", &[tag("Bug", "#ff0000")]))
        .task("l1", task("b", "s1", &[tag("bug", "#ff0000")]));
    let service = service(workspace);

    let report = service
        .list_tags(&token(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.tags.len(), 2);
}

#[tokio::test]
async fn test_task_in_two_lists_counts_once_per_task() {
    let shared = task("a", "s1", &[tag("bug", "#ff0000")]);
    let workspace = FakeWorkspace::new()
        .space("s1")
        .space_list("s1", "l1")
        .space_list("s1", "l2")
        .task("l1", shared.clone())
        .task("l2", shared);
    let service = service(workspace);

    let report = service
        .list_tags(&token(), &CancellationToken::new())
        .await
        .unwrap();

    let bug = &report.tags[0];
    assert_eq!(bug.usage_count, 2);
    assert_eq!(bug.task_count, 1);
}

#[tokio::test]
async fn test_tag_usage_partitions_space_tags() {
    let workspace = two_space_workspace()
        .space_tag("s1", tag("bug", "#ff0000"))
        .space_tag("s1", tag("wontfix", "#999999"))
        .space_tag("s2", tag("bug", "#0000ff"))
        .space_tag("s2", tag("ui", "#333333"));
    let service = service(workspace);

    let report = service
        .tag_usage(&token(), &CancellationToken::new())
        .await
        .unwrap();

    let used: Vec<_> = report.usage.used.iter().map(|t| t.name.as_str()).collect();
    let unused: Vec<_> = report.usage.unused.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(used, vec!["bug", "ui"]);
    assert_eq!(unused, vec!["wontfix"]);
    assert_eq!(report.usage.used[0].tag_bg.as_deref(), Some("#ff0000"));
}

#[tokio::test]
async fn test_tag_usage_reports_unreadable_space_tags() {
    let workspace = two_space_workspace()
        .space_tag("s1", tag("bug", "#ff0000"))
        .fail("list_space_tags", "s2", 500);
    let service = service(workspace);

    let report = service
        .tag_usage(&token(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.failures.len(), 1);
    assert_eq!(
        report.failures[0].branch,
        Branch::SpaceTags {
            space_id: SpaceId::new("s2")
        }
    );
}

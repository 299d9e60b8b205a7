//! `ClickUp` entity type definitions and the tag catalogue data model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// Upstream identifiers arrive as strings on most endpoints and as numbers on a few.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Number(u64),
}

impl From<RawId> for String {
    fn from(raw: RawId) -> Self {
        match raw {
            RawId::Text(text) => text,
            RawId::Number(number) => number.to_string(),
        }
    }
}

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap a raw identifier.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                RawId::deserialize(deserializer).map(|raw| Self(raw.into()))
            }
        }
    };
}

string_id!(
    /// Workspace (team) identifier
    TeamId
);
string_id!(
    /// Space identifier
    SpaceId
);
string_id!(
    /// Folder identifier
    FolderId
);
string_id!(
    /// List identifier
    ListId
);
string_id!(
    /// Task identifier
    TaskId
);

/// Tag identity.
///
/// `ClickUp` has no stable tag id: two occurrences are the same tag iff their
/// names are equal, compared case-sensitively.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagName(String);

impl TagName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for TagName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for TagName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TagName {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl From<String> for TagName {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// Access token passed through to the upstream API.
///
/// `Debug` is redacted so tokens never reach the logs.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(***)")
    }
}

// =========================================================================
// Workspace hierarchy
// =========================================================================

/// `ClickUp` team (workspace)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Team {
    pub id: TeamId,
    #[serde(default)]
    pub name: String,
}

/// `ClickUp` space
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Space {
    pub id: SpaceId,
    #[serde(default)]
    pub name: String,
}

/// `ClickUp` folder
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Folder {
    pub id: FolderId,
    #[serde(default)]
    pub name: String,
}

/// `ClickUp` list
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct List {
    pub id: ListId,
    #[serde(default)]
    pub name: String,
}

/// Container a list hangs off.
///
/// Folder-less lists live directly under a space and form a branch parallel to folders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListParent {
    Folder(FolderId),
    Space(SpaceId),
}

/// Path through the workspace tree that produced a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceLocation {
    pub team_id: TeamId,
    pub space_id: SpaceId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub folder_id: Option<FolderId>,
    pub list_id: ListId,
}

// =========================================================================
// Tasks
// =========================================================================

/// `ClickUp` user (assignee or creator)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: u64,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

/// Task status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskStatus {
    pub status: String,
    #[serde(default)]
    pub color: Option<String>,
}

/// Task priority (`urgent`, `high`, `normal`, `low`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskPriority {
    pub priority: String,
    #[serde(default)]
    pub color: Option<String>,
}

/// Tag as it appears on a task or in a space's tag list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskTag {
    pub name: TagName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag_fg: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag_bg: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creator: Option<u64>,
}

impl TaskTag {
    /// A tag carrying only a name; upstream picks the colors.
    pub fn named(name: impl Into<TagName>) -> Self {
        Self {
            name: name.into(),
            tag_fg: None,
            tag_bg: None,
            creator: None,
        }
    }
}

/// Tag foreground/background pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagColor {
    pub foreground: String,
    pub background: String,
}

/// Reference to the space a task lives in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpaceRef {
    pub id: SpaceId,
}

/// `ClickUp` task snapshot, valid for a single traversal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub status: Option<TaskStatus>,
    #[serde(default)]
    pub priority: Option<TaskPriority>,
    #[serde(default)]
    pub assignees: Vec<User>,
    #[serde(default, deserialize_with = "timestamp_ms::deserialize_opt")]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub tags: Vec<TaskTag>,
    #[serde(default)]
    pub creator: Option<User>,
    #[serde(default, deserialize_with = "timestamp_ms::deserialize_opt")]
    pub date_created: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub space: Option<SpaceRef>,
}

impl Task {
    /// Look up a tag on this task by name.
    #[must_use]
    pub fn tag(&self, name: &str) -> Option<&TaskTag> {
        self.tags.iter().find(|tag| tag.name.as_str() == name)
    }

    #[must_use]
    pub fn has_tag(&self, name: &str) -> bool {
        self.tag(name).is_some()
    }
}

/// Task together with the branch of the tree it was read from.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocatedTask {
    pub task: Task,
    pub location: WorkspaceLocation,
}

// =========================================================================
// Tag catalogue
// =========================================================================

/// Tag metadata, seeded from the first occurrence seen during a traversal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    pub name: TagName,
    pub foreground_color: Option<String>,
    pub background_color: Option<String>,
    pub list_id: ListId,
    pub space_id: SpaceId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub folder_id: Option<FolderId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creator_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_date: Option<DateTime<Utc>>,
}

impl Tag {
    /// Build catalogue metadata from one occurrence of a tag on a task.
    #[must_use]
    pub fn from_occurrence(tag: &TaskTag, task: &Task, location: &WorkspaceLocation) -> Self {
        Self {
            name: tag.name.clone(),
            foreground_color: tag.tag_fg.clone(),
            background_color: tag.tag_bg.clone(),
            list_id: location.list_id.clone(),
            space_id: location.space_id.clone(),
            folder_id: location.folder_id.clone(),
            creator_id: tag.creator.or_else(|| task.creator.as_ref().map(|user| user.id)),
            created_date: task.date_created,
        }
    }
}

/// Deduplicated catalogue entry with usage counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TagCatalogueEntry {
    #[serde(flatten)]
    pub tag: Tag,
    /// Number of occurrences of the tag across all tasks
    pub usage_count: u32,
    /// Number of distinct tasks carrying the tag
    pub task_count: u32,
}

mod timestamp_ms {
    use chrono::{DateTime, Utc};
    use serde::{de::Error, Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(i64),
    }

    /// `ClickUp` sends timestamps as millisecond strings (sometimes numbers, sometimes null).
    pub fn deserialize_opt<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = match Option::<Raw>::deserialize(deserializer)? {
            None => return Ok(None),
            Some(Raw::Number(millis)) => millis,
            Some(Raw::Text(text)) if text.trim().is_empty() => return Ok(None),
            Some(Raw::Text(text)) => text.trim().parse::<i64>().map_err(D::Error::custom)?,
        };
        DateTime::from_timestamp_millis(millis)
            .map(Some)
            .ok_or_else(|| D::Error::custom(format!("timestamp out of range: {millis}")))
    }
}

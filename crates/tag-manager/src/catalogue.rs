//! Deduplicated tag catalogue built from a traversal.
//!
//! Identity is the tag name. Metadata reflects the first occurrence encountered
//! during the walk, not necessarily the canonical or most recent one: upstream
//! has no canonical tag object to compare against.

use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

use crate::models::{LocatedTask, Tag, TagCatalogueEntry, TagName, TaskId, TaskTag};

/// Name-keyed catalogue with usage counts.
#[derive(Debug, Clone, Default)]
pub struct TagCatalogue {
    entries: BTreeMap<TagName, TagCatalogueEntry>,
    /// Tasks already counted per tag, for `task_count`.
    seen: HashSet<(TagName, TaskId)>,
}

impl TagCatalogue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reduce a task sequence into a catalogue.
    pub fn from_tasks<'a>(tasks: impl IntoIterator<Item = &'a LocatedTask>) -> Self {
        let mut catalogue = Self::new();
        for task in tasks {
            catalogue.observe(task);
        }
        catalogue
    }

    /// Count every tag occurrence on one task.
    ///
    /// New names are seeded from this occurrence; known names only have their counts bumped.
    pub fn observe(&mut self, located: &LocatedTask) {
        let task = &located.task;
        for tag in &task.tags {
            let first_on_task = self.seen.insert((tag.name.clone(), task.id.clone()));

            match self.entries.get_mut(&tag.name) {
                Some(entry) => {
                    entry.usage_count += 1;
                    if first_on_task {
                        entry.task_count += 1;
                    }
                }
                None => {
                    self.entries.insert(
                        tag.name.clone(),
                        TagCatalogueEntry {
                            tag: Tag::from_occurrence(tag, task, &located.location),
                            usage_count: 1,
                            task_count: 1,
                        },
                    );
                }
            }
        }
    }

    /// Move the entry for `old` under `new`, mirroring a bulk rename.
    ///
    /// If `new` is already catalogued the two merge: the existing entry keeps its metadata,
    /// occurrences add up and a task carrying both names counts once. Returns `false` when
    /// `old` is not catalogued.
    pub fn rename(&mut self, old: &str, new: TagName) -> bool {
        if old == new.as_str() {
            return self.contains(old);
        }
        let Some(mut moved) = self.entries.remove(old) else {
            return false;
        };

        let carriers: Vec<TaskId> = self
            .seen
            .iter()
            .filter(|(name, _)| name.as_str() == old)
            .map(|(_, task_id)| task_id.clone())
            .collect();
        self.seen.retain(|(name, _)| name.as_str() != old);

        let mut added = 0;
        for task_id in carriers {
            if self.seen.insert((new.clone(), task_id)) {
                added += 1;
            }
        }

        match self.entries.get_mut(&new) {
            Some(existing) => {
                existing.usage_count += moved.usage_count;
                existing.task_count += added;
            }
            None => {
                moved.tag.name = new.clone();
                moved.task_count = added;
                self.entries.insert(new, moved);
            }
        }
        true
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&TagCatalogueEntry> {
        self.entries.get(name)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in name order.
    pub fn entries(&self) -> impl Iterator<Item = &TagCatalogueEntry> {
        self.entries.values()
    }

    #[must_use]
    pub fn into_entries(self) -> Vec<TagCatalogueEntry> {
        self.entries.into_values().collect()
    }

    /// Split a known tag catalogue into tags used by tasks in this traversal and unused ones.
    ///
    /// `known` is deduplicated by name with first-seen colors. `used` and `unused` are
    /// disjoint and together cover every known name.
    #[must_use]
    pub fn partition<'a>(&self, known: impl IntoIterator<Item = &'a TaskTag>) -> TagUsage {
        let mut seen = HashSet::new();
        let mut usage = TagUsage::default();

        for tag in known {
            if !seen.insert(tag.name.clone()) {
                continue;
            }
            if self.contains(tag.name.as_str()) {
                usage.used.push(tag.clone());
            } else {
                usage.unused.push(tag.clone());
            }
        }

        usage
    }
}

/// Used/unused split of the known tag catalogue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TagUsage {
    pub used: Vec<TaskTag>,
    pub unused: Vec<TaskTag>,
}

//! Work item identity and the exercise catalog

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tiku_common::{Error, Result};

/// One (group, index) unit of extraction work: a single exercise image
///
/// `group` is the difficulty level, `index` is the 1-based exercise number
/// within that level. Identity is fixed by the catalog bounds; items are
/// never created from user input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WorkItem {
    pub group: u32,
    pub index: u32,
}

impl WorkItem {
    pub fn new(group: u32, index: u32) -> Self {
        Self { group, index }
    }

    /// Store key: `"{group}-{index}"`, globally unique across the catalog
    pub fn key(&self) -> String {
        format!("{}-{}", self.group, self.index)
    }
}

impl std::fmt::Display for WorkItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.group, self.index)
    }
}

/// Per-group catalog entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSpec {
    /// Number of exercises in the group; indexes run 1..=item_count
    pub item_count: u32,
    /// Asset folder name under the root folder
    pub folder_name: String,
}

/// The canonical group → item count / asset folder table
///
/// A single validated table injected into the resolver, scanner and driver.
/// Historically each backfill script carried its own copy of this mapping
/// and the copies drifted (different folder spellings for the same level);
/// validation at construction closes that hole.
#[derive(Debug, Clone)]
pub struct Catalog {
    groups: BTreeMap<u32, GroupSpec>,
}

impl Catalog {
    /// Build a catalog from an explicit table, validating every entry
    pub fn new(groups: BTreeMap<u32, GroupSpec>) -> Result<Self> {
        if groups.is_empty() {
            return Err(Error::InvalidInput("catalog has no groups".to_string()));
        }

        let mut folders = HashSet::new();
        for (group, spec) in &groups {
            if spec.item_count == 0 {
                return Err(Error::InvalidInput(format!(
                    "group {} has zero items",
                    group
                )));
            }
            if spec.folder_name.trim().is_empty() {
                return Err(Error::InvalidInput(format!(
                    "group {} has no folder name",
                    group
                )));
            }
            if !folders.insert(spec.folder_name.as_str()) {
                return Err(Error::InvalidInput(format!(
                    "folder name '{}' is used by more than one group",
                    spec.folder_name
                )));
            }
        }

        Ok(Self { groups })
    }

    /// The standard ten-level exercise catalog
    pub fn standard() -> Self {
        let table = [
            (1, 40),
            (2, 45),
            (3, 50),
            (4, 50),
            (5, 52),
            (6, 52),
            (7, 54),
            (8, 55),
            (9, 58),
            (10, 60),
        ];

        let groups = table
            .iter()
            .map(|&(group, item_count)| {
                (
                    group,
                    GroupSpec {
                        item_count,
                        folder_name: format!("level{:02}", group),
                    },
                )
            })
            .collect();

        Self::new(groups).expect("standard catalog is valid")
    }

    pub fn group(&self, group: u32) -> Option<&GroupSpec> {
        self.groups.get(&group)
    }

    /// Groups in ascending order
    pub fn groups(&self) -> impl Iterator<Item = (u32, &GroupSpec)> {
        self.groups.iter().map(|(g, spec)| (*g, spec))
    }

    /// Every in-scope work item, in (group, index) order
    pub fn items(&self) -> Vec<WorkItem> {
        let mut items = Vec::with_capacity(self.total_items());
        for (group, spec) in self.groups() {
            for index in 1..=spec.item_count {
                items.push(WorkItem::new(group, index));
            }
        }
        items
    }

    pub fn total_items(&self) -> usize {
        self.groups.values().map(|s| s.item_count as usize).sum()
    }
}

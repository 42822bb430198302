//! Entry matching
//!
//! An entry is selected when its title equals the match key or any of its
//! whitespace-separated tags does (exact, case-sensitive). Groups are walked
//! depth-first: a group's own entries in stored order, then each child group
//! in stored order.
//!
//! The walk uses an explicit stack so deeply nested input cannot exhaust the
//! call stack.

use tracing::{debug, warn};

use crate::model::{Entry, Group};

/// Collect matching entries in traversal order
pub fn find_matches<'a>(groups: &'a [Group], key: &str) -> Vec<&'a Entry> {
    let mut matches = Vec::new();
    let mut stack: Vec<&Group> = groups.iter().rev().collect();

    while let Some(group) = stack.pop() {
        debug!(group = %group.name, entries = group.entries.len(), "scanning group");

        for entry in &group.entries {
            if is_match(entry, key) {
                matches.push(entry);
            }
        }

        // Reverse so the first child is popped next
        stack.extend(group.groups.iter().rev());
    }

    matches
}

fn is_match(entry: &Entry, key: &str) -> bool {
    entry.title() == key || entry.tags().any(|tag| tag == key)
}

/// Matched entries split into the store description and the secrets to print
#[derive(Debug, Default)]
pub struct Selection<'a> {
    /// The entry titled exactly as the match key, if any
    pub config: Option<&'a Entry>,
    /// Every other match, in traversal order
    pub entries: Vec<&'a Entry>,
}

impl<'a> Selection<'a> {
    /// Split matches on the match key.
    ///
    /// The first entry titled with the key becomes the config entry. Later
    /// entries with the same title are dropped, never printed as secrets.
    pub fn from_matches(matches: Vec<&'a Entry>, key: &str) -> Self {
        let mut selection = Selection::default();

        for entry in matches {
            if entry.title() != key {
                selection.entries.push(entry);
            } else if selection.config.is_none() {
                selection.config = Some(entry);
            } else {
                warn!("ignoring duplicate config entry titled '{}'", key);
            }
        }

        selection
    }

    /// Walk the tree and split in one step
    pub fn find(groups: &'a [Group], key: &str) -> Self {
        Self::from_matches(find_matches(groups, key), key)
    }

    pub fn is_empty(&self) -> bool {
        self.config.is_none() && self.entries.is_empty()
    }
}

//! Decrypted store tree
//!
//! Groups own their entries and child groups, so the tree is acyclic by
//! construction. Entries are immutable once built.

use std::collections::BTreeMap;

/// Standard field names
pub const TITLE: &str = "Title";
pub const USERNAME: &str = "UserName";
pub const PASSWORD: &str = "Password";
pub const URL: &str = "URL";
pub const NOTES: &str = "Notes";

/// A container node holding entries and subgroups in stored order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Group {
    pub name: String,
    pub entries: Vec<Entry>,
    pub groups: Vec<Group>,
}

impl Group {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_entry(mut self, entry: Entry) -> Self {
        self.entries.push(entry);
        self
    }

    pub fn with_group(mut self, group: Group) -> Self {
        self.groups.push(group);
        self
    }
}

/// A single secret record
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Entry {
    /// Raw tag string, whitespace delimited
    tags: String,
    fields: BTreeMap<String, String>,
}

impl Entry {
    pub fn new(title: impl Into<String>) -> Self {
        Self::default().with_field(TITLE, title)
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn with_tags(mut self, tags: impl Into<String>) -> Self {
        self.tags = tags.into();
        self
    }

    /// Field value, empty when absent
    pub fn field(&self, name: &str) -> &str {
        self.fields.get(name).map(String::as_str).unwrap_or("")
    }

    pub fn title(&self) -> &str {
        self.field(TITLE)
    }

    pub fn username(&self) -> &str {
        self.field(USERNAME)
    }

    pub fn password(&self) -> &str {
        self.field(PASSWORD)
    }

    pub fn url(&self) -> &str {
        self.field(URL)
    }

    pub fn notes(&self) -> &str {
        self.field(NOTES)
    }

    /// Individual tag tokens
    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.tags.split_whitespace()
    }
}

// Field values are secrets; keep them out of logs and panic messages.
impl std::fmt::Debug for Entry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Entry")
            .field("title", &self.title())
            .field("tags", &self.tags)
            .finish_non_exhaustive()
    }
}

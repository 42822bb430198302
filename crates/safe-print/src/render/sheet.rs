//! Printable sheet model
//!
//! Flattens a [`Selection`] into the sections that end up on paper: the store
//! itself first, then every selected entry in traversal order.

use chrono::{DateTime, Local};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::matcher::Selection;
use crate::model::Entry;

/// Timestamp format of the sheet heading
pub const CREATED_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One printed section
#[derive(Clone, Default, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SheetItem {
    pub title: String,
    pub username: String,
    pub password: String,
    pub url: String,
    pub description: String,
}

impl From<&Entry> for SheetItem {
    fn from(entry: &Entry) -> Self {
        Self {
            title: entry.title().to_string(),
            username: entry.username().to_string(),
            password: entry.password().to_string(),
            url: entry.url().to_string(),
            description: entry.notes().to_string(),
        }
    }
}

impl std::fmt::Debug for SheetItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SheetItem")
            .field("title", &self.title)
            .finish_non_exhaustive()
    }
}

/// Everything that goes on the printed page
#[derive(Debug, Clone)]
pub struct Sheet {
    pub created: String,
    pub store: SheetItem,
    pub items: Vec<SheetItem>,
}

impl Sheet {
    /// Build the sheet for a store.
    ///
    /// The store section carries the store name and its passphrase. A config
    /// entry overrides its username, URL and description.
    pub fn new(
        store_name: &str,
        passphrase: &str,
        selection: &Selection<'_>,
        created: DateTime<Local>,
    ) -> Self {
        let mut store = SheetItem {
            title: store_name.to_string(),
            password: passphrase.to_string(),
            username: String::new(),
            url: String::new(),
            description: String::new(),
        };

        if let Some(config) = selection.config {
            store.username = config.username().to_string();
            store.url = config.url().to_string();
            store.description = config.notes().to_string();
        }

        Self {
            created: created.format(CREATED_FORMAT).to_string(),
            store,
            items: selection.entries.iter().map(|e| SheetItem::from(*e)).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Group, NOTES, PASSWORD, URL, USERNAME};
    use chrono::TimeZone;

    fn created() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap()
    }

    #[test]
    fn test_store_section_defaults() {
        let selection = Selection::default();
        let sheet = Sheet::new("personal.kdbx", "master", &selection, created());

        assert_eq!(sheet.created, "2024-03-09 14:05:07");
        assert_eq!(sheet.store.title, "personal.kdbx");
        assert_eq!(sheet.store.password, "master");
        assert_eq!(sheet.store.description, "");
        assert!(sheet.items.is_empty());
    }

    #[test]
    fn test_config_entry_overrides_store_section() {
        let tree = vec![Group::new("Root")
            .with_entry(
                Entry::new("safe-print")
                    .with_field(PASSWORD, "not printed")
                    .with_field(USERNAME, "owner")
                    .with_field(URL, "https://keepass.info")
                    .with_field(NOTES, "Backup codes"),
            )
            .with_entry(
                Entry::new("VPN")
                    .with_tags("safe-print")
                    .with_field(PASSWORD, "p4ss")
                    .with_field(URL, "https://vpn.example"),
            )];
        let selection = Selection::find(&tree, "safe-print");

        let sheet = Sheet::new("personal.kdbx", "master", &selection, created());

        assert_eq!(sheet.store.title, "personal.kdbx");
        assert_eq!(sheet.store.password, "master");
        assert_eq!(sheet.store.username, "owner");
        assert_eq!(sheet.store.url, "https://keepass.info");
        assert_eq!(sheet.store.description, "Backup codes");

        assert_eq!(sheet.items.len(), 1);
        assert_eq!(sheet.items[0].title, "VPN");
        assert_eq!(sheet.items[0].password, "p4ss");
        assert_eq!(sheet.items[0].url, "https://vpn.example");
    }
}

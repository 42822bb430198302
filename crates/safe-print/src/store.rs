//! Store - KDBX credential store access
//!
//! Opens a KeePass database read-only with a passphrase and converts its tree
//! into the crate's own model. Decryption is delegated to the `keepass` crate.

use std::fs::File;
use std::path::{Path, PathBuf};

use keepass::db::{Entry as KdbxEntry, Group as KdbxGroup, Node};
use keepass::{Database, DatabaseKey};
use thiserror::Error;
use tracing::debug;

use crate::model::{Entry, Group, NOTES, PASSWORD, TITLE, URL, USERNAME};

/// Groups nested deeper than this are rejected
pub const MAX_GROUP_DEPTH: usize = 64;

/// Store-specific errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Cannot open {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot decrypt {}: {reason}", path.display())]
    Decrypt { path: PathBuf, reason: String },

    #[error("Group nesting exceeds {0} levels")]
    TooDeep(usize),
}

/// Source of a decrypted group tree
pub trait CredentialStore {
    /// Name shown for the store on the printed sheet
    fn name(&self) -> String;

    /// Decrypt and return the root groups
    fn open(&self, passphrase: &str) -> Result<Vec<Group>, StoreError>;
}

/// A KDBX file on disk
#[derive(Debug, Clone)]
pub struct KdbxFile {
    path: PathBuf,
}

impl KdbxFile {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialStore for KdbxFile {
    fn name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }

    fn open(&self, passphrase: &str) -> Result<Vec<Group>, StoreError> {
        let mut file = File::open(&self.path).map_err(|source| StoreError::Io {
            path: self.path.clone(),
            source,
        })?;

        let key = DatabaseKey::new().with_password(passphrase);
        let db = Database::open(&mut file, key).map_err(|e| StoreError::Decrypt {
            path: self.path.clone(),
            reason: e.to_string(),
        })?;

        debug!(path = %self.path.display(), "store decrypted");

        Ok(vec![convert_group(&db.root, 0)?])
    }
}

/// An already decrypted tree, used when the tree comes from somewhere other
/// than a file
#[derive(Debug, Clone)]
pub struct MemoryStore {
    pub name: String,
    pub groups: Vec<Group>,
}

impl CredentialStore for MemoryStore {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn open(&self, _passphrase: &str) -> Result<Vec<Group>, StoreError> {
        Ok(self.groups.clone())
    }
}

fn convert_group(source: &KdbxGroup, depth: usize) -> Result<Group, StoreError> {
    if depth >= MAX_GROUP_DEPTH {
        return Err(StoreError::TooDeep(MAX_GROUP_DEPTH));
    }

    let mut group = Group::new(source.name.clone());
    for node in &source.children {
        match node {
            Node::Entry(entry) => group.entries.push(convert_entry(entry)),
            Node::Group(child) => group.groups.push(convert_group(child, depth + 1)?),
        }
    }

    Ok(group)
}

fn convert_entry(source: &KdbxEntry) -> Entry {
    let mut entry = Entry::default().with_tags(source.tags.join(" "));

    for name in [TITLE, USERNAME, PASSWORD, URL, NOTES] {
        if let Some(value) = source.get(name) {
            entry = entry.with_field(name, value);
        }
    }

    entry
}

#[cfg(test)]
mod tests {
    use super::*;
    use keepass::db::Value;
    use secstr::SecStr;
    use std::io::Write;

    fn kdbx_entry(title: &str) -> KdbxEntry {
        let mut entry = KdbxEntry::new();
        entry
            .fields
            .insert(TITLE.to_string(), Value::Unprotected(title.to_string()));
        entry
    }

    #[test]
    fn test_store_name_is_file_name() {
        let store = KdbxFile::new(Path::new("/home/user/vaults/personal.kdbx"));
        assert_eq!(store.name(), "personal.kdbx");
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = KdbxFile::new(&dir.path().join("absent.kdbx"));

        let err = store.open("secret").unwrap_err();
        assert!(matches!(err, StoreError::Io { .. }));
    }

    #[test]
    fn test_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corrupt.kdbx");
        let mut file = File::create(&path).unwrap();
        file.write_all(b"this is not a keepass database").unwrap();

        let err = KdbxFile::new(&path).open("secret").unwrap_err();
        assert!(matches!(err, StoreError::Decrypt { .. }));
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryStore {
            name: "test.kdbx".to_string(),
            groups: vec![Group::new("Root").with_entry(Entry::new("VPN"))],
        };

        let groups = store.open("ignored").unwrap();
        assert_eq!(groups[0].entries[0].title(), "VPN");
        assert_eq!(store.name(), "test.kdbx");
    }

    #[test]
    fn test_convert_entries_before_groups() {
        let mut sub = KdbxGroup::new("Sub");
        sub.add_child(kdbx_entry("child"));

        let mut root = KdbxGroup::new("Root");
        root.add_child(kdbx_entry("first"));
        root.add_child(sub);
        root.add_child(kdbx_entry("second"));

        let group = convert_group(&root, 0).unwrap();
        assert_eq!(group.name, "Root");
        let titles: Vec<&str> = group.entries.iter().map(|e| e.title()).collect();
        assert_eq!(titles, vec!["first", "second"]);
        assert_eq!(group.groups.len(), 1);
        assert_eq!(group.groups[0].entries[0].title(), "child");
    }

    #[test]
    fn test_convert_entry_fields() {
        let mut source = kdbx_entry("VPN");
        source.tags = vec!["work".to_string(), "safe-print".to_string()];
        source.fields.insert(
            USERNAME.to_string(),
            Value::Unprotected("alice".to_string()),
        );
        source.fields.insert(
            PASSWORD.to_string(),
            Value::Protected(SecStr::new(b"p4ss".to_vec())),
        );
        source.fields.insert(
            URL.to_string(),
            Value::Unprotected("https://vpn.example".to_string()),
        );
        source
            .fields
            .insert("Custom".to_string(), Value::Unprotected("skipped".to_string()));

        let entry = convert_entry(&source);
        assert_eq!(entry.title(), "VPN");
        assert_eq!(entry.username(), "alice");
        assert_eq!(entry.password(), "p4ss");
        assert_eq!(entry.url(), "https://vpn.example");
        assert_eq!(entry.notes(), "");
        assert_eq!(entry.tags().collect::<Vec<_>>(), vec!["work", "safe-print"]);
        assert_eq!(entry.field("Custom"), "");
    }

    #[test]
    fn test_convert_depth_limit() {
        fn chain(levels: usize) -> KdbxGroup {
            let mut group = KdbxGroup::new("leaf");
            group.add_child(kdbx_entry("deep"));
            for depth in 1..levels {
                let mut parent = KdbxGroup::new(&format!("level-{}", depth));
                parent.add_child(group);
                group = parent;
            }
            group
        }

        assert!(convert_group(&chain(MAX_GROUP_DEPTH), 0).is_ok());
        assert!(matches!(
            convert_group(&chain(MAX_GROUP_DEPTH + 1), 0),
            Err(StoreError::TooDeep(MAX_GROUP_DEPTH))
        ));
    }
}

//! Durable storage for the allow-list
//!
//! The file holds a JSON array of user ids and is rewritten whole on every
//! change. A missing or unreadable file loads as an empty list.

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::PathBuf;

use crate::protocol::UserId;

pub trait AllowListStore: Send {
    fn load(&self) -> BTreeSet<UserId>;

    fn save(&self, users: &BTreeSet<UserId>) -> io::Result<()>;
}

#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl AllowListStore for JsonFileStore {
    fn load(&self) -> BTreeSet<UserId> {
        let raw = match fs::read(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return BTreeSet::new(),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Allow-list unreadable, starting empty");
                return BTreeSet::new();
            }
        };
        match serde_json::from_slice::<Vec<UserId>>(&raw) {
            Ok(users) => users.into_iter().collect(),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Allow-list corrupt, starting empty");
                BTreeSet::new()
            }
        }
    }

    fn save(&self, users: &BTreeSet<UserId>) -> io::Result<()> {
        let users: Vec<UserId> = users.iter().copied().collect();
        let json = serde_json::to_vec(&users).map_err(io::Error::other)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("allowed_users.json"));
        assert!(store.load().is_empty());
    }

    #[test]
    fn test_corrupt_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("allowed_users.json");
        fs::write(&path, b"{not json").unwrap();
        assert!(JsonFileStore::new(&path).load().is_empty());
    }

    #[test]
    fn test_save_writes_plain_id_array() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("allowed_users.json");
        let store = JsonFileStore::new(&path);

        let users: BTreeSet<UserId> = [UserId(42), UserId(7)].into_iter().collect();
        store.save(&users).unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "[7,42]");
        assert_eq!(store.load(), users);
    }
}

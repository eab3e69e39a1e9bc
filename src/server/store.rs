//! In-memory file store backing the server.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// A name-keyed store of immutable byte buffers.
///
/// Stored files are never mutated or deleted, so readers share the
/// buffer instead of copying it. The lock is held only for the duration
/// of a single lookup or insert, never across a transfer.
#[derive(Clone, Default)]
pub struct FileStore {
    files: Arc<Mutex<HashMap<String, Arc<[u8]>>>>,
}

impl FileStore {
    pub fn new() -> FileStore {
        FileStore::default()
    }

    pub fn exists(&self, name: &str) -> bool {
        self.files.lock().unwrap().contains_key(name)
    }

    pub fn read(&self, name: &str) -> Option<Arc<[u8]>> {
        self.files.lock().unwrap().get(name).cloned()
    }

    /// Commit `contents` under `name` unless the name is already taken.
    /// Returns whether the insert happened.
    pub fn insert_if_absent(&self, name: &str, contents: Vec<u8>) -> bool {
        let mut files = self.files.lock().unwrap();
        if files.contains_key(name) {
            return false;
        }
        files.insert(name.to_string(), contents.into());
        true
    }
}

//! A view of another storage restricted to a path prefix.

use std::sync::Arc;

use crate::error::Result;
use crate::storage::{Storage, StorageInput, StorageOutput};

/// Storage that maps every name to `<prefix>/<name>` in an inner storage.
#[derive(Debug, Clone)]
pub struct PrefixedStorage {
    prefix: String,
    inner: Arc<dyn Storage>,
}

impl PrefixedStorage {
    pub fn new(prefix: impl Into<String>, inner: Arc<dyn Storage>) -> Self {
        let prefix = prefix.into().trim_end_matches('/').to_string();
        PrefixedStorage { prefix, inner }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn full_name(&self, name: &str) -> String {
        if self.prefix.is_empty() {
            name.to_string()
        } else {
            format!("{}/{}", self.prefix, name)
        }
    }
}

impl Storage for PrefixedStorage {
    fn open_input(&self, name: &str) -> Result<Box<dyn StorageInput>> {
        self.inner.open_input(&self.full_name(name))
    }

    fn create_output(&self, name: &str) -> Result<Box<dyn StorageOutput>> {
        self.inner.create_output(&self.full_name(name))
    }

    fn file_exists(&self, name: &str) -> bool {
        self.inner.file_exists(&self.full_name(name))
    }

    fn delete_file(&self, name: &str) -> Result<()> {
        self.inner.delete_file(&self.full_name(name))
    }

    fn list_files(&self) -> Result<Vec<String>> {
        if self.prefix.is_empty() {
            return self.inner.list_files();
        }
        let head = format!("{}/", self.prefix);
        Ok(self
            .inner
            .list_files()?
            .into_iter()
            .filter_map(|name| name.strip_prefix(&head).map(str::to_string))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryStorage;

    #[test]
    fn test_prefix_isolation() {
        let root: Arc<dyn Storage> = Arc::new(MemoryStorage::default());
        let seg0 = PrefixedStorage::new("segment_0", root.clone());
        let seg1 = PrefixedStorage::new("segment_1/", root.clone());

        seg0.write_all("index/title/posting", b"0").unwrap();
        seg1.write_all("index/title/posting", b"1").unwrap();

        assert_eq!(seg0.read_all("index/title/posting").unwrap(), b"0");
        assert_eq!(seg1.read_all("index/title/posting").unwrap(), b"1");
        assert_eq!(seg1.list_files().unwrap(), vec!["index/title/posting"]);
        assert!(root.file_exists("segment_1/index/title/posting"));
    }
}

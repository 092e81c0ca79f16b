// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;

use crate::tail::error::Result;
use crate::tail::persistence::store::OffsetStore;

/// Volatile offset store keyed by the raw path.
///
/// Used by tests and when running without persistence. Nothing survives the
/// process, and no operation can fail.
#[derive(Debug, Default)]
pub struct InMemoryOffsetStore {
    offsets: RwLock<HashMap<PathBuf, u64>>,
}

impl InMemoryOffsetStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of paths with a stored offset
    pub fn len(&self) -> usize {
        self.offsets.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.read().is_empty()
    }
}

impl OffsetStore for InMemoryOffsetStore {
    fn get_offset(&self, path: &Path) -> Result<u64> {
        Ok(self.offsets.read().get(path).copied().unwrap_or(0))
    }

    fn set_offset(&self, path: &Path, offset: u64) -> Result<()> {
        self.offsets.write().insert(path.to_path_buf(), offset);
        Ok(())
    }

    fn delete_offset(&self, path: &Path) -> Result<()> {
        self.offsets.write().remove(path);
        Ok(())
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_store() {
        let store = InMemoryOffsetStore::new();
        let path = Path::new("/some/path.log");

        assert_eq!(store.get_offset(path).unwrap(), 0);
        assert!(store.is_empty());

        store.set_offset(path, 42).unwrap();
        assert_eq!(store.get_offset(path).unwrap(), 42);
        assert_eq!(store.len(), 1);

        store.delete_offset(path).unwrap();
        assert_eq!(store.get_offset(path).unwrap(), 0);
        assert!(store.is_empty());
    }

    #[test]
    fn test_in_memory_store_as_trait_object() {
        let store: Box<dyn OffsetStore> = Box::new(InMemoryOffsetStore::new());
        store.set_offset(Path::new("/a"), 7).unwrap();
        store.close().unwrap();
        store.close().unwrap();
        assert_eq!(store.get_offset(Path::new("/a")).unwrap(), 7);
    }
}

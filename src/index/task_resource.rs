//! Named resources that survive a restarted merge task.
//!
//! A resource is stored as `<type>/<name>`:
//! `magic: u32, length: u64, payload, crc32(payload): u32`.

use std::sync::Arc;

use crate::error::{IrisError, Result};
use crate::storage::Storage;
use crate::storage::structured::{StructReader, StructWriter};

const RESOURCE_MAGIC: u32 = 0x5253_4352; // "RSCR"

/// A value that can be committed to and reloaded from an
/// [`IndexTaskResourceManager`].
pub trait TaskResource: Sized {
    /// Directory the resource type lives in.
    const RESOURCE_TYPE: &'static str;

    fn encode(&self, out: &mut Vec<u8>) -> Result<()>;

    fn decode(bytes: &[u8]) -> Result<Self>;
}

#[derive(Debug, Clone)]
pub struct IndexTaskResourceManager {
    storage: Arc<dyn Storage>,
}

impl IndexTaskResourceManager {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        IndexTaskResourceManager { storage }
    }

    fn path<T: TaskResource>(name: &str) -> String {
        format!("{}/{name}", T::RESOURCE_TYPE)
    }

    pub fn has_resource<T: TaskResource>(&self, name: &str) -> bool {
        self.storage.file_exists(&Self::path::<T>(name))
    }

    pub fn commit<T: TaskResource>(&self, name: &str, resource: &T) -> Result<()> {
        let mut payload = Vec::new();
        resource.encode(&mut payload)?;
        let path = Self::path::<T>(name);
        let mut writer = StructWriter::new(self.storage.create_output(&path)?);
        writer.write_u32(RESOURCE_MAGIC)?;
        writer.write_u64(payload.len() as u64)?;
        writer.write_bytes(&payload)?;
        writer.write_u32(crc32fast::hash(&payload))?;
        writer.close()?;
        log::debug!("committed task resource [{path}] ({} bytes)", payload.len());
        Ok(())
    }

    /// Load a committed resource. Missing resources are `NotFound`.
    pub fn load<T: TaskResource>(&self, name: &str) -> Result<T> {
        let path = Self::path::<T>(name);
        if !self.storage.file_exists(&path) {
            return Err(IrisError::not_found(format!("task resource [{path}]")));
        }
        let mut reader = StructReader::new(self.storage.open_input(&path)?)?;
        if reader.read_u32()? != RESOURCE_MAGIC {
            return Err(IrisError::corruption(format!("bad magic in task resource [{path}]")));
        }
        let len = reader.read_u64()? as usize;
        let payload = reader.read_bytes(len)?;
        let crc = reader.read_u32()?;
        if crc != crc32fast::hash(&payload) {
            return Err(IrisError::corruption(format!("checksum mismatch in task resource [{path}]")));
        }
        T::decode(&payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryStorage;

    #[derive(Debug, PartialEq)]
    struct Counter(u64);

    impl TaskResource for Counter {
        const RESOURCE_TYPE: &'static str = "counter";

        fn encode(&self, out: &mut Vec<u8>) -> Result<()> {
            out.extend_from_slice(&self.0.to_le_bytes());
            Ok(())
        }

        fn decode(bytes: &[u8]) -> Result<Self> {
            let raw: [u8; 8] = bytes
                .try_into()
                .map_err(|_| IrisError::corruption("counter"))?;
            Ok(Counter(u64::from_le_bytes(raw)))
        }
    }

    #[test]
    fn test_commit_and_load() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::default());
        let manager = IndexTaskResourceManager::new(storage.clone());
        assert!(!manager.has_resource::<Counter>("a"));
        assert!(matches!(manager.load::<Counter>("a"), Err(IrisError::NotFound(_))));

        manager.commit("a", &Counter(11)).unwrap();
        assert!(manager.has_resource::<Counter>("a"));
        assert_eq!(manager.load::<Counter>("a").unwrap(), Counter(11));
    }

    #[test]
    fn test_checksum_detects_damage() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::default());
        let manager = IndexTaskResourceManager::new(storage.clone());
        manager.commit("a", &Counter(11)).unwrap();

        let mut bytes = storage.read_all("counter/a").unwrap();
        bytes[12] ^= 0xFF;
        storage.write_all("counter/a", &bytes).unwrap();
        assert!(matches!(manager.load::<Counter>("a"), Err(IrisError::Corruption(_))));
    }
}

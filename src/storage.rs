//! Pluggable storage backends.
//!
//! Segments, truncate meta files and task resources are all written through
//! the [`Storage`] trait so the merge code never touches paths directly.

pub mod file;
pub mod memory;
pub mod prefixed;
pub mod structured;

use std::fmt::Debug;
use std::io::{Read, Seek, Write};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::storage::file::{FileStorage, FileStorageConfig};
use crate::storage::memory::{MemoryStorage, MemoryStorageConfig};

/// Readable, seekable handle to a stored file.
pub trait StorageInput: Read + Seek + Send + Debug {
    /// Total size of the file in bytes.
    fn size(&self) -> Result<u64>;
}

/// Writable handle to a stored file. Data becomes visible on [`close`](StorageOutput::close).
pub trait StorageOutput: Write + Seek + Send + Debug {
    /// Flush buffered data and make it durable.
    fn flush_and_sync(&mut self) -> Result<()>;

    /// Finish writing the file.
    fn close(&mut self) -> Result<()>;
}

impl StorageInput for Box<dyn StorageInput> {
    fn size(&self) -> Result<u64> {
        self.as_ref().size()
    }
}

impl StorageOutput for Box<dyn StorageOutput> {
    fn flush_and_sync(&mut self) -> Result<()> {
        self.as_mut().flush_and_sync()
    }

    fn close(&mut self) -> Result<()> {
        self.as_mut().close()
    }
}

/// A flat namespace of files.
pub trait Storage: Send + Sync + Debug {
    /// Open an existing file for reading.
    fn open_input(&self, name: &str) -> Result<Box<dyn StorageInput>>;

    /// Create (or truncate) a file for writing.
    fn create_output(&self, name: &str) -> Result<Box<dyn StorageOutput>>;

    /// Whether `name` exists.
    fn file_exists(&self, name: &str) -> bool;

    /// Remove `name`. Removing a missing file is not an error.
    fn delete_file(&self, name: &str) -> Result<()>;

    /// All file names, relative to this storage.
    fn list_files(&self) -> Result<Vec<String>>;

    /// Read a whole file into memory.
    fn read_all(&self, name: &str) -> Result<Vec<u8>> {
        let mut input = self.open_input(name)?;
        let mut data = Vec::with_capacity(input.size()? as usize);
        input.read_to_end(&mut data)?;
        Ok(data)
    }

    /// Write a whole file in one go.
    fn write_all(&self, name: &str, data: &[u8]) -> Result<()> {
        let mut output = self.create_output(name)?;
        output.write_all(data)?;
        output.close()
    }
}

/// Storage backend selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StorageConfig {
    Memory(MemoryStorageConfig),
    File(FileStorageConfig),
}

/// Creates storage backends from a [`StorageConfig`].
pub struct StorageFactory;

impl StorageFactory {
    pub fn create(config: StorageConfig) -> Result<Arc<dyn Storage>> {
        match config {
            StorageConfig::Memory(config) => Ok(Arc::new(MemoryStorage::new(config))),
            StorageConfig::File(config) => Ok(Arc::new(FileStorage::new(config)?)),
        }
    }
}

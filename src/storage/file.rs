//! File system storage rooted at a directory.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{IrisError, Result};
use crate::storage::{Storage, StorageInput, StorageOutput};

/// Configuration for [`FileStorage`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileStorageConfig {
    /// Root directory.
    pub path: PathBuf,

    /// Call `fsync` when an output is closed.
    #[serde(default = "default_sync_on_close")]
    pub sync_on_close: bool,
}

fn default_sync_on_close() -> bool {
    true
}

impl FileStorageConfig {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        FileStorageConfig {
            path: path.as_ref().to_path_buf(),
            sync_on_close: true,
        }
    }
}

/// Storage backed by regular files below a root directory.
#[derive(Debug)]
pub struct FileStorage {
    root: PathBuf,
    sync_on_close: bool,
}

impl FileStorage {
    pub fn new(config: FileStorageConfig) -> Result<Self> {
        fs::create_dir_all(&config.path)?;
        Ok(FileStorage {
            root: config.path,
            sync_on_close: config.sync_on_close,
        })
    }

    fn full_path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    fn collect_files(&self, dir: &Path, names: &mut Vec<String>) -> Result<()> {
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_dir() {
                self.collect_files(&path, names)?;
            } else if let Ok(relative) = path.strip_prefix(&self.root) {
                let name = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect::<Vec<_>>()
                    .join("/");
                names.push(name);
            }
        }
        Ok(())
    }
}

impl Storage for FileStorage {
    fn open_input(&self, name: &str) -> Result<Box<dyn StorageInput>> {
        let path = self.full_path(name);
        if !path.is_file() {
            return Err(IrisError::not_found(format!("file not found: {name}")));
        }
        let file = File::open(&path)?;
        let size = file.metadata()?.len();
        Ok(Box::new(FileInput { file, size }))
    }

    fn create_output(&self, name: &str) -> Result<Box<dyn StorageOutput>> {
        let path = self.full_path(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)?;
        Ok(Box::new(FileOutput {
            writer: BufWriter::new(file),
            sync_on_close: self.sync_on_close,
            closed: false,
        }))
    }

    fn file_exists(&self, name: &str) -> bool {
        self.full_path(name).is_file()
    }

    fn delete_file(&self, name: &str) -> Result<()> {
        let path = self.full_path(name);
        if path.is_file() {
            fs::remove_file(path)?;
        }
        Ok(())
    }

    fn list_files(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        self.collect_files(&self.root, &mut names)?;
        names.sort();
        Ok(names)
    }
}

#[derive(Debug)]
struct FileInput {
    file: File,
    size: u64,
}

impl Read for FileInput {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.file.read(buf)
    }
}

impl Seek for FileInput {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        self.file.seek(pos)
    }
}

impl StorageInput for FileInput {
    fn size(&self) -> Result<u64> {
        Ok(self.size)
    }
}

#[derive(Debug)]
struct FileOutput {
    writer: BufWriter<File>,
    sync_on_close: bool,
    closed: bool,
}

impl Write for FileOutput {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.writer.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }
}

impl Seek for FileOutput {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        self.writer.seek(pos)
    }
}

impl StorageOutput for FileOutput {
    fn flush_and_sync(&mut self) -> Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.writer.flush()?;
        if self.sync_on_close {
            self.writer.get_ref().sync_all()?;
        }
        self.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::Builder;

    #[test]
    fn test_file_storage_roundtrip() {
        let dir = Builder::new().prefix("test_file_storage").tempdir().unwrap();
        let storage = FileStorage::new(FileStorageConfig::new(dir.path())).unwrap();

        storage.write_all("segment_0/index/title/posting", b"abc").unwrap();
        assert!(storage.file_exists("segment_0/index/title/posting"));
        assert_eq!(
            storage.read_all("segment_0/index/title/posting").unwrap(),
            b"abc"
        );
        assert_eq!(
            storage.list_files().unwrap(),
            vec!["segment_0/index/title/posting".to_string()]
        );

        storage.delete_file("segment_0/index/title/posting").unwrap();
        assert!(!storage.file_exists("segment_0/index/title/posting"));
    }
}

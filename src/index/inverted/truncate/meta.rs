//! Truncate meta files: the boundary value of every truncated term.
//!
//! One UTF-8 line per term, `"<dict key>\t<i64 value>\n"`, in dictionary
//! order. The value is the ranking value of the last document kept, so for
//! a descending profile every kept document is `>= value` and the reader
//! reports the range `[value, i64::MAX]`; for an ascending one
//! `[i64::MIN, value]`.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Arc;

use crate::error::{IrisError, Result};
use crate::index::inverted::DictKeyInfo;
use crate::storage::Storage;

/// Directory of truncate meta files inside a segment.
pub const TRUNCATE_META_DIR: &str = "truncate_meta";

pub fn truncate_meta_file(truncate_index_name: &str) -> String {
    format!("{TRUNCATE_META_DIR}/{truncate_index_name}")
}

#[derive(Debug, Clone, Default)]
pub struct TruncateMetaReader {
    desc: bool,
    ranges: BTreeMap<DictKeyInfo, (i64, i64)>,
}

impl TruncateMetaReader {
    pub fn new(desc: bool) -> Self {
        TruncateMetaReader {
            desc,
            ranges: BTreeMap::new(),
        }
    }

    /// Load `truncate_meta/<truncate_index_name>` from `storage`.
    pub fn open(storage: &dyn Storage, truncate_index_name: &str, desc: bool) -> Result<Self> {
        let name = truncate_meta_file(truncate_index_name);
        if !storage.file_exists(&name) {
            return Err(IrisError::not_found(format!("truncate meta file [{name}]")));
        }
        let bytes = storage.read_all(&name)?;
        let content = std::str::from_utf8(&bytes)
            .map_err(|e| IrisError::corruption(format!("truncate meta [{name}]: {e}")))?;
        let mut reader = Self::new(desc);
        reader.parse(content)?;
        log::debug!("loaded {} truncate meta records from [{name}]", reader.len());
        Ok(reader)
    }

    pub fn parse(&mut self, content: &str) -> Result<()> {
        for line in content.lines().filter(|l| !l.trim().is_empty()) {
            let (key, value) = line
                .split_once('\t')
                .ok_or_else(|| IrisError::corruption(format!("bad truncate meta line [{line}]")))?;
            let key: DictKeyInfo = key.trim().parse()?;
            let value: i64 = value.trim().parse().map_err(|e| {
                IrisError::corruption(format!("bad truncate meta value in [{line}]: {e}"))
            })?;
            self.add(key, value);
        }
        Ok(())
    }

    pub fn add(&mut self, key: DictKeyInfo, value: i64) {
        let range = if self.desc {
            (value, i64::MAX)
        } else {
            (i64::MIN, value)
        };
        self.ranges.insert(key, range);
    }

    /// The recorded `[min, max]` of `key`.
    pub fn lookup(&self, key: &DictKeyInfo) -> Option<(i64, i64)> {
        self.ranges.get(key).copied()
    }

    pub fn contains(&self, key: &DictKeyInfo) -> bool {
        self.ranges.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }
}

/// Collects meta lines of one truncate index and writes them on close.
#[derive(Debug)]
pub struct TruncateMetaWriter {
    storage: Arc<dyn Storage>,
    file_name: String,
    content: String,
    records: usize,
}

impl TruncateMetaWriter {
    pub fn new(storage: Arc<dyn Storage>, truncate_index_name: &str) -> Self {
        TruncateMetaWriter {
            storage,
            file_name: truncate_meta_file(truncate_index_name),
            content: String::new(),
            records: 0,
        }
    }

    pub fn write(&mut self, key: &DictKeyInfo, value: i64) {
        // writing into a String cannot fail
        let _ = writeln!(self.content, "{key}\t{value}");
        self.records += 1;
    }

    pub fn record_count(&self) -> usize {
        self.records
    }

    pub fn close(&mut self) -> Result<()> {
        self.storage.write_all(&self.file_name, self.content.as_bytes())?;
        log::debug!("wrote {} truncate meta records to [{}]", self.records, self.file_name);
        self.content.clear();
        Ok(())
    }
}

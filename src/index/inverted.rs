//! Inverted index storage and merging.

pub mod adaptive_bitmap;
pub mod dictionary;
pub mod doc_mapper;
pub mod merger;
pub mod multi_segment_writer;
pub mod patch;
pub mod posting;
pub mod segment;
pub mod term_extender;
pub mod term_queue;
pub mod truncate;

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{IrisError, Result};

/// Dictionary key of a term. The null term (documents without a value)
/// orders after every regular key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DictKeyInfo {
    pub key: u64,
    pub is_null: bool,
}

impl DictKeyInfo {
    pub fn new(key: u64) -> Self {
        DictKeyInfo {
            key,
            is_null: false,
        }
    }

    /// The key of the null term.
    pub fn null() -> Self {
        DictKeyInfo {
            key: u64::MAX,
            is_null: true,
        }
    }
}

impl Ord for DictKeyInfo {
    fn cmp(&self, other: &Self) -> Ordering {
        self.is_null
            .cmp(&other.is_null)
            .then(self.key.cmp(&other.key))
    }
}

impl PartialOrd for DictKeyInfo {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for DictKeyInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null {
            write!(f, "{}:true", self.key)
        } else {
            write!(f, "{}", self.key)
        }
    }
}

impl FromStr for DictKeyInfo {
    type Err = IrisError;

    fn from_str(s: &str) -> Result<Self> {
        let (key, is_null) = match s.split_once(':') {
            Some((key, "true")) => (key, true),
            Some((key, "false")) => (key, false),
            Some(_) => {
                return Err(IrisError::corruption(format!("invalid dictionary key [{s}]")));
            }
            None => (s, false),
        };
        let key = key
            .parse::<u64>()
            .map_err(|e| IrisError::corruption(format!("invalid dictionary key [{s}]: {e}")))?;
        Ok(DictKeyInfo { key, is_null })
    }
}

/// Which dictionary of an index a term comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TermIndexKind {
    /// Regular posting list with term frequencies and payloads.
    Normal,
    /// Doc-id bitmap of a high-frequency term.
    Bitmap,
}

impl TermIndexKind {
    pub fn dictionary_file(self) -> &'static str {
        match self {
            TermIndexKind::Normal => "dictionary",
            TermIndexKind::Bitmap => "bitmap_dictionary",
        }
    }

    pub fn posting_file(self) -> &'static str {
        match self {
            TermIndexKind::Normal => "posting",
            TermIndexKind::Bitmap => "bitmap_posting",
        }
    }
}

/// Directory of an index inside a segment.
pub fn index_dir(index_name: &str) -> String {
    format!("index/{index_name}")
}

//! # Iris Truncate
//!
//! Merge-time inverted index truncation for the Iris search engine.
//!
//! When segments are merged, every inverted index is rewritten into the
//! target segments. For terms whose posting lists grow past a strategy's
//! threshold, truncate indexes keep only the best documents according to a
//! truncate profile (attribute sort keys, doc payload, filters and distinct
//! constraints).
//!
//! ## Features
//!
//! - Bucket-sorted and payload-sorted top-K selection per term
//! - Attribute filters and distinct-value constraints
//! - Truncate meta files for incremental rebuilds
//! - Adaptive bitmaps, high-frequency vocabularies and update patches
//! - Pluggable storage backends

pub mod error;
pub mod index;
pub mod schema;
pub mod storage;
pub mod util;

pub use error::{IrisError, Result};
pub use index::inverted::DictKeyInfo;
pub use index::inverted::doc_mapper::{DocMapper, TargetSplit};
pub use index::inverted::merger::{
    InvertedIndexMerger, MergeStats, SegmentMergePlan, merge_inverted_indexes,
};
pub use index::inverted::segment::{SourceSegment, TargetSegment};
pub use index::inverted::truncate::config::{
    TruncateOptionConfig, TruncateProfileConfig, TruncateStrategy, TruncateStrategyType,
};
pub use index::merge_options::MergeOptions;
pub use index::{DocId, DocPayload};
pub use schema::{AttributeConfig, FieldType, IndexSchema, InvertedIndexConfig};
pub use storage::{Storage, StorageConfig, StorageFactory};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

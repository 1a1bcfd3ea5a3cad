//! Source and target segments of a merge.

use std::fmt;
use std::sync::Arc;

use ahash::AHashMap;
use bit_vec::BitVec;

use crate::index::DocId;
use crate::index::attribute::AttributeDiskIndexer;
use crate::storage::Storage;

pub type SegmentId = u32;

/// A segment being merged away.
#[derive(Clone)]
pub struct SourceSegment {
    pub segment_id: SegmentId,
    pub doc_count: u32,
    deletions: BitVec,
    pub storage: Arc<dyn Storage>,
    pub attributes: AHashMap<String, Arc<dyn AttributeDiskIndexer>>,
}

impl SourceSegment {
    pub fn new(segment_id: SegmentId, doc_count: u32, storage: Arc<dyn Storage>) -> Self {
        SourceSegment {
            segment_id,
            doc_count,
            deletions: BitVec::from_elem(doc_count as usize, false),
            storage,
            attributes: AHashMap::new(),
        }
    }

    /// Mark documents as deleted. Ids outside the segment are ignored.
    pub fn with_deleted(mut self, doc_ids: &[DocId]) -> Self {
        for &doc_id in doc_ids {
            if doc_id < self.doc_count {
                self.deletions.set(doc_id as usize, true);
            }
        }
        self
    }

    pub fn with_attribute(
        mut self,
        name: impl Into<String>,
        indexer: Arc<dyn AttributeDiskIndexer>,
    ) -> Self {
        self.attributes.insert(name.into(), indexer);
        self
    }

    pub fn is_deleted(&self, doc_id: DocId) -> bool {
        self.deletions.get(doc_id as usize).unwrap_or(false)
    }

    pub fn deleted_count(&self) -> usize {
        self.deletions.iter().filter(|deleted| *deleted).count()
    }

    pub fn attribute(&self, name: &str) -> Option<&Arc<dyn AttributeDiskIndexer>> {
        self.attributes.get(name)
    }
}

impl fmt::Debug for SourceSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceSegment")
            .field("segment_id", &self.segment_id)
            .field("doc_count", &self.doc_count)
            .field("deleted", &self.deleted_count())
            .field("attributes", &self.attributes.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// A segment produced by a merge.
#[derive(Debug, Clone)]
pub struct TargetSegment {
    pub segment_id: SegmentId,
    pub storage: Arc<dyn Storage>,
}

impl TargetSegment {
    pub fn new(segment_id: SegmentId, storage: Arc<dyn Storage>) -> Self {
        TargetSegment {
            segment_id,
            storage,
        }
    }
}

//! Per-term document selection.
//!
//! A collector walks a term's merged posting list and keeps between
//! `min_doc_count` and `max_doc_count` documents (`max` only differs from
//! `min` when a distinct constraint may pull in extra documents). The
//! result is always ascending by doc id. [`DocCollector::min_value_doc_id`]
//! is the kept document with the worst ranking value.

pub mod creator;
pub mod no_sort;
pub mod sort;

use crate::error::Result;
use crate::index::DocId;
use crate::index::inverted::DictKeyInfo;
use crate::index::inverted::posting::PostingIterator;
use crate::index::inverted::truncate::distinctor::DocDistinctor;
use crate::index::inverted::truncate::filter::DocFilterProcessor;

/// Capacity above which [`CollectorCore::reset`] gives memory back.
const DOC_ID_SHRINK_THRESHOLD: usize = 64 * 1024;

pub trait DocCollector: Send {
    /// Select the documents of one term. `posting` must be positioned
    /// before its first document.
    fn collect_doc_ids(
        &mut self,
        key: &DictKeyInfo,
        posting: &mut dyn PostingIterator,
        doc_freq: u64,
    ) -> Result<()>;

    /// Kept documents of the last term, ascending.
    fn truncate_doc_ids(&self) -> &[DocId];

    fn min_value_doc_id(&self) -> Option<DocId>;

    /// Drop all state of the last term.
    fn reset(&mut self);

    /// Advisory memory estimate for a term with `doc_freq` documents.
    fn estimate_memory_use(&self, doc_freq: u64) -> usize;
}

/// State shared by every collector.
pub struct CollectorCore {
    pub min_doc_count: u64,
    pub max_doc_count: u64,
    pub filter: Option<Box<dyn DocFilterProcessor>>,
    pub distinctor: Option<Box<dyn DocDistinctor>>,
    pub doc_ids: Vec<DocId>,
    pub min_value_doc_id: Option<DocId>,
}

impl CollectorCore {
    pub fn new(
        min_doc_count: u64,
        max_doc_count: u64,
        filter: Option<Box<dyn DocFilterProcessor>>,
        distinctor: Option<Box<dyn DocDistinctor>>,
    ) -> Self {
        CollectorCore {
            min_doc_count,
            max_doc_count: max_doc_count.max(min_doc_count),
            filter,
            distinctor,
            doc_ids: Vec::new(),
            min_value_doc_id: None,
        }
    }

    /// Prepare for a term. `false` when the filter rules out every document.
    pub fn begin_term(&mut self, key: &DictKeyInfo, posting: &dyn PostingIterator) -> bool {
        self.doc_ids.clear();
        self.min_value_doc_id = None;
        if let Some(distinctor) = self.distinctor.as_mut() {
            distinctor.reset();
        }
        match self.filter.as_mut() {
            Some(filter) => filter.begin_filter(key, posting),
            None => true,
        }
    }

    pub fn is_filtered(&mut self, doc_id: DocId, posting: &dyn PostingIterator) -> Result<bool> {
        match self.filter.as_mut() {
            Some(filter) => filter.is_filtered(doc_id, posting),
            None => Ok(false),
        }
    }

    pub fn reset(&mut self) {
        self.doc_ids.clear();
        if self.doc_ids.capacity() > DOC_ID_SHRINK_THRESHOLD {
            self.doc_ids.shrink_to(DOC_ID_SHRINK_THRESHOLD);
        }
        self.min_value_doc_id = None;
        if let Some(distinctor) = self.distinctor.as_mut() {
            distinctor.reset();
        }
    }

    pub fn estimate_memory_use(&self, doc_freq: u64) -> usize {
        let kept = doc_freq.min(self.max_doc_count) as usize;
        kept * std::mem::size_of::<DocId>()
            + self
                .distinctor
                .as_ref()
                .map_or(0, |distinctor| distinctor.estimate_memory_use())
    }
}

/// Cap a `u64` count to what fits in memory indexing.
pub(crate) fn clamp_count(count: u64) -> usize {
    usize::try_from(count).unwrap_or(usize::MAX)
}

//! Keeps the first documents of the posting list, in doc id order.

use crate::error::Result;
use crate::index::DocId;
use crate::index::inverted::DictKeyInfo;
use crate::index::inverted::posting::PostingIterator;
use crate::index::inverted::truncate::collector::{CollectorCore, DocCollector};

pub struct NoSortTruncateCollector {
    core: CollectorCore,
}

impl NoSortTruncateCollector {
    pub fn new(core: CollectorCore) -> Self {
        NoSortTruncateCollector { core }
    }
}

impl DocCollector for NoSortTruncateCollector {
    fn collect_doc_ids(
        &mut self,
        key: &DictKeyInfo,
        posting: &mut dyn PostingIterator,
        _doc_freq: u64,
    ) -> Result<()> {
        if !self.core.begin_term(key, &*posting) {
            return Ok(());
        }
        let (min, max) = (self.core.min_doc_count, self.core.max_doc_count);
        while let Some(doc_id) = posting.next_doc() {
            if self.core.is_filtered(doc_id, &*posting)? {
                continue;
            }
            self.core.doc_ids.push(doc_id);
            let kept = self.core.doc_ids.len() as u64;
            match self.core.distinctor.as_mut() {
                None => {
                    if kept >= min {
                        break;
                    }
                }
                Some(distinctor) => {
                    let full = distinctor.distinct(doc_id)?;
                    if (full && kept >= min) || kept >= max {
                        break;
                    }
                }
            }
        }
        self.core.min_value_doc_id = self.core.doc_ids.last().copied();
        Ok(())
    }

    fn truncate_doc_ids(&self) -> &[DocId] {
        &self.core.doc_ids
    }

    fn min_value_doc_id(&self) -> Option<DocId> {
        self.core.min_value_doc_id
    }

    fn reset(&mut self) {
        self.core.reset();
    }

    fn estimate_memory_use(&self, doc_freq: u64) -> usize {
        self.core.estimate_memory_use(doc_freq)
    }
}

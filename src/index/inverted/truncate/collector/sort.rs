//! Ranked selection: the best `min_doc_count` documents of a term, widened
//! up to `max_doc_count` when a distinct constraint is not yet satisfied.
//!
//! [`BucketSortTruncateCollector`] ranks by attributes through a
//! precomputed [`BucketMap`]: documents are binned by coarse bucket and only
//! the buckets that can still contribute are sorted.
//! [`PayloadSortTruncateCollector`] ranks by the posting's doc payload,
//! which differs per term, with a recursive partial selection that breaks
//! ties on the following sort keys.

use std::cmp::Ordering;
use std::sync::Arc;

use crate::error::Result;
use crate::index::DocId;
use crate::index::inverted::DictKeyInfo;
use crate::index::inverted::posting::PostingIterator;
use crate::index::inverted::truncate::bucket_map::BucketMap;
use crate::index::inverted::truncate::collector::{CollectorCore, DocCollector, clamp_count};
use crate::index::inverted::truncate::comparator::Comparator;
use crate::index::inverted::truncate::evaluator::Evaluator;
use crate::index::inverted::truncate::reference::{DocInfo, DocInfoAllocator};

pub struct BucketSortTruncateCollector {
    core: CollectorCore,
    bucket_map: Arc<BucketMap>,
    buckets: Vec<Vec<DocId>>,
    new_doc_count: u64,
    memory_optimize_threshold: u64,
}

impl BucketSortTruncateCollector {
    pub fn new(
        core: CollectorCore,
        bucket_map: Arc<BucketMap>,
        memory_optimize_threshold: u64,
    ) -> Self {
        let bucket_count = bucket_map.bucket_count() as usize;
        let new_doc_count = bucket_map.total_count() as u64;
        BucketSortTruncateCollector {
            core,
            bucket_map,
            buckets: vec![Vec::new(); bucket_count],
            new_doc_count,
            memory_optimize_threshold,
        }
    }

    fn clear_buckets(&mut self) {
        for bucket in &mut self.buckets {
            bucket.clear();
        }
    }

    /// Bin every accepted document, dropping buckets that can no longer
    /// contribute. Returns the last bucket still admitted and the number of
    /// binned documents.
    fn recollect(&mut self, posting: &mut dyn PostingIterator, doc_freq: u64) -> Result<(usize, u64)> {
        let max = self.core.max_doc_count;
        if doc_freq.saturating_mul(100)
            >= self.memory_optimize_threshold.saturating_mul(self.new_doc_count)
        {
            let expected = clamp_count(doc_freq) / self.buckets.len().max(1) + 1;
            for bucket in &mut self.buckets {
                bucket.reserve(expected);
            }
        }

        let mut cursor = self.buckets.len() - 1;
        let mut total = 0u64;
        while let Some(doc_id) = posting.next_doc() {
            if self.core.is_filtered(doc_id, &*posting)? {
                continue;
            }
            let bucket = self.bucket_map.bucket_value(doc_id) as usize;
            if bucket > cursor {
                continue;
            }
            self.buckets[bucket].push(doc_id);
            total += 1;
            while cursor > 0 && total - self.buckets[cursor].len() as u64 >= max {
                total -= self.buckets[cursor].len() as u64;
                self.buckets[cursor].clear();
                cursor -= 1;
            }
        }
        Ok((cursor, total))
    }

    fn sort_bucket(&mut self, idx: usize) {
        let map = &self.bucket_map;
        self.buckets[idx].sort_unstable_by_key(|&doc_id| map.sort_value(doc_id));
    }

    /// Documents, in rank order, needed until the distinct budget is full.
    fn doc_count_to_reserve_with_distinct(&mut self, cursor: usize) -> Result<u64> {
        let (min, max) = (self.core.min_doc_count, self.core.max_doc_count);
        let mut count = 0u64;
        'buckets: for idx in 0..=cursor {
            self.sort_bucket(idx);
            let Some(distinctor) = self.core.distinctor.as_mut() else {
                break;
            };
            for &doc_id in &self.buckets[idx] {
                count += 1;
                if distinctor.distinct(doc_id)? || count >= max {
                    break 'buckets;
                }
            }
        }
        Ok(count.clamp(min, max))
    }
}

impl DocCollector for BucketSortTruncateCollector {
    fn collect_doc_ids(
        &mut self,
        key: &DictKeyInfo,
        posting: &mut dyn PostingIterator,
        doc_freq: u64,
    ) -> Result<()> {
        self.clear_buckets();
        if !self.core.begin_term(key, &*posting) {
            return Ok(());
        }
        let (cursor, total) = self.recollect(posting, doc_freq)?;

        let reserve = if self.core.distinctor.is_some() {
            self.doc_count_to_reserve_with_distinct(cursor)?
        } else {
            self.core.min_doc_count
        };
        let reserve = clamp_count(reserve.min(total));

        for idx in 0..=cursor {
            if self.core.doc_ids.len() >= reserve {
                break;
            }
            if self.buckets[idx].is_empty() {
                continue;
            }
            self.sort_bucket(idx);
            let take = (reserve - self.core.doc_ids.len()).min(self.buckets[idx].len());
            self.core.doc_ids.extend_from_slice(&self.buckets[idx][..take]);
        }
        self.core.min_value_doc_id = self.core.doc_ids.last().copied();
        self.core.doc_ids.sort_unstable();
        self.clear_buckets();
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
        self.clear_buckets();
    }

    fn estimate_memory_use(&self, doc_freq: u64) -> usize {
        self.core.estimate_memory_use(doc_freq)
            + clamp_count(doc_freq).saturating_mul(std::mem::size_of::<DocId>())
            + self.buckets.len() * std::mem::size_of::<Vec<DocId>>()
    }
}

/// One candidate of the payload ranking.
#[derive(Debug)]
struct Doc {
    doc_id: DocId,
    info: DocInfo,
}

pub struct PayloadSortTruncateCollector {
    core: CollectorCore,
    allocator: DocInfoAllocator,
    evaluator: Box<dyn Evaluator>,
    /// One per sort key; the first ranks by doc payload.
    comparators: Vec<Box<dyn Comparator>>,
    docs: Vec<Doc>,
}

impl PayloadSortTruncateCollector {
    pub fn new(
        core: CollectorCore,
        allocator: DocInfoAllocator,
        evaluator: Box<dyn Evaluator>,
        comparators: Vec<Box<dyn Comparator>>,
    ) -> Self {
        PayloadSortTruncateCollector {
            core,
            allocator,
            evaluator,
            comparators,
            docs: Vec::new(),
        }
    }

    fn release_docs(&mut self) {
        for doc in self.docs.drain(..) {
            self.allocator.deallocate(doc.info);
        }
    }

    fn order(comparator: &dyn Comparator, a: &Doc, b: &Doc) -> Ordering {
        if comparator.less_than(&a.info, &b.info) {
            Ordering::Less
        } else if comparator.less_than(&b.info, &a.info) {
            Ordering::Greater
        } else {
            Ordering::Equal
        }
    }

    /// Total ranking order: every sort key, then doc id.
    fn full_order(comparators: &[Box<dyn Comparator>], a: &Doc, b: &Doc) -> Ordering {
        comparators
            .iter()
            .map(|c| Self::order(c.as_ref(), a, b))
            .find(|o| o.is_ne())
            .unwrap_or_else(|| a.doc_id.cmp(&b.doc_id))
    }

    /// Move the `need` best documents of `docs` to its front, in any order.
    ///
    /// Selects on sort key `dim`; when the documents equal to the boundary
    /// straddle it, only that run is selected again on the next key. Past
    /// the last key ties go to the lower doc id.
    fn select_top(comparators: &[Box<dyn Comparator>], docs: &mut [Doc], need: usize, dim: usize) {
        if need == 0 || need >= docs.len() {
            return;
        }
        let Some(comparator) = comparators.get(dim) else {
            docs.select_nth_unstable_by_key(need - 1, |doc| doc.doc_id);
            return;
        };
        let comparator = comparator.as_ref();
        let nth = need - 1;
        docs.select_nth_unstable_by(nth, |a, b| Self::order(comparator, a, b));

        let (left, rest) = docs.split_at_mut(nth);
        let Some((pivot, right)) = rest.split_first_mut() else {
            return;
        };
        let pivot = &*pivot;
        // gather the pivot's equals on both sides of it
        let mut l_eq = left.len();
        let mut i = 0;
        while i < l_eq {
            if Self::order(comparator, &left[i], pivot).is_eq() {
                l_eq -= 1;
                left.swap(i, l_eq);
            } else {
                i += 1;
            }
        }
        let mut r_len = 0;
        for j in 0..right.len() {
            if Self::order(comparator, &right[j], pivot).is_eq() {
                right.swap(j, r_len);
                r_len += 1;
            }
        }
        let r_eq = nth + 1 + r_len;
        if r_eq - l_eq <= 1 {
            return;
        }
        Self::select_top(comparators, &mut docs[l_eq..r_eq], need - l_eq, dim + 1);
    }

    /// Put the `count` best of `docs[begin..]` first, in ranking order.
    fn select_and_sort(comparators: &[Box<dyn Comparator>], docs: &mut [Doc], begin: usize, count: usize) {
        let slice = &mut docs[begin..];
        Self::select_top(comparators, slice, count, 0);
        slice[..count].sort_unstable_by(|a, b| Self::full_order(comparators, a, b));
    }

    fn truncate(&mut self) -> Result<()> {
        let n = self.docs.len();
        let min = clamp_count(self.core.min_doc_count);
        let max = clamp_count(self.core.max_doc_count);
        let mut count = min.min(n);
        if count == 0 {
            return Ok(());
        }
        Self::select_and_sort(&self.comparators, &mut self.docs, 0, count);

        if let Some(distinctor) = self.core.distinctor.as_mut() {
            for doc in &self.docs[..count] {
                distinctor.distinct(doc.doc_id)?;
            }
            let extra = max.min(n).saturating_sub(count);
            if !distinctor.is_full() && extra > 0 {
                Self::select_and_sort(&self.comparators, &mut self.docs, count, extra);
                let end = count + extra;
                for doc in &self.docs[count..end] {
                    count += 1;
                    if distinctor.distinct(doc.doc_id)? {
                        break;
                    }
                }
            }
        }

        self.core.min_value_doc_id = Some(self.docs[count - 1].doc_id);
        self.core
            .doc_ids
            .extend(self.docs[..count].iter().map(|doc| doc.doc_id));
        self.core.doc_ids.sort_unstable();
        Ok(())
    }
}

impl DocCollector for PayloadSortTruncateCollector {
    fn collect_doc_ids(
        &mut self,
        key: &DictKeyInfo,
        posting: &mut dyn PostingIterator,
        _doc_freq: u64,
    ) -> Result<()> {
        self.release_docs();
        if !self.core.begin_term(key, &*posting) {
            return Ok(());
        }
        while let Some(doc_id) = posting.next_doc() {
            if self.core.is_filtered(doc_id, &*posting)? {
                continue;
            }
            let mut info = self.allocator.allocate();
            info.set_doc_id(doc_id);
            self.evaluator.evaluate(doc_id, Some(&*posting), &mut info)?;
            self.docs.push(Doc { doc_id, info });
        }
        let result = self.truncate();
        self.release_docs();
        result
    }

    fn truncate_doc_ids(&self) -> &[DocId] {
        &self.core.doc_ids
    }

    fn min_value_doc_id(&self) -> Option<DocId> {
        self.core.min_value_doc_id
    }

    fn reset(&mut self) {
        self.core.reset();
        self.release_docs();
    }

    fn estimate_memory_use(&self, doc_freq: u64) -> usize {
        let per_doc = self.allocator.doc_info_size() + std::mem::size_of::<Doc>();
        self.core.estimate_memory_use(doc_freq) + clamp_count(doc_freq).saturating_mul(per_doc)
    }
}

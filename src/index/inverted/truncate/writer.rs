//! Writes one truncate index: for every triggered term, the postings of
//! the documents its collector keeps.

use crate::error::{IrisError, Result};
use crate::index::inverted::DictKeyInfo;
use crate::index::inverted::multi_segment_writer::MultiSegmentPostingWriter;
use crate::index::inverted::posting::{PostingData, PostingEntry, PostingIterator};
use crate::index::inverted::truncate::collector::DocCollector;
use crate::index::inverted::truncate::evaluator::Evaluator;
use crate::index::inverted::truncate::meta::TruncateMetaWriter;
use crate::index::inverted::truncate::trigger::{TruncateTrigger, TruncateTriggerInfo};

pub trait TruncateIndexWriter: Send {
    fn truncate_index_name(&self) -> &str;

    fn need_truncate(&self, info: &TruncateTriggerInfo) -> bool;

    /// Truncate one term. `posting` iterates the merged doc space.
    fn add_posting(
        &mut self,
        key: &DictKeyInfo,
        posting: &mut dyn PostingIterator,
        doc_freq: u64,
    ) -> Result<()>;

    /// Flush dictionary, postings and truncate meta.
    fn end_posting(&mut self) -> Result<()>;

    fn estimate_memory_use(&self, doc_freq: u64) -> usize;
}

/// Boundary values of a sort-by-attribute profile, written to the truncate
/// meta file.
pub struct TruncateMetaOutput {
    pub writer: TruncateMetaWriter,
    /// Evaluates the primary sort attribute.
    pub evaluator: Box<dyn Evaluator>,
}

pub struct SingleTruncateIndexWriter {
    truncate_index_name: String,
    trigger: Box<dyn TruncateTrigger>,
    collector: Box<dyn DocCollector>,
    posting_writer: Option<MultiSegmentPostingWriter>,
    meta: Option<TruncateMetaOutput>,
    buffer: PostingData,
    truncated_terms: usize,
}

impl SingleTruncateIndexWriter {
    pub fn new(
        truncate_index_name: impl Into<String>,
        trigger: Box<dyn TruncateTrigger>,
        collector: Box<dyn DocCollector>,
        posting_writer: MultiSegmentPostingWriter,
        meta: Option<TruncateMetaOutput>,
    ) -> Self {
        SingleTruncateIndexWriter {
            truncate_index_name: truncate_index_name.into(),
            trigger,
            collector,
            posting_writer: Some(posting_writer),
            meta,
            buffer: PostingData::new(),
            truncated_terms: 0,
        }
    }

    pub fn truncated_terms(&self) -> usize {
        self.truncated_terms
    }

    /// Rebuild the sub-posting of the kept documents from `posting`.
    fn rebuild_posting(&mut self, key: &DictKeyInfo, posting: &mut dyn PostingIterator) -> Result<()> {
        self.buffer.clear();
        posting.reset();
        for &doc_id in self.collector.truncate_doc_ids() {
            if posting.seek_doc(doc_id) != Some(doc_id) {
                return Err(IrisError::internal(format!(
                    "kept doc {doc_id} of term {key} is not in its posting list"
                )));
            }
            self.buffer.push(PostingEntry {
                doc_id,
                term_freq: posting.term_freq(),
                doc_payload: posting.doc_payload(),
            })?;
        }
        Ok(())
    }

    fn truncate_term(
        &mut self,
        key: &DictKeyInfo,
        posting: &mut dyn PostingIterator,
        doc_freq: u64,
    ) -> Result<()> {
        self.collector.collect_doc_ids(key, posting, doc_freq)?;
        if self.collector.truncate_doc_ids().is_empty() {
            return Ok(());
        }
        self.rebuild_posting(key, posting)?;
        let writer = self.posting_writer.as_mut().ok_or_else(|| {
            IrisError::invalid_operation(format!(
                "truncate index [{}] already ended",
                self.truncate_index_name
            ))
        })?;
        writer.write_term(*key, &self.buffer)?;
        self.truncated_terms += 1;
        self.write_meta(key)
    }

    fn write_meta(&mut self, key: &DictKeyInfo) -> Result<()> {
        let (Some(meta), Some(doc_id)) = (self.meta.as_mut(), self.collector.min_value_doc_id()) else {
            return Ok(());
        };
        let value = meta.evaluator.value(doc_id, None)?;
        meta.writer.write(key, value as i64);
        Ok(())
    }
}

impl TruncateIndexWriter for SingleTruncateIndexWriter {
    fn truncate_index_name(&self) -> &str {
        &self.truncate_index_name
    }

    fn need_truncate(&self, info: &TruncateTriggerInfo) -> bool {
        self.trigger.need_truncate(info)
    }

    fn add_posting(
        &mut self,
        key: &DictKeyInfo,
        posting: &mut dyn PostingIterator,
        doc_freq: u64,
    ) -> Result<()> {
        if !self.need_truncate(&TruncateTriggerInfo::new(*key, doc_freq)) {
            return Ok(());
        }
        posting.reset();
        let result = self.truncate_term(key, posting, doc_freq);
        self.collector.reset();
        result
    }

    fn end_posting(&mut self) -> Result<()> {
        if let Some(writer) = self.posting_writer.take() {
            writer.close()?;
        }
        if let Some(meta) = self.meta.as_mut() {
            meta.writer.close()?;
        }
        log::info!(
            "truncate index [{}] done: {} terms truncated",
            self.truncate_index_name,
            self.truncated_terms
        );
        Ok(())
    }

    fn estimate_memory_use(&self, doc_freq: u64) -> usize {
        self.collector.estimate_memory_use(doc_freq)
            + self.buffer.capacity() * std::mem::size_of::<PostingEntry>()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::index::attribute::MemoryAttributeIndexer;
    use crate::index::inverted::dictionary::InvertedIndexSegmentReader;
    use crate::index::inverted::doc_mapper::{DocMapper, TargetSplit};
    use crate::index::inverted::posting::BufferedPostingIterator;
    use crate::index::inverted::segment::{SourceSegment, TargetSegment};
    use crate::index::inverted::truncate::collector::CollectorCore;
    use crate::index::inverted::truncate::collector::no_sort::NoSortTruncateCollector;
    use crate::index::inverted::truncate::evaluator::create_attribute_evaluator;
    use crate::index::inverted::truncate::meta::TruncateMetaReader;
    use crate::index::inverted::truncate::reference::DocInfoAllocator;
    use crate::index::inverted::truncate::trigger::DefaultTruncateTrigger;
    use crate::index::inverted::{TermIndexKind, index_dir};
    use crate::schema::FieldType;
    use crate::storage::Storage;
    use crate::storage::memory::MemoryStorage;

    #[test]
    fn test_triggered_terms_are_truncated_with_meta() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::default());
        let sources = vec![SourceSegment::new(0, 8, storage.clone())];
        let mapper = Arc::new(DocMapper::build(&sources, TargetSplit::Even(1)).unwrap());
        let output: Arc<dyn Storage> = Arc::new(MemoryStorage::default());
        let targets = vec![TargetSegment::new(1, output.clone())];
        let dir = index_dir("title_p");
        let posting_writer =
            MultiSegmentPostingWriter::new(&targets, &dir, TermIndexKind::Normal, mapper).unwrap();

        let mut allocator = DocInfoAllocator::new();
        let reference = allocator.declare_reference("price", FieldType::Int64, false).unwrap();
        let values: Vec<Option<i64>> = (0..8).map(|v| Some(v * 10)).collect();
        let column = Arc::new(MemoryAttributeIndexer::from_values(FieldType::Int64, false, &values).unwrap());
        let meta = TruncateMetaOutput {
            writer: TruncateMetaWriter::new(output.clone(), "title_p"),
            evaluator: create_attribute_evaluator(column, reference),
        };

        let mut writer = SingleTruncateIndexWriter::new(
            "title_p",
            Box::new(DefaultTruncateTrigger::new(3)),
            Box::new(NoSortTruncateCollector::new(CollectorCore::new(2, 2, None, None))),
            posting_writer,
            Some(meta),
        );

        let short = Arc::new(PostingData::from_doc_ids(&[1, 2, 3]).unwrap());
        let mut iter = BufferedPostingIterator::new(short);
        writer.add_posting(&DictKeyInfo::new(1), &mut iter, 3).unwrap();

        let entries = vec![
            PostingEntry::with_payload(2, 20),
            PostingEntry::with_payload(4, 40),
            PostingEntry::with_payload(5, 50),
            PostingEntry::with_payload(7, 70),
        ];
        let long = Arc::new(PostingData::from_entries(entries).unwrap());
        let mut iter = BufferedPostingIterator::new(long);
        // the iterator may arrive already consumed
        while iter.next_doc().is_some() {}
        writer.add_posting(&DictKeyInfo::new(2), &mut iter, 4).unwrap();
        assert_eq!(writer.truncated_terms(), 1);
        writer.end_posting().unwrap();

        let reader = InvertedIndexSegmentReader::open(output.as_ref(), &dir, TermIndexKind::Normal)
            .unwrap()
            .unwrap();
        assert!(reader.lookup(&DictKeyInfo::new(1)).is_none());
        let posting = reader.read_posting(reader.lookup(&DictKeyInfo::new(2)).unwrap()).unwrap();
        assert_eq!(
            posting.entries(),
            &[PostingEntry::with_payload(2, 20), PostingEntry::with_payload(4, 40)]
        );

        let meta = TruncateMetaReader::open(output.as_ref(), "title_p", true).unwrap();
        assert_eq!(meta.lookup(&DictKeyInfo::new(2)), Some((40, i64::MAX)));
    }
}

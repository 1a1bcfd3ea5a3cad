//! Extra outputs derived from a merged term: adaptive bitmap and truncate
//! indexes.

use std::sync::Arc;

use crate::error::Result;
use crate::index::inverted::DictKeyInfo;
use crate::index::inverted::adaptive_bitmap::AdaptiveBitmapIndexWriter;
use crate::index::inverted::posting::PostingData;
use crate::index::inverted::truncate::multi_writer::MultiTruncateIndexWriter;
use crate::index::inverted::truncate::trigger::TruncateTriggerInfo;
use crate::schema::InvertedIndexConfig;

/// What happens to the normal posting of a term after extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TermOperation {
    Keep,
    /// The term lives in a bitmap only.
    Discard,
}

pub struct IndexTermExtender {
    index_config: InvertedIndexConfig,
    adaptive_bitmap: Option<AdaptiveBitmapIndexWriter>,
    truncate: Option<MultiTruncateIndexWriter>,
}

impl IndexTermExtender {
    pub fn new(
        index_config: InvertedIndexConfig,
        adaptive_bitmap: Option<AdaptiveBitmapIndexWriter>,
        truncate: Option<MultiTruncateIndexWriter>,
    ) -> Self {
        IndexTermExtender {
            index_config,
            adaptive_bitmap,
            truncate,
        }
    }

    pub fn has_truncate(&self) -> bool {
        self.truncate.is_some()
    }

    /// Feed one merged term. `posting` holds merged doc ids.
    pub fn extend_term(&mut self, key: DictKeyInfo, posting: &Arc<PostingData>) -> Result<TermOperation> {
        let doc_freq = posting.doc_freq();
        let mut adapted = false;
        if let Some(bitmap) = self.adaptive_bitmap.as_mut()
            && bitmap.need_adapt(&key, doc_freq)
        {
            bitmap.add_posting(key, posting)?;
            adapted = true;
        }
        if let Some(truncate) = self.truncate.as_mut()
            && truncate.need_truncate(&TruncateTriggerInfo::new(key, doc_freq))
        {
            truncate.add_posting(key, posting.clone(), doc_freq)?;
        }

        let in_vocabulary = !key.is_null && self.index_config.in_high_frequency_vocabulary(key.key);
        if self.index_config.bitmap_only() && (adapted || in_vocabulary) {
            Ok(TermOperation::Discard)
        } else {
            Ok(TermOperation::Keep)
        }
    }

    /// Flush truncate indexes and the adaptive bitmap.
    pub fn finish(self) -> Result<()> {
        if let Some(mut truncate) = self.truncate {
            truncate.end_posting()?;
        }
        if let Some(bitmap) = self.adaptive_bitmap {
            bitmap.close()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::inverted::adaptive_bitmap::adaptive_bitmap_dir;
    use crate::index::inverted::dictionary::InvertedIndexSegmentReader;
    use crate::index::inverted::doc_mapper::{DocMapper, TargetSplit};
    use crate::index::inverted::TermIndexKind;
    use crate::index::inverted::segment::{SourceSegment, TargetSegment};
    use crate::schema::{AdaptiveBitmapTrigger, HighFrequencyTermPostingType};
    use crate::storage::Storage;
    use crate::storage::memory::MemoryStorage;

    fn extender(posting_type: HighFrequencyTermPostingType) -> (IndexTermExtender, Arc<dyn Storage>) {
        let sources = vec![SourceSegment::new(0, 10, Arc::new(MemoryStorage::default()))];
        let mapper = Arc::new(DocMapper::build(&sources, TargetSplit::Even(1)).unwrap());
        let output: Arc<dyn Storage> = Arc::new(MemoryStorage::default());
        let targets = vec![TargetSegment::new(1, output.clone())];
        let trigger = AdaptiveBitmapTrigger::DocFrequency(3);
        let config = InvertedIndexConfig::new("title")
            .with_high_frequency_vocabulary(vec![7], posting_type)
            .with_adaptive_bitmap(trigger);
        let bitmap = AdaptiveBitmapIndexWriter::new("title", trigger, &targets, mapper).unwrap();
        (IndexTermExtender::new(config, Some(bitmap), None), output)
    }

    fn posting(doc_ids: &[u32]) -> Arc<PostingData> {
        Arc::new(PostingData::from_doc_ids(doc_ids).unwrap())
    }

    #[test]
    fn test_bitmap_only_discards_bitmap_terms() {
        let (mut extender, output) = extender(HighFrequencyTermPostingType::Bitmap);
        assert_eq!(
            extender.extend_term(DictKeyInfo::new(1), &posting(&[1, 2])).unwrap(),
            TermOperation::Keep
        );
        assert_eq!(
            extender.extend_term(DictKeyInfo::new(2), &posting(&[1, 2, 3])).unwrap(),
            TermOperation::Discard
        );
        assert_eq!(
            extender.extend_term(DictKeyInfo::new(7), &posting(&[4])).unwrap(),
            TermOperation::Discard
        );
        extender.finish().unwrap();

        let reader =
            InvertedIndexSegmentReader::open(output.as_ref(), &adaptive_bitmap_dir("title"), TermIndexKind::Bitmap)
                .unwrap()
                .unwrap();
        assert!(reader.lookup(&DictKeyInfo::new(1)).is_none());
        assert!(reader.lookup(&DictKeyInfo::new(2)).is_some());
    }

    #[test]
    fn test_both_keeps_normal_posting() {
        let (mut extender, _) = extender(HighFrequencyTermPostingType::Both);
        assert_eq!(
            extender.extend_term(DictKeyInfo::new(2), &posting(&[1, 2, 3])).unwrap(),
            TermOperation::Keep
        );
        assert_eq!(
            extender.extend_term(DictKeyInfo::new(7), &posting(&[4])).unwrap(),
            TermOperation::Keep
        );
        extender.finish().unwrap();
    }
}

//! Bitmap postings for terms that turn out to be frequent in the merged
//! segment.

use std::sync::Arc;

use crate::error::Result;
use crate::index::inverted::doc_mapper::DocMapper;
use crate::index::inverted::multi_segment_writer::MultiSegmentPostingWriter;
use crate::index::inverted::posting::PostingData;
use crate::index::inverted::segment::TargetSegment;
use crate::index::inverted::{DictKeyInfo, TermIndexKind, index_dir};
use crate::schema::AdaptiveBitmapTrigger;

pub const ADAPTIVE_BITMAP_DIR: &str = "adaptive_bitmap";

/// Directory of an index's adaptive bitmap inside a segment.
pub fn adaptive_bitmap_dir(index_name: &str) -> String {
    format!("{}/{ADAPTIVE_BITMAP_DIR}", index_dir(index_name))
}

pub struct AdaptiveBitmapIndexWriter {
    min_doc_freq: u64,
    writer: MultiSegmentPostingWriter,
    term_count: usize,
}

impl AdaptiveBitmapIndexWriter {
    pub fn new(
        index_name: &str,
        trigger: AdaptiveBitmapTrigger,
        targets: &[TargetSegment],
        doc_mapper: Arc<DocMapper>,
    ) -> Result<Self> {
        let min_doc_freq = match trigger {
            AdaptiveBitmapTrigger::DocFrequency(count) => count,
            AdaptiveBitmapTrigger::Percent(percent) => {
                (doc_mapper.new_doc_count() as u64 * percent as u64).div_ceil(100)
            }
        }
        .max(1);
        let writer = MultiSegmentPostingWriter::new(
            targets,
            &adaptive_bitmap_dir(index_name),
            TermIndexKind::Bitmap,
            doc_mapper,
        )?;
        Ok(AdaptiveBitmapIndexWriter {
            min_doc_freq,
            writer,
            term_count: 0,
        })
    }

    pub fn min_doc_freq(&self) -> u64 {
        self.min_doc_freq
    }

    pub fn need_adapt(&self, key: &DictKeyInfo, doc_freq: u64) -> bool {
        !key.is_null && doc_freq >= self.min_doc_freq
    }

    pub fn add_posting(&mut self, key: DictKeyInfo, posting: &PostingData) -> Result<()> {
        self.writer.write_term(key, posting)?;
        self.term_count += 1;
        Ok(())
    }

    pub fn term_count(&self) -> usize {
        self.term_count
    }

    pub fn close(self) -> Result<()> {
        self.writer.close()?;
        log::info!("adaptive bitmap written for {} terms", self.term_count);
        Ok(())
    }
}

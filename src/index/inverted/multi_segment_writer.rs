//! Routes merged postings to the target segments that own their documents.

use std::sync::Arc;

use crate::error::{IrisError, Result};
use crate::index::inverted::dictionary::InvertedIndexSegmentWriter;
use crate::index::inverted::doc_mapper::DocMapper;
use crate::index::inverted::posting::{PostingData, PostingEntry};
use crate::index::inverted::segment::TargetSegment;
use crate::index::inverted::{DictKeyInfo, TermIndexKind};

/// Splits postings in the merged doc space into target-local postings, one
/// [`InvertedIndexSegmentWriter`] per target segment.
#[derive(Debug)]
pub struct MultiSegmentPostingWriter {
    doc_mapper: Arc<DocMapper>,
    writers: Vec<InvertedIndexSegmentWriter>,
    buffers: Vec<PostingData>,
}

impl MultiSegmentPostingWriter {
    pub fn new(
        targets: &[TargetSegment],
        dir: &str,
        kind: TermIndexKind,
        doc_mapper: Arc<DocMapper>,
    ) -> Result<Self> {
        if targets.len() != doc_mapper.target_segment_count() {
            return Err(IrisError::invalid_argument(format!(
                "{} target segments but doc mapper splits into {}",
                targets.len(),
                doc_mapper.target_segment_count()
            )));
        }
        let writers = targets
            .iter()
            .map(|target| InvertedIndexSegmentWriter::new(target.storage.clone(), dir, kind))
            .collect::<Result<Vec<_>>>()?;
        Ok(MultiSegmentPostingWriter {
            doc_mapper,
            buffers: vec![PostingData::new(); writers.len()],
            writers,
        })
    }

    pub fn reserve_terms(&mut self, count: usize) {
        for writer in &mut self.writers {
            writer.reserve_terms(count);
        }
    }

    /// Write a term whose `posting` holds merged doc ids.
    pub fn write_term(&mut self, key: DictKeyInfo, posting: &PostingData) -> Result<()> {
        for entry in posting.entries() {
            let (target, local) = self.doc_mapper.to_target_local(entry.doc_id).ok_or_else(|| {
                IrisError::index(format!("doc {} of term {key} is outside the merged space", entry.doc_id))
            })?;
            self.buffers[target].push(PostingEntry {
                doc_id: local,
                ..*entry
            })?;
        }
        for (writer, buffer) in self.writers.iter_mut().zip(self.buffers.iter_mut()) {
            writer.add_term(key, buffer)?;
            buffer.clear();
        }
        Ok(())
    }

    /// Finish every target. Returns the number of terms written per target.
    pub fn close(self) -> Result<Vec<usize>> {
        self.writers.into_iter().map(InvertedIndexSegmentWriter::close).collect()
    }
}

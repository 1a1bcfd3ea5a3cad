//! K-way merge of the dictionaries of every source segment.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::Arc;

use ahash::AHashSet;

use crate::error::Result;
use crate::index::inverted::dictionary::{InvertedIndexSegmentReader, TermInfo};
use crate::index::inverted::posting::PostingData;
use crate::index::inverted::segment::SourceSegment;
use crate::index::inverted::{DictKeyInfo, TermIndexKind, index_dir};

/// A term as found in one source segment.
#[derive(Debug, Clone)]
pub struct SegmentTermInfo {
    /// Position of the segment in the merge's source list.
    pub source_index: usize,
    pub term: TermInfo,
    reader: Arc<InvertedIndexSegmentReader>,
}

impl SegmentTermInfo {
    /// Posting with segment-local doc ids.
    pub fn read_posting(&self) -> Result<PostingData> {
        self.reader.read_posting(&self.term)
    }
}

struct DictionarySlot {
    source_index: usize,
    reader: Arc<InvertedIndexSegmentReader>,
}

/// Yields terms in dictionary-key order. For an equal key the normal
/// dictionary comes before the bitmap one, and within a kind the sources
/// keep their merge order.
pub struct SegmentTermInfoQueue {
    slots: Vec<DictionarySlot>,
    heap: BinaryHeap<Reverse<(DictKeyInfo, TermIndexKind, usize, usize)>>,
}

impl SegmentTermInfoQueue {
    pub fn new(sources: &[SourceSegment], index_name: &str) -> Result<Self> {
        let dir = index_dir(index_name);
        let mut slots = Vec::new();
        for (source_index, source) in sources.iter().enumerate() {
            for kind in [TermIndexKind::Normal, TermIndexKind::Bitmap] {
                if let Some(reader) = InvertedIndexSegmentReader::open(source.storage.as_ref(), &dir, kind)? {
                    slots.push(DictionarySlot {
                        source_index,
                        reader: Arc::new(reader),
                    });
                }
            }
        }
        let mut heap = BinaryHeap::with_capacity(slots.len());
        for (slot, dictionary) in slots.iter().enumerate() {
            if let Some(first) = dictionary.reader.terms().first() {
                heap.push(Reverse((first.key, dictionary.reader.kind(), slot, 0)));
            }
        }
        log::debug!("index [{index_name}]: merging {} dictionaries", slots.len());
        Ok(SegmentTermInfoQueue { slots, heap })
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Distinct keys over every dictionary, used to pre-size the output.
    pub fn distinct_key_count(&self) -> usize {
        let mut keys = AHashSet::new();
        for slot in &self.slots {
            keys.extend(slot.reader.terms().iter().map(|t| t.key));
        }
        keys.len()
    }

    /// The next key and kind with every segment holding it.
    pub fn next_term(&mut self) -> Option<(DictKeyInfo, TermIndexKind, Vec<SegmentTermInfo>)> {
        let Reverse((key, kind, _, _)) = *self.heap.peek()?;
        let mut terms = Vec::new();
        while let Some(&Reverse((top_key, top_kind, slot, cursor))) = self.heap.peek() {
            if top_key != key || top_kind != kind {
                break;
            }
            self.heap.pop();
            let dictionary = &self.slots[slot];
            let entries = dictionary.reader.terms();
            terms.push(SegmentTermInfo {
                source_index: dictionary.source_index,
                term: entries[cursor],
                reader: dictionary.reader.clone(),
            });
            if let Some(next) = entries.get(cursor + 1) {
                self.heap.push(Reverse((next.key, kind, slot, cursor + 1)));
            }
        }
        Some((key, kind, terms))
    }
}

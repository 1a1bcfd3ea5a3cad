//! Posting lists and iterators over them.
//!
//! A [`PostingData`] is the in-memory form of one term's posting list: entries
//! in strictly ascending doc-id order. On disk each list is a sequence of
//! varint triples `(doc delta, term freq, payload)`.

use std::sync::Arc;

use crate::error::{IrisError, Result};
use crate::index::{DocId, DocPayload};
use crate::util::varint;

/// One document of a posting list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PostingEntry {
    pub doc_id: DocId,
    pub term_freq: u32,
    pub doc_payload: DocPayload,
}

impl PostingEntry {
    pub fn new(doc_id: DocId) -> Self {
        PostingEntry {
            doc_id,
            term_freq: 1,
            doc_payload: 0,
        }
    }

    pub fn with_payload(doc_id: DocId, doc_payload: DocPayload) -> Self {
        PostingEntry {
            doc_id,
            term_freq: 1,
            doc_payload,
        }
    }
}

/// A decoded posting list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PostingData {
    entries: Vec<PostingEntry>,
}

impl PostingData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        PostingData {
            entries: Vec::with_capacity(capacity),
        }
    }

    /// Build from entries in any order. Duplicate doc ids are rejected.
    pub fn from_entries(mut entries: Vec<PostingEntry>) -> Result<Self> {
        entries.sort_unstable_by_key(|e| e.doc_id);
        if entries.windows(2).any(|w| w[0].doc_id == w[1].doc_id) {
            return Err(IrisError::invalid_argument("duplicate doc id in posting"));
        }
        Ok(PostingData { entries })
    }

    pub fn from_doc_ids(doc_ids: &[DocId]) -> Result<Self> {
        Self::from_entries(doc_ids.iter().map(|&d| PostingEntry::new(d)).collect())
    }

    /// Append an entry. Doc ids must be strictly ascending.
    pub fn push(&mut self, entry: PostingEntry) -> Result<()> {
        if let Some(last) = self.entries.last()
            && last.doc_id >= entry.doc_id
        {
            return Err(IrisError::invalid_argument(format!(
                "posting doc ids out of order: {} after {}",
                entry.doc_id, last.doc_id
            )));
        }
        self.entries.push(entry);
        Ok(())
    }

    /// Append without the order check; call [`sort`](Self::sort) afterwards.
    pub(crate) fn push_unordered(&mut self, entry: PostingEntry) {
        self.entries.push(entry);
    }

    pub(crate) fn sort(&mut self) {
        self.entries.sort_unstable_by_key(|e| e.doc_id);
    }

    pub fn entries(&self) -> &[PostingEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn doc_freq(&self) -> u64 {
        self.entries.len() as u64
    }

    pub fn total_term_freq(&self) -> u64 {
        self.entries.iter().map(|e| e.term_freq as u64).sum()
    }

    pub fn doc_ids(&self) -> impl Iterator<Item = DocId> + '_ {
        self.entries.iter().map(|e| e.doc_id)
    }

    /// Drop all entries, keeping the allocation.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn capacity(&self) -> usize {
        self.entries.capacity()
    }

    pub fn encode(&self, out: &mut Vec<u8>) {
        let mut last = 0u32;
        for entry in &self.entries {
            varint::write_u64((entry.doc_id - last) as u64, out);
            varint::write_u64(entry.term_freq as u64, out);
            varint::write_u64(entry.doc_payload as u64, out);
            last = entry.doc_id;
        }
    }

    pub fn decode(bytes: &[u8], doc_freq: u64) -> Result<Self> {
        let mut data = PostingData::with_capacity(doc_freq as usize);
        let mut pos = 0;
        let mut last = 0u64;
        for _ in 0..doc_freq {
            let (delta, n) = varint::decode_u64(&bytes[pos..])?;
            pos += n;
            let (term_freq, n) = varint::decode_u64(&bytes[pos..])?;
            pos += n;
            let (payload, n) = varint::decode_u64(&bytes[pos..])?;
            pos += n;
            let doc_id = last + delta;
            if doc_id > DocId::MAX as u64 || payload > DocPayload::MAX as u64 {
                return Err(IrisError::corruption("posting value out of range"));
            }
            data.entries.push(PostingEntry {
                doc_id: doc_id as DocId,
                term_freq: term_freq as u32,
                doc_payload: payload as DocPayload,
            });
            last = doc_id;
        }
        if pos != bytes.len() {
            return Err(IrisError::corruption(format!(
                "posting has {} trailing bytes",
                bytes.len() - pos
            )));
        }
        Ok(data)
    }
}

/// Forward-only cursor over one term's documents.
pub trait PostingIterator: Send {
    /// Advance to the next document.
    fn next_doc(&mut self) -> Option<DocId>;

    /// Advance to the first document `>= target` after the current one.
    /// Always moves forward by at least one entry.
    fn seek_doc(&mut self, target: DocId) -> Option<DocId>;

    /// Payload of the current document. Zero before the first document.
    fn doc_payload(&self) -> DocPayload;

    /// Term frequency of the current document. Zero before the first document.
    fn term_freq(&self) -> u32;

    /// Rewind to before the first document.
    fn reset(&mut self);

    fn doc_freq(&self) -> u64;
}

/// A [`PostingIterator`] over shared, already decoded postings.
#[derive(Debug, Clone)]
pub struct BufferedPostingIterator {
    data: Arc<PostingData>,
    next: usize,
    current: Option<usize>,
}

impl BufferedPostingIterator {
    pub fn new(data: Arc<PostingData>) -> Self {
        BufferedPostingIterator {
            data,
            next: 0,
            current: None,
        }
    }

    fn current_entry(&self) -> Option<&PostingEntry> {
        self.current.map(|idx| &self.data.entries[idx])
    }
}

impl PostingIterator for BufferedPostingIterator {
    fn next_doc(&mut self) -> Option<DocId> {
        if self.next >= self.data.entries.len() {
            self.current = None;
            return None;
        }
        self.current = Some(self.next);
        self.next += 1;
        self.current_entry().map(|e| e.doc_id)
    }

    fn seek_doc(&mut self, target: DocId) -> Option<DocId> {
        let rest = &self.data.entries[self.next.min(self.data.entries.len())..];
        let offset = rest.partition_point(|e| e.doc_id < target);
        self.next += offset;
        self.next_doc()
    }

    fn doc_payload(&self) -> DocPayload {
        self.current_entry().map(|e| e.doc_payload).unwrap_or(0)
    }

    fn term_freq(&self) -> u32 {
        self.current_entry().map(|e| e.term_freq).unwrap_or(0)
    }

    fn reset(&mut self) {
        self.next = 0;
        self.current = None;
    }

    fn doc_freq(&self) -> u64 {
        self.data.doc_freq()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Arc<PostingData> {
        Arc::new(
            PostingData::from_entries(vec![
                PostingEntry::with_payload(9, 90),
                PostingEntry::with_payload(2, 20),
                PostingEntry::with_payload(5, 50),
            ])
            .unwrap(),
        )
    }

    #[test]
    fn test_iterate_and_reset() {
        let mut iter = BufferedPostingIterator::new(sample());
        assert_eq!(iter.doc_payload(), 0);
        assert_eq!(iter.next_doc(), Some(2));
        assert_eq!(iter.doc_payload(), 20);
        assert_eq!(iter.next_doc(), Some(5));
        assert_eq!(iter.next_doc(), Some(9));
        assert_eq!(iter.next_doc(), None);
        iter.reset();
        assert_eq!(iter.next_doc(), Some(2));
    }

    #[test]
    fn test_seek_always_advances() {
        let mut iter = BufferedPostingIterator::new(sample());
        assert_eq!(iter.seek_doc(5), Some(5));
        assert_eq!(iter.doc_payload(), 50);
        // already on 5, seeking 5 again moves on
        assert_eq!(iter.seek_doc(5), Some(9));
        assert_eq!(iter.seek_doc(10), None);
    }

    #[test]
    fn test_encode_decode() {
        let data = sample();
        let mut bytes = Vec::new();
        data.encode(&mut bytes);
        assert_eq!(PostingData::decode(&bytes, 3).unwrap(), *data);
        assert!(PostingData::decode(&bytes, 2).is_err());
    }

    #[test]
    fn test_push_requires_order() {
        let mut data = PostingData::new();
        data.push(PostingEntry::new(3)).unwrap();
        assert!(data.push(PostingEntry::new(3)).is_err());
        assert!(PostingData::from_doc_ids(&[1, 1]).is_err());
    }
}

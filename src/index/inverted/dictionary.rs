//! Per-segment dictionary and posting files of one inverted index.
//!
//! Layout inside `index/<name>/`:
//!
//! ```text
//! dictionary | bitmap_dictionary
//!   magic: u32, term_count: u64,
//!   term_count × (key: u64, is_null: u8, doc_freq: u64, total_tf: u64,
//!                 offset: u64, length: u64)
//! posting | bitmap_posting
//!   concatenated posting blobs addressed by (offset, length)
//! ```
//!
//! Normal postings use [`PostingData::encode`]; bitmap postings store a
//! `bit_vec::BitVec` of the doc ids.

use std::sync::Arc;

use bit_vec::BitVec;

use crate::error::{IrisError, Result};
use crate::index::inverted::posting::{PostingData, PostingEntry};
use crate::index::inverted::{DictKeyInfo, TermIndexKind};
use crate::storage::structured::{StructReader, StructWriter};
use crate::storage::{Storage, StorageOutput};

const DICTIONARY_MAGIC: u32 = 0x4449_4354; // "DICT"

/// Dictionary entry of one term.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TermInfo {
    pub key: DictKeyInfo,
    pub doc_freq: u64,
    pub total_term_freq: u64,
    pub offset: u64,
    pub length: u64,
}

/// Writes one index's dictionary and postings into a segment.
#[derive(Debug)]
pub struct InvertedIndexSegmentWriter {
    storage: Arc<dyn Storage>,
    dir: String,
    kind: TermIndexKind,
    terms: Vec<TermInfo>,
    posting: StructWriter<Box<dyn StorageOutput>>,
    buffer: Vec<u8>,
}

impl InvertedIndexSegmentWriter {
    /// Create the writer for directory `dir` (for example `index/title`).
    pub fn new(storage: Arc<dyn Storage>, dir: impl Into<String>, kind: TermIndexKind) -> Result<Self> {
        let dir = dir.into();
        let output = storage.create_output(&format!("{dir}/{}", kind.posting_file()))?;
        Ok(InvertedIndexSegmentWriter {
            storage,
            dir,
            kind,
            terms: Vec::new(),
            posting: StructWriter::new(output),
            buffer: Vec::new(),
        })
    }

    pub fn reserve_terms(&mut self, count: usize) {
        self.terms.reserve(count);
    }

    pub fn term_count(&self) -> usize {
        self.terms.len()
    }

    /// Append a term. Keys must be strictly ascending; empty postings are skipped.
    pub fn add_term(&mut self, key: DictKeyInfo, posting: &PostingData) -> Result<()> {
        if posting.is_empty() {
            return Ok(());
        }
        if let Some(last) = self.terms.last()
            && last.key >= key
        {
            return Err(IrisError::index(format!(
                "dictionary keys out of order in [{}]: {key} after {}",
                self.dir, last.key
            )));
        }
        self.buffer.clear();
        match self.kind {
            TermIndexKind::Normal => posting.encode(&mut self.buffer),
            TermIndexKind::Bitmap => encode_bitmap(posting, &mut self.buffer),
        }
        let offset = self.posting.position();
        self.posting.write_bytes(&self.buffer)?;
        self.terms.push(TermInfo {
            key,
            doc_freq: posting.doc_freq(),
            total_term_freq: posting.total_term_freq(),
            offset,
            length: self.buffer.len() as u64,
        });
        Ok(())
    }

    /// Finish the posting file and write the dictionary.
    pub fn close(self) -> Result<usize> {
        self.posting.close()?;
        let output = self
            .storage
            .create_output(&format!("{}/{}", self.dir, self.kind.dictionary_file()))?;
        let mut writer = StructWriter::new(output);
        writer.write_u32(DICTIONARY_MAGIC)?;
        writer.write_u64(self.terms.len() as u64)?;
        for term in &self.terms {
            writer.write_u64(term.key.key)?;
            writer.write_u8(term.key.is_null as u8)?;
            writer.write_u64(term.doc_freq)?;
            writer.write_u64(term.total_term_freq)?;
            writer.write_u64(term.offset)?;
            writer.write_u64(term.length)?;
        }
        writer.close()?;
        Ok(self.terms.len())
    }
}

fn encode_bitmap(posting: &PostingData, out: &mut Vec<u8>) {
    let Some(last) = posting.entries().last() else {
        return;
    };
    let mut bits = BitVec::from_elem(last.doc_id as usize + 1, false);
    for doc_id in posting.doc_ids() {
        bits.set(doc_id as usize, true);
    }
    out.extend_from_slice(&bits.to_bytes());
}

fn decode_bitmap(bytes: &[u8], doc_freq: u64) -> Result<PostingData> {
    let bits = BitVec::from_bytes(bytes);
    let mut data = PostingData::with_capacity(doc_freq as usize);
    for (doc_id, set) in bits.iter().enumerate() {
        if set {
            data.push(PostingEntry::new(doc_id as u32))?;
        }
    }
    if data.doc_freq() != doc_freq {
        return Err(IrisError::corruption(format!(
            "bitmap posting holds {} docs, dictionary says {doc_freq}",
            data.doc_freq()
        )));
    }
    Ok(data)
}

/// Reads one index's dictionary and postings from a segment.
#[derive(Debug)]
pub struct InvertedIndexSegmentReader {
    kind: TermIndexKind,
    terms: Vec<TermInfo>,
    posting: Vec<u8>,
}

impl InvertedIndexSegmentReader {
    /// Open `dir`. Returns `None` when the segment has no such dictionary.
    pub fn open(storage: &dyn Storage, dir: &str, kind: TermIndexKind) -> Result<Option<Self>> {
        let dictionary_name = format!("{dir}/{}", kind.dictionary_file());
        if !storage.file_exists(&dictionary_name) {
            return Ok(None);
        }
        let mut reader = StructReader::new(storage.open_input(&dictionary_name)?)?;
        if reader.read_u32()? != DICTIONARY_MAGIC {
            return Err(IrisError::corruption(format!("bad dictionary magic in [{dictionary_name}]")));
        }
        let count = reader.read_u64()?;
        let mut terms = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let key = reader.read_u64()?;
            let is_null = reader.read_u8()? != 0;
            terms.push(TermInfo {
                key: DictKeyInfo { key, is_null },
                doc_freq: reader.read_u64()?,
                total_term_freq: reader.read_u64()?,
                offset: reader.read_u64()?,
                length: reader.read_u64()?,
            });
        }
        let posting = storage.read_all(&format!("{dir}/{}", kind.posting_file()))?;
        Ok(Some(InvertedIndexSegmentReader {
            kind,
            terms,
            posting,
        }))
    }

    pub fn kind(&self) -> TermIndexKind {
        self.kind
    }

    pub fn terms(&self) -> &[TermInfo] {
        &self.terms
    }

    pub fn lookup(&self, key: &DictKeyInfo) -> Option<&TermInfo> {
        self.terms
            .binary_search_by(|t| t.key.cmp(key))
            .ok()
            .map(|idx| &self.terms[idx])
    }

    pub fn read_posting(&self, term: &TermInfo) -> Result<PostingData> {
        let start = term.offset as usize;
        let end = start + term.length as usize;
        let bytes = self.posting.get(start..end).ok_or_else(|| {
            IrisError::corruption(format!(
                "posting of term {} out of file bounds ({start}..{end})",
                term.key
            ))
        })?;
        match self.kind {
            TermIndexKind::Normal => PostingData::decode(bytes, term.doc_freq),
            TermIndexKind::Bitmap => decode_bitmap(bytes, term.doc_freq),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryStorage;

    #[test]
    fn test_write_and_read_terms() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::default());
        let mut writer =
            InvertedIndexSegmentWriter::new(storage.clone(), "index/title", TermIndexKind::Normal)
                .unwrap();
        let first = PostingData::from_entries(vec![
            PostingEntry::with_payload(1, 10),
            PostingEntry::with_payload(4, 40),
        ])
        .unwrap();
        writer.add_term(DictKeyInfo::new(3), &first).unwrap();
        writer.add_term(DictKeyInfo::new(5), &PostingData::new()).unwrap();
        writer
            .add_term(DictKeyInfo::null(), &PostingData::from_doc_ids(&[7]).unwrap())
            .unwrap();
        assert!(writer.add_term(DictKeyInfo::new(9), &first).is_err());
        assert_eq!(writer.close().unwrap(), 2);

        let reader = InvertedIndexSegmentReader::open(storage.as_ref(), "index/title", TermIndexKind::Normal)
            .unwrap()
            .unwrap();
        assert_eq!(reader.terms().len(), 2);
        let info = *reader.lookup(&DictKeyInfo::new(3)).unwrap();
        assert_eq!(reader.read_posting(&info).unwrap(), first);
        assert!(reader.lookup(&DictKeyInfo::new(5)).is_none());
        assert!(reader.lookup(&DictKeyInfo::null()).is_some());
    }

    #[test]
    fn test_bitmap_roundtrip() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::default());
        let mut writer =
            InvertedIndexSegmentWriter::new(storage.clone(), "index/title", TermIndexKind::Bitmap)
                .unwrap();
        let posting = PostingData::from_doc_ids(&[0, 3, 17]).unwrap();
        writer.add_term(DictKeyInfo::new(1), &posting).unwrap();
        writer.close().unwrap();

        let reader = InvertedIndexSegmentReader::open(storage.as_ref(), "index/title", TermIndexKind::Bitmap)
            .unwrap()
            .unwrap();
        let info = reader.terms()[0];
        assert_eq!(reader.read_posting(&info).unwrap(), posting);
        assert!(
            InvertedIndexSegmentReader::open(storage.as_ref(), "index/title", TermIndexKind::Normal)
                .unwrap()
                .is_none()
        );
    }
}

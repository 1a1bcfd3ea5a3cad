//! Fans a term out to every truncate index of an inverted index.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::Result;
use crate::index::inverted::DictKeyInfo;
use crate::index::inverted::posting::{BufferedPostingIterator, PostingData};
use crate::index::inverted::truncate::scheduler::TruncateWriterScheduler;
use crate::index::inverted::truncate::trigger::TruncateTriggerInfo;
use crate::index::inverted::truncate::writer::TruncateIndexWriter;

pub type SharedTruncateIndexWriter = Arc<Mutex<Box<dyn TruncateIndexWriter>>>;

/// One job per triggered writer and term; all jobs of a term finish before
/// [`MultiTruncateIndexWriter::add_posting`] returns.
pub struct MultiTruncateIndexWriter {
    writers: Vec<SharedTruncateIndexWriter>,
    scheduler: Box<dyn TruncateWriterScheduler>,
    estimate_posting_count: usize,
}

impl MultiTruncateIndexWriter {
    pub fn new(
        writers: Vec<Box<dyn TruncateIndexWriter>>,
        scheduler: Box<dyn TruncateWriterScheduler>,
    ) -> Self {
        MultiTruncateIndexWriter {
            writers: writers.into_iter().map(|w| Arc::new(Mutex::new(w))).collect(),
            scheduler,
            estimate_posting_count: 0,
        }
    }

    pub fn writer_count(&self) -> usize {
        self.writers.len()
    }

    pub fn truncate_index_names(&self) -> Vec<String> {
        self.writers
            .iter()
            .map(|w| w.lock().truncate_index_name().to_string())
            .collect()
    }

    /// Whether any writer wants the term. Remembers how many do.
    pub fn need_truncate(&mut self, info: &TruncateTriggerInfo) -> bool {
        self.estimate_posting_count = self
            .writers
            .iter()
            .filter(|w| w.lock().need_truncate(info))
            .count();
        self.estimate_posting_count > 0
    }

    /// Writers that wanted the last term checked by [`Self::need_truncate`].
    pub fn estimate_posting_count(&self) -> usize {
        self.estimate_posting_count
    }

    pub fn add_posting(&mut self, key: DictKeyInfo, posting: Arc<PostingData>, doc_freq: u64) -> Result<()> {
        let info = TruncateTriggerInfo::new(key, doc_freq);
        for writer in &self.writers {
            if !writer.lock().need_truncate(&info) {
                continue;
            }
            let writer = writer.clone();
            let posting = posting.clone();
            let pushed = self.scheduler.push_work_item(Box::new(move || {
                let mut iter = BufferedPostingIterator::new(posting);
                writer.lock().add_posting(&key, &mut iter, doc_freq)
            }));
            if let Err(e) = pushed {
                // drain jobs already queued for this term before bailing out
                if let Err(wait_err) = self.scheduler.wait_finished() {
                    log::debug!("truncate jobs of term [{key}] failed while draining: {wait_err}");
                }
                return Err(e);
            }
        }
        self.scheduler.wait_finished()
    }

    pub fn end_posting(&mut self) -> Result<()> {
        for writer in &self.writers {
            writer.lock().end_posting()?;
        }
        Ok(())
    }

    pub fn estimate_memory_use(&self, doc_freq: u64) -> usize {
        self.writers
            .iter()
            .map(|w| w.lock().estimate_memory_use(doc_freq))
            .sum()
    }
}

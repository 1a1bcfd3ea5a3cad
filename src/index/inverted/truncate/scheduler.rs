//! Runs per-profile truncation jobs of one term.

use crate::error::Result;
use crate::util::thread_pool::{Job, WorkerPool};

pub trait TruncateWriterScheduler: Send {
    fn push_work_item(&mut self, job: Job) -> Result<()>;

    /// Block until every pushed job has run; reports the first failure.
    fn wait_finished(&mut self) -> Result<()>;
}

/// Runs jobs inline on the calling thread.
#[derive(Debug, Default)]
pub struct SimpleTruncateWriterScheduler;

impl TruncateWriterScheduler for SimpleTruncateWriterScheduler {
    fn push_work_item(&mut self, job: Job) -> Result<()> {
        job()
    }

    fn wait_finished(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Fans jobs out to a worker pool.
#[derive(Debug)]
pub struct MultiTruncateWriterScheduler {
    pool: WorkerPool,
}

impl MultiTruncateWriterScheduler {
    pub fn new(thread_count: usize) -> Result<Self> {
        Ok(MultiTruncateWriterScheduler {
            pool: WorkerPool::new("truncate-writer", thread_count)?,
        })
    }

    pub fn thread_count(&self) -> usize {
        self.pool.thread_count()
    }
}

impl TruncateWriterScheduler for MultiTruncateWriterScheduler {
    fn push_work_item(&mut self, job: Job) -> Result<()> {
        self.pool.push(job)
    }

    fn wait_finished(&mut self) -> Result<()> {
        self.pool.wait_finished()
    }
}

pub fn create_scheduler(thread_count: usize) -> Result<Box<dyn TruncateWriterScheduler>> {
    if thread_count <= 1 {
        log::debug!("truncate writers run inline");
        Ok(Box::new(SimpleTruncateWriterScheduler))
    } else {
        log::debug!("truncate writers run on {thread_count} threads");
        Ok(Box::new(MultiTruncateWriterScheduler::new(thread_count)?))
    }
}

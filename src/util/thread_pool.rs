//! A fixed-size worker pool with sticky error propagation.
//!
//! Jobs return [`Result`]. The first failing job (or panicking job) stores its
//! error in the pool: queued jobs are skipped, [`WorkerPool::push`] refuses new
//! work, and [`WorkerPool::wait_finished`] reports the stored error to the
//! caller. The error stays in place until the pool is stopped.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender, unbounded};
use parking_lot::{Condvar, Mutex};

use crate::error::{IrisError, Result};

/// A unit of work executed by the pool.
pub type Job = Box<dyn FnOnce() -> Result<()> + Send + 'static>;

#[derive(Debug, Default)]
struct PoolState {
    pending: Mutex<usize>,
    finished: Condvar,
    error: Mutex<Option<IrisError>>,
}

impl PoolState {
    fn stored_error(&self) -> Option<IrisError> {
        self.error.lock().as_ref().map(IrisError::duplicate)
    }

    fn record_error(&self, err: IrisError) {
        let mut slot = self.error.lock();
        if slot.is_none() {
            log::error!("worker job failed: {err}");
            *slot = Some(err);
        }
    }

    fn job_done(&self) {
        let mut pending = self.pending.lock();
        *pending -= 1;
        if *pending == 0 {
            self.finished.notify_all();
        }
    }
}

/// Fixed number of named worker threads fed through a channel.
#[derive(Debug)]
pub struct WorkerPool {
    name: String,
    sender: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
    state: Arc<PoolState>,
}

impl WorkerPool {
    /// Spawn `thread_count` workers (at least one).
    pub fn new(name: impl Into<String>, thread_count: usize) -> Result<Self> {
        let name = name.into();
        let (sender, receiver) = unbounded::<Job>();
        let state = Arc::new(PoolState::default());
        let mut workers = Vec::with_capacity(thread_count.max(1));
        for idx in 0..thread_count.max(1) {
            let receiver = receiver.clone();
            let state = state.clone();
            let handle = thread::Builder::new()
                .name(format!("{name}-{idx}"))
                .spawn(move || worker_loop(receiver, state))?;
            workers.push(handle);
        }
        log::debug!("started worker pool [{name}] with {} threads", workers.len());
        Ok(WorkerPool {
            name,
            sender: Some(sender),
            workers,
            state,
        })
    }

    pub fn thread_count(&self) -> usize {
        self.workers.len()
    }

    /// Queue a job. Fails if a previous job already failed or the pool is stopped.
    pub fn push(&self, job: Job) -> Result<()> {
        if let Some(err) = self.state.stored_error() {
            return Err(err);
        }
        let sender = self.sender.as_ref().ok_or_else(|| {
            IrisError::invalid_operation(format!("worker pool [{}] is stopped", self.name))
        })?;
        *self.state.pending.lock() += 1;
        if sender.send(job).is_err() {
            self.state.job_done();
            return Err(IrisError::internal(format!(
                "worker pool [{}] has no live workers",
                self.name
            )));
        }
        Ok(())
    }

    /// Block until every queued job has run, then report the first failure.
    pub fn wait_finished(&self) -> Result<()> {
        let mut pending = self.state.pending.lock();
        while *pending > 0 {
            self.state.finished.wait(&mut pending);
        }
        drop(pending);
        match self.state.stored_error() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Close the queue and join all workers.
    pub fn stop(&mut self) {
        self.sender.take();
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                log::warn!("worker of pool [{}] panicked while stopping", self.name);
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.stop();
    }
}

fn worker_loop(receiver: Receiver<Job>, state: Arc<PoolState>) {
    while let Ok(job) = receiver.recv() {
        if state.error.lock().is_none() {
            match catch_unwind(AssertUnwindSafe(job)) {
                Ok(Ok(())) => {}
                Ok(Err(err)) => state.record_error(err),
                Err(_) => state.record_error(IrisError::internal("worker job panicked")),
            }
        }
        state.job_done();
    }
}

//! Bounded worker pool with completion handling in file order

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::PathBuf;
use std::sync::mpsc::{Receiver, SyncSender, sync_channel};

use anyhow::{Context, Result};
use memcload_core::WorkQueue;

use crate::processor::{FileError, FileStats};

/// One input file and its position in enumeration order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub index: usize,
    pub path: PathBuf,
}

/// How a job ended
#[derive(Debug)]
pub enum FileOutcome {
    /// All lines were read (some may have failed)
    Processed(FileStats),
    /// The file could not be opened or decompressed
    Failed(FileError),
    /// Shutdown was requested before the job started
    Skipped,
    /// The worker panicked while on this job
    Panicked,
}

/// Runs jobs on a fixed-width pool and hands outcomes back by index.
pub struct Dispatcher {
    pool: rayon::ThreadPool,
    workers: usize,
}

impl Dispatcher {
    pub fn new(workers: usize) -> Result<Self> {
        let workers = workers.max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("memcload-worker-{i}"))
            .build()
            .context("Failed to create thread pool")?;
        Ok(Self { pool, workers })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Run `work` for every path and call `on_complete` for each job in
    /// path order, as soon as that job and all earlier ones are done.
    ///
    /// A job finishing early waits in its slot until its predecessors have
    /// been handled. `stop` is checked before each job starts; once it
    /// returns true the remaining jobs complete as [`FileOutcome::Skipped`].
    pub fn run(
        &self,
        paths: Vec<PathBuf>,
        stop: impl Fn() -> bool + Sync,
        work: impl Fn(&Job) -> FileOutcome + Sync,
        mut on_complete: impl FnMut(&Job, FileOutcome),
    ) {
        let jobs: Vec<Job> = paths
            .into_iter()
            .enumerate()
            .map(|(index, path)| Job { index, path })
            .collect();
        let (slots, receivers) = completion_slots(jobs.len());
        let width = self.workers.min(jobs.len());
        let queue = WorkQueue::new(jobs);

        self.pool.in_place_scope(|s| {
            for _ in 0..width {
                s.spawn(|_| {
                    while let Some((index, job)) = queue.next() {
                        let outcome = if stop() {
                            FileOutcome::Skipped
                        } else {
                            catch_unwind(AssertUnwindSafe(|| work(job)))
                                .unwrap_or(FileOutcome::Panicked)
                        };
                        // Receiver only goes away if on_complete panicked
                        let _ = slots[index].send(outcome);
                    }
                });
            }

            for (index, rx) in receivers.into_iter().enumerate() {
                let outcome = rx.recv().unwrap_or(FileOutcome::Panicked);
                if let Some(job) = queue.get(index) {
                    on_complete(job, outcome);
                }
            }
        });
    }
}

/// One single-use channel per job index.
fn completion_slots(n: usize) -> (Vec<SyncSender<FileOutcome>>, Vec<Receiver<FileOutcome>>) {
    (0..n).map(|_| sync_channel(1)).unzip()
}

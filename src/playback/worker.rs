//! Fixed pool of threads for blocking work
//!
//! Resolution, synthesis, transcoding and stream opening all block on
//! processes or the network. They run here so the dispatch task never waits
//! on them; each job posts its result back to the dispatch mailbox itself.

use crossbeam_channel::{unbounded, Sender};
use std::thread::{self, JoinHandle};

type Job = Box<dyn FnOnce() + Send + 'static>;

pub struct WorkerPool {
    sender: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `size` named worker threads (at least one)
    pub fn new(size: usize) -> std::io::Result<Self> {
        let size = size.max(1);
        let (sender, receiver) = unbounded::<Job>();

        let mut workers = Vec::with_capacity(size);
        for index in 0..size {
            let receiver = receiver.clone();
            let handle = thread::Builder::new()
                .name(format!("voicebot-worker-{}", index))
                .spawn(move || {
                    while let Ok(job) = receiver.recv() {
                        if std::panic::catch_unwind(std::panic::AssertUnwindSafe(job)).is_err() {
                            tracing::error!(worker = index, "Worker job panicked");
                        }
                    }
                })?;
            workers.push(handle);
        }

        tracing::debug!(size, "Worker pool started");
        Ok(Self {
            sender: Some(sender),
            workers,
        })
    }

    /// Queue a job. Returns false once the pool is shutting down.
    pub fn execute(&self, job: impl FnOnce() + Send + 'static) -> bool {
        match &self.sender {
            Some(sender) => sender.send(Box::new(job)).is_ok(),
            None => false,
        }
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Closing the channel lets every worker drain its queue and exit
        self.sender = None;
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

//! Bounded worker pool for heavy pipeline tasks
//!
//! A fixed number of workers pull jobs from one shared queue, so at most
//! `size` external tools run at once no matter how many requests are in
//! flight. Each submission carries an outer deadline that covers queue wait
//! plus execution. When it expires the caller gets
//! [`PoolError::DeadlineExceeded`]. A job already running is finished (the
//! tool's own timeout bounds it); a job still queued is dropped unpolled when
//! a worker reaches it.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Worker pool failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    #[error("{task} exceeded its {}s deadline", deadline.as_secs())]
    DeadlineExceeded { task: String, deadline: Duration },

    #[error("worker pool is shut down")]
    Closed,

    /// The job panicked or was dropped before producing a result
    #[error("worker lost task {task}")]
    WorkerLost { task: String },
}

pub struct WorkerPool {
    sender: std::sync::Mutex<Option<mpsc::UnboundedSender<Job>>>,
    workers: std::sync::Mutex<Vec<JoinHandle<()>>>,
    in_flight: Arc<AtomicUsize>,
    cancel: CancellationToken,
    size: usize,
}

impl WorkerPool {
    /// min(`cap`, available parallelism), at least 1
    pub fn default_size(cap: usize) -> usize {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        cap.min(cores).max(1)
    }

    /// Start `size` workers on the current runtime
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        let (sender, receiver) = mpsc::unbounded_channel::<Job>();
        let receiver = Arc::new(Mutex::new(receiver));
        let in_flight = Arc::new(AtomicUsize::new(0));
        let cancel = CancellationToken::new();

        let workers = (0..size)
            .map(|worker_id| {
                let receiver = Arc::clone(&receiver);
                let in_flight = Arc::clone(&in_flight);
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    tracing::debug!(worker_id, "Worker started");
                    loop {
                        let job = tokio::select! {
                            biased;
                            _ = cancel.cancelled() => break,
                            job = async { receiver.lock().await.recv().await } => match job {
                                Some(job) => job,
                                None => break,
                            },
                        };

                        in_flight.fetch_add(1, Ordering::SeqCst);
                        // Run in its own task so a panicking job never takes the worker down
                        if let Err(e) = tokio::spawn(job).await {
                            tracing::error!(worker_id, error = %e, "Pool job panicked");
                        }
                        in_flight.fetch_sub(1, Ordering::SeqCst);
                    }
                    tracing::debug!(worker_id, "Worker stopped");
                })
            })
            .collect();

        tracing::info!(size, "Worker pool started");

        Self {
            sender: std::sync::Mutex::new(Some(sender)),
            workers: std::sync::Mutex::new(workers),
            in_flight,
            cancel,
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Jobs currently executing on a worker
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Queue `future` and await its result within `deadline`
    pub async fn submit<F, T>(&self, task: &str, deadline: Duration, future: F) -> Result<T, PoolError>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (result_tx, result_rx) = oneshot::channel();
        let job_task = task.to_string();
        let job: Job = Box::pin(async move {
            // The submitter gave up while the job was queued
            if result_tx.is_closed() {
                tracing::warn!(task = %job_task, "Skipping job abandoned before it started");
                return;
            }
            let _ = result_tx.send(future.await);
        });

        {
            let sender = self.sender.lock().map_err(|_| PoolError::Closed)?;
            let sender = sender.as_ref().ok_or(PoolError::Closed)?;
            sender.send(job).map_err(|_| PoolError::Closed)?;
        }

        match tokio::time::timeout(deadline, result_rx).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(_)) => Err(PoolError::WorkerLost {
                task: task.to_string(),
            }),
            Err(_) => {
                tracing::error!(task, deadline_secs = deadline.as_secs(), "Pool task deadline exceeded");
                Err(PoolError::DeadlineExceeded {
                    task: task.to_string(),
                    deadline,
                })
            }
        }
    }

    /// Stop accepting work, let in-flight jobs finish, join workers
    ///
    /// Queued jobs that no worker picked up yet are dropped; their submitters
    /// see [`PoolError::WorkerLost`].
    pub async fn shutdown(&self) {
        if let Ok(mut sender) = self.sender.lock() {
            sender.take();
        }
        self.cancel.cancel();

        let handles: Vec<JoinHandle<()>> = match self.workers.lock() {
            Ok(mut workers) => workers.drain(..).collect(),
            Err(_) => Vec::new(),
        };
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Worker join failed");
            }
        }
        tracing::info!("Worker pool shut down");
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

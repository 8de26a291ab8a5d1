use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use log::{debug, error};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;

use crate::error::{AnalyzerError, Result};

type Task = Pin<Box<dyn Future<Output = ()> + Send>>;

struct QueuedTask {
    id: String,
    task: Task,
}

/// Completion handle returned by [`WorkerPool::submit`]
#[derive(Debug)]
pub struct JobHandle<T> {
    pub id: String,
    receiver: oneshot::Receiver<T>,
}

impl<T> JobHandle<T> {
    /// Waits for the job's result
    pub async fn wait(self) -> Result<T> {
        self.receiver
            .await
            .map_err(|_| AnalyzerError::Message(format!("Job {} ended without a result", self.id)))
    }
}

/// Fixed set of workers draining a bounded task queue
pub struct WorkerPool {
    sender: mpsc::Sender<QueuedTask>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawns `workers` tasks on the current runtime
    pub fn new(workers: usize, queue_capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel::<QueuedTask>(queue_capacity.max(1));
        let receiver = Arc::new(Mutex::new(receiver));

        let workers = (0..workers.max(1))
            .map(|worker| {
                let receiver = Arc::clone(&receiver);
                tokio::spawn(async move {
                    loop {
                        // Only the wait for the next task holds the lock.
                        let next = receiver.lock().await.recv().await;
                        let Some(QueuedTask { id, task }) = next else {
                            break;
                        };
                        debug!("Worker {} picked up job {}", worker, id);
                        if let Err(e) = tokio::spawn(task).await {
                            error!("Job {} panicked: {}", id, e);
                        }
                    }
                    debug!("Worker {} stopped", worker);
                })
            })
            .collect();

        Self { sender, workers }
    }

    /// Queues `job`; fails with `Busy` when the queue is full
    pub fn submit<F, T>(&self, id: impl Into<String>, job: F) -> Result<JobHandle<T>>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let id = id.into();
        let (done, receiver) = oneshot::channel();
        let task: Task = Box::pin(async move {
            // The submitter may have dropped its handle.
            let _ = done.send(job.await);
        });

        self.sender
            .try_send(QueuedTask { id: id.clone(), task })
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => AnalyzerError::Busy("The job queue is full, try again later".into()),
                mpsc::error::TrySendError::Closed(_) => AnalyzerError::Busy("The worker pool has shut down".into()),
            })?;

        Ok(JobHandle { id, receiver })
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        for worker in &self.workers {
            worker.abort();
        }
    }
}

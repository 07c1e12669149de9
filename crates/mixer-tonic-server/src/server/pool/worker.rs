use super::request::{WorkItem, WorkRequest};
use core::panic::AssertUnwindSafe;
use futures::FutureExt;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};

/// Receiving half of the pool queue, shared by all workers.
pub type SharedQueue = Arc<Mutex<mpsc::UnboundedReceiver<WorkRequest>>>;

/// Worker task: takes requests off the shared queue and runs them one at a
/// time until it receives [`WorkRequest::Shutdown`] or the queue closes.
///
/// Only one idle worker waits on the queue at a time; the rest wait on the
/// queue's lock, which hands out in FIFO order.
pub async fn worker_loop(_worker_id: usize, queue: SharedQueue) {
    #[cfg(feature = "tracing")]
    tracing::trace!("Worker {_worker_id} started");

    loop {
        let work = queue.lock().await.recv().await;

        match work {
            Some(WorkRequest::Run(item)) => run_item(_worker_id, item).await,
            Some(WorkRequest::Shutdown { response }) => {
                #[cfg(feature = "tracing")]
                tracing::debug!("Worker {_worker_id} received shutdown signal");

                if response.send(()).is_err() {
                    #[cfg(feature = "tracing")]
                    tracing::error!("Worker {_worker_id} failed to acknowledge shutdown");
                }
                break;
            }
            None => break,
        }
    }

    #[cfg(feature = "tracing")]
    tracing::trace!("Worker {_worker_id} stopped");
}

/// Runs one item, containing a panic so the worker survives it.
pub async fn run_item(_worker_id: usize, item: WorkItem) {
    if AssertUnwindSafe(item).catch_unwind().await.is_err() {
        #[cfg(feature = "tracing")]
        tracing::error!("Work item panicked on worker {_worker_id}");
    }
}

//! Shared-queue worker pool.
//!
//! [`WorkerPool`] owns a set of worker tasks that all consume the same
//! unbounded queue, so scheduling never blocks and a slow item only occupies
//! the one worker running it. Shutdown is graceful: everything queued before
//! the pool closed still runs.

use super::{
    request::{WorkItem, WorkRequest},
    worker::{SharedQueue, run_item, worker_loop},
};
use core::future::Future;
use mixer_tonic_core::Error;
use parking_lot::{Mutex, RwLock};
use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;

/// A fixed-size pool of asynchronous workers.
///
/// Must be created inside a Tokio runtime; workers are spawned immediately.
pub struct WorkerPool {
    sender: RwLock<Option<mpsc::UnboundedSender<WorkRequest>>>,
    queue: SharedQueue,
    workers: Mutex<Vec<JoinHandle<()>>>,
    next_worker_id: AtomicUsize,
    shutdown_token: CancellationToken,
}

impl WorkerPool {
    /// Creates a pool and spawns `size` workers.
    pub fn new(size: usize) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let pool = Self {
            sender: RwLock::new(Some(tx)),
            queue: Arc::new(tokio::sync::Mutex::new(rx)),
            workers: Mutex::new(Vec::with_capacity(size)),
            next_worker_id: AtomicUsize::new(0),
            shutdown_token: CancellationToken::new(),
        };
        pool.spawn_workers(size);
        pool
    }

    fn spawn_workers(&self, count: usize) {
        let mut workers = self.workers.lock();
        for _ in 0..count {
            let worker_id = self.next_worker_id.fetch_add(1, Ordering::Relaxed);
            workers.push(tokio::spawn(worker_loop(
                worker_id,
                Arc::clone(&self.queue),
            )));
        }
    }

    /// Grows the pool by `count` workers.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ServiceShutdown`] once the pool has been shut down.
    pub fn add_workers(&self, count: usize) -> Result<(), Error> {
        // Holding the read lock keeps shutdown from collecting the worker
        // handles between the check and the spawn.
        let sender = self.sender.read();
        if sender.is_none() {
            return Err(Error::ServiceShutdown);
        }
        self.spawn_workers(count);
        Ok(())
    }

    /// Number of running workers; zero after shutdown.
    pub fn size(&self) -> usize {
        self.workers.lock().len()
    }

    /// A token cancelled when shutdown begins.
    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown_token
    }

    /// Queues `work` for execution. Never waits for a free worker.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ServiceShutdown`] once shutdown has begun; `work` is
    /// dropped without running.
    pub fn schedule<F>(&self, work: F) -> Result<(), Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let item: WorkItem = Box::pin(work);
        match &*self.sender.read() {
            Some(tx) => tx
                .send(WorkRequest::Run(item))
                .map_err(|_| Error::ChannelError {
                    context: "Worker queue closed".to_string(),
                }),
            None => Err(Error::ServiceShutdown),
        }
    }

    /// Gracefully shuts the pool down.
    ///
    /// - Closes the pool to new work and cancels [`shutdown_token`].
    /// - Sends a [`WorkRequest::Shutdown`] to each worker behind everything
    ///   already queued, so queued work runs first.
    /// - Waits for every worker to acknowledge and exit.
    /// - Runs anything still left in the queue on the calling task.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ServiceShutdown`] if the pool was already shut down.
    ///
    /// [`shutdown_token`]: WorkerPool::shutdown_token
    pub async fn shutdown(&self) -> Result<(), Error> {
        // === Phase 0: Stop accepting new work ===
        let Some(tx) = self.sender.write().take() else {
            return Err(Error::ServiceShutdown);
        };
        self.shutdown_token.cancel();
        #[cfg(feature = "tracing")]
        tracing::info!("Worker pool refusing new work");

        // === Phase 1: Queue one shutdown message per worker ===
        let handles = core::mem::take(&mut *self.workers.lock());
        #[cfg(feature = "tracing")]
        tracing::debug!("Notifying {} workers to shut down", handles.len());

        let mut acks = Vec::with_capacity(handles.len());
        for _ in &handles {
            let (response, rx) = oneshot::channel();
            if tx.send(WorkRequest::Shutdown { response }).is_ok() {
                acks.push(rx);
            }
        }
        drop(tx);

        // === Phase 2: Wait for workers to finish queued work and exit ===
        for (_i, ack) in acks.into_iter().enumerate() {
            if ack.await.is_err() {
                #[cfg(feature = "tracing")]
                tracing::warn!("Shutdown message {_i} was dropped without acknowledgement");
            }
        }
        for result in futures::future::join_all(handles).await {
            if let Err(_e) = result {
                #[cfg(feature = "tracing")]
                tracing::error!("Worker task failed: {_e}");
            }
        }

        // === Phase 3: Run leftovers on the caller ===
        let mut queue = self.queue.lock().await;
        let mut _leftover = 0_usize;
        while let Ok(request) = queue.try_recv() {
            if let WorkRequest::Run(item) = request {
                _leftover += 1;
                run_item(usize::MAX, item).await;
            }
        }

        #[cfg(feature = "tracing")]
        tracing::info!("Worker pool shutdown complete ({_leftover} items run inline)");

        Ok(())
    }
}

use core::{future::Future, pin::Pin};
use tokio::sync::oneshot;

/// A unit of work for the pool: any boxed future with no output.
pub type WorkItem = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// A message on the pool's shared queue.
pub enum WorkRequest {
    /// Runs `WorkItem` to completion on whichever worker takes it.
    Run(WorkItem),

    /// Stops the worker that receives it. The worker acknowledges over
    /// `response` before exiting.
    Shutdown { response: oneshot::Sender<()> },
}

use super::processor::{Responder, process_request};
use crate::server::{
    pool::WorkerPool,
    service::executor::Executor,
    telemetry::{ErrorKind, increment_request_errors, increment_requests, record_attributes_decoded},
};
use futures::{Stream, StreamExt};
use mixer_tonic_core::{
    ApiRequest, ApiResponse, Error,
    attribute::Tracker,
    mixer::Dictionary,
    proto::{Attributes, RpcStatus},
};
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore, mpsc};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tonic::Status;

/// Drives request streams: decodes each request in arrival order, runs it
/// on the shared [`WorkerPool`] and writes the responses back.
///
/// One dispatcher serves every stream of the service; all per-stream state
/// lives inside [`dispatch`](StreamDispatcher::dispatch).
pub struct StreamDispatcher<E: ?Sized> {
    pool: Arc<WorkerPool>,
    dictionary: Arc<Dictionary>,
    max_inflight: usize,
    executor: Arc<E>,
}

impl<E: ?Sized> StreamDispatcher<E> {
    /// `max_inflight` caps how many requests of one stream may be scheduled
    /// or running at once; `0` means no cap.
    pub const fn new(
        pool: Arc<WorkerPool>,
        dictionary: Arc<Dictionary>,
        max_inflight: usize,
        executor: Arc<E>,
    ) -> Self {
        Self {
            pool,
            dictionary,
            max_inflight,
            executor,
        }
    }

    pub fn pool(&self) -> &Arc<WorkerPool> {
        &self.pool
    }

    /// Serves one stream until the client stops sending and every request
    /// already read has been answered.
    ///
    /// - Requests are read one at a time and their attribute deltas applied
    ///   in order, so each request sees every earlier delta.
    /// - A request whose delta does not decode is answered right away with
    ///   `INVALID_ARGUMENT`; the stream keeps going.
    /// - Valid requests are scheduled on the pool. Their responses can go out
    ///   in any order; clients match them by `request_index`.
    /// - If a response cannot be sent (the client went away), reading stops.
    ///
    /// In every case this waits for scheduled requests to finish before
    /// returning.
    ///
    /// # Errors
    ///
    /// Returns the transport error if reading a request fails, or
    /// [`Error::ServiceShutdown`] if the pool closed under the stream.
    pub async fn dispatch<Req, S>(
        &self,
        requests: S,
        responses: mpsc::Sender<Result<Req::Response, Status>>,
    ) -> Result<(), Error>
    where
        Req: ApiRequest,
        E: Executor<Req>,
        S: Stream<Item = Result<Req, Status>> + Send,
    {
        let mut tracker = Tracker::new(Arc::clone(&self.dictionary));
        let responder = Arc::new(Mutex::new(Responder::new(
            responses,
            Tracker::new(Arc::clone(&self.dictionary)),
        )));
        let outstanding = TaskTracker::new();
        let cancel = CancellationToken::new();
        let permits = (self.max_inflight > 0).then(|| Arc::new(Semaphore::new(self.max_inflight)));

        let mut requests = core::pin::pin!(requests);

        // === Reading ===
        let result = loop {
            let next = tokio::select! {
                biased;
                () = cancel.cancelled() => break Ok(()),
                next = requests.next() => next,
            };

            let mut request = match next {
                Some(Ok(request)) => request,
                None => break Ok(()),
                Some(Err(status)) => {
                    #[cfg(feature = "tracing")]
                    tracing::error!("Failed to read {} request: {status}", Req::METHOD);
                    break Err(Error::from(status));
                }
            };

            let request_index = request.request_index();
            let delta = request.take_attribute_update();
            record_attributes_decoded(delta_size(&delta));

            let request_bag = match tracker.apply_proto(&delta) {
                Ok(bag) => bag,
                Err(e) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!("Invalid attribute update in request {request_index}: {e}");
                    increment_request_errors(Req::METHOD, ErrorKind::Decode);

                    let mut response = Req::Response::for_request(request_index);
                    response.set_result(RpcStatus::from(&e));
                    if let Err(_e) = responder.lock().await.send(response).await {
                        #[cfg(feature = "tracing")]
                        tracing::warn!("Ending stream: {_e}");
                        increment_request_errors(Req::METHOD, ErrorKind::Send);
                        break Ok(());
                    }
                    continue;
                }
            };

            let permit = match &permits {
                Some(permits) => tokio::select! {
                    biased;
                    () = cancel.cancelled() => {
                        request_bag.done();
                        break Ok(());
                    }
                    permit = Arc::clone(permits).acquire_owned() => permit.ok(),
                },
                None => None,
            };

            increment_requests(Req::METHOD);
            let work = process_request(
                request,
                request_bag,
                Arc::clone(&self.executor),
                Arc::clone(&responder),
                cancel.clone(),
                permit,
            );

            if let Err(e) = self.pool.schedule(outstanding.track_future(work)) {
                #[cfg(feature = "tracing")]
                tracing::warn!("Dropping request {request_index}: {e}");

                let mut response = Req::Response::for_request(request_index);
                response.set_result(RpcStatus::from(&e));
                let _ = responder.lock().await.send(response).await;
                break Err(e);
            }
        };

        // === Draining ===
        outstanding.close();
        outstanding.wait().await;

        tracker.done();
        responder.lock().await.done();

        #[cfg(feature = "tracing")]
        tracing::debug!("{} stream closed", Req::METHOD);

        result
    }
}

fn delta_size(delta: &Attributes) -> u64 {
    (delta.strings.len()
        + delta.int64s.len()
        + delta.doubles.len()
        + delta.bools.len()
        + delta.timestamps.len()
        + delta.durations.len()
        + delta.bytes.len()
        + delta.string_maps.len()
        + delta.deleted_attributes.len()) as u64
}

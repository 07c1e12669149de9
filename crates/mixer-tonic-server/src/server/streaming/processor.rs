use crate::server::{
    service::executor::Executor,
    telemetry::{ErrorKind, increment_request_errors, record_request_duration},
};
use core::panic::AssertUnwindSafe;
use futures::FutureExt;
use mixer_tonic_core::{
    ApiRequest, ApiResponse, Error,
    attribute::Tracker,
    mixer::MutableBag,
    proto::{Attributes, RpcStatus},
};
use std::{sync::Arc, time::Instant};
use tokio::sync::{Mutex, OwnedSemaphorePermit, mpsc};
use tokio_util::sync::CancellationToken;
use tonic::{Code, Status};

/// The write side of one stream: the response channel plus the tracker that
/// turns response bags into deltas.
///
/// Both live behind one lock so that deltas reach the client in the order
/// they were computed.
pub struct Responder<M> {
    sink: mpsc::Sender<Result<M, Status>>,
    tracker: Tracker,
}

pub type SharedResponder<M> = Arc<Mutex<Responder<M>>>;

impl<M: ApiResponse> Responder<M> {
    pub const fn new(sink: mpsc::Sender<Result<M, Status>>, tracker: Tracker) -> Self {
        Self { sink, tracker }
    }

    /// Sends `response` unchanged.
    pub async fn send(&mut self, response: M) -> Result<(), Error> {
        self.sink
            .send(Ok(response))
            .await
            .map_err(|e| Error::ChannelError {
                context: format!("Failed to send response: {e}"),
            })
    }

    /// Attaches whatever changed in `response_bag` since the previous
    /// response, then sends.
    pub async fn send_with_attributes(
        &mut self,
        mut response: M,
        response_bag: &MutableBag,
    ) -> Result<(), Error> {
        let delta = self.tracker.apply_bag(response_bag);
        if delta != Attributes::default() {
            response.set_attribute_update(delta);
        }
        self.send(response).await
    }

    /// Releases the response-side tracker.
    pub fn done(&mut self) {
        self.tracker.done();
    }
}

/// Executes one decoded request and writes its response.
///
/// Runs on a pool worker. Owns both bags and releases them before returning,
/// whatever the outcome. A send failure cancels `cancel` so the stream stops
/// reading; `_permit`, if any, is returned to the stream when this finishes.
#[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip_all, fields(method = Req::METHOD, request_index = request.request_index())))]
pub async fn process_request<Req, E>(
    request: Req,
    request_bag: MutableBag,
    executor: Arc<E>,
    responder: SharedResponder<Req::Response>,
    cancel: CancellationToken,
    _permit: Option<OwnedSemaphorePermit>,
) where
    Req: ApiRequest,
    E: Executor<Req> + ?Sized,
{
    let start = Instant::now();
    let mut response_bag = MutableBag::new();
    let mut response = Req::Response::for_request(request.request_index());

    let outcome = AssertUnwindSafe(executor.execute(
        &request,
        &request_bag,
        &mut response_bag,
        &mut response,
    ))
    .catch_unwind()
    .await
    .unwrap_or_else(|_| Err(Error::Executor("executor panicked".to_string())));

    match outcome {
        Ok(()) if response.result().is_none() => response.set_result(RpcStatus::ok()),
        Ok(()) => {}
        Err(e) => {
            #[cfg(feature = "tracing")]
            tracing::warn!("Executor failed: {e}");
            increment_request_errors(Req::METHOD, ErrorKind::Executor);
            response.set_result(RpcStatus::new(Code::Internal, e.to_string()));
        }
    }

    let sent = responder
        .lock()
        .await
        .send_with_attributes(response, &response_bag)
        .await;

    if let Err(_e) = sent {
        #[cfg(feature = "tracing")]
        tracing::warn!("Ending stream: {_e}");
        increment_request_errors(Req::METHOD, ErrorKind::Send);
        cancel.cancel();
    }

    response_bag.done();
    request_bag.done();
    record_request_duration(Req::METHOD, start.elapsed().as_secs_f64() * 1000.0);
}

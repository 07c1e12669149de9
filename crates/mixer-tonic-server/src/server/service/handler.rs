//! gRPC service implementation for the attribute exchange protocol.
//!
//! [`MixerService`] implements the generated [`Mixer`] trait. Each of the
//! three methods opens a bidirectional stream and hands it to the shared
//! [`StreamDispatcher`], which runs on its own task while responses flow
//! back through a bounded channel.
//!
//! ## Responsibilities
//!
//! - Spawn the worker pool shared by every stream.
//! - Track open streams so shutdown can wait for them.
//! - Refuse new streams once shutdown has begun.

use crate::server::{
    config::ServerConfig,
    pool::WorkerPool,
    service::executor::Executor,
    streaming::coordinator::StreamDispatcher,
    telemetry::{decrement_streams_inflight, increment_streams_inflight},
};
use core::pin::Pin;
use mixer_tonic_core::{
    ApiRequest, Error,
    proto::{
        CheckRequest, CheckResponse, QuotaRequest, QuotaResponse, ReportRequest, ReportResponse,
        mixer_server::Mixer,
    },
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::{Stream, wrappers::ReceiverStream};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tonic::{Request, Response, Status, Streaming};

/// Response stream returned by every method.
pub type ResponseStream<M> = Pin<Box<dyn Stream<Item = Result<M, Status>> + Send>>;

/// The attribute exchange gRPC service.
///
/// Cheap to clone; clones share the pool, the executor and the stream
/// bookkeeping.
pub struct MixerService<E> {
    config: ServerConfig,
    dispatcher: Arc<StreamDispatcher<E>>,
    streams: TaskTracker,
    shutdown: CancellationToken,
}

impl<E> Clone for MixerService<E> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            dispatcher: Arc::clone(&self.dispatcher),
            streams: self.streams.clone(),
            shutdown: self.shutdown.clone(),
        }
    }
}

impl<E> MixerService<E> {
    /// Creates the service and spawns `config.num_workers` pool workers.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn new(config: ServerConfig, executor: E) -> Self {
        let pool = Arc::new(WorkerPool::new(config.num_workers));
        let dispatcher = StreamDispatcher::new(
            pool,
            Arc::clone(&config.dictionary),
            config.max_inflight_per_stream,
            Arc::new(executor),
        );

        Self {
            config,
            dispatcher: Arc::new(dispatcher),
            streams: TaskTracker::new(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Number of streams currently being served.
    pub fn streams_inflight(&self) -> usize {
        self.streams.len()
    }

    /// Gracefully shuts the service down.
    ///
    /// - Refuses new streams with `UNAVAILABLE`.
    /// - Waits up to `shutdown_timeout` for open streams to finish.
    /// - Shuts down the worker pool, which runs everything already queued.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ServiceShutdown`] if shutdown already ran.
    pub async fn shutdown(&self) -> Result<(), Error> {
        // === Phase 0: Stop accepting new streams ===
        if self.shutdown.is_cancelled() {
            return Err(Error::ServiceShutdown);
        }
        self.shutdown.cancel();
        self.streams.close();
        #[cfg(feature = "tracing")]
        tracing::info!("Refusing new streams");

        // === Phase 1: Wait for open streams to drain ===
        #[cfg(feature = "tracing")]
        tracing::info!(
            "Draining in-flight streams ({} active)",
            self.streams_inflight()
        );
        match tokio::time::timeout(self.config.shutdown_timeout, self.streams.wait()).await {
            Ok(()) => {
                #[cfg(feature = "tracing")]
                tracing::debug!("All in-flight streams drained successfully");
            }
            Err(_) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(
                    "Graceful drain timed out ({} streams still active)",
                    self.streams_inflight()
                );
            }
        }

        // === Phase 2: Stop the pool ===
        self.dispatcher.pool().shutdown().await
    }

    fn open_stream<Req>(
        &self,
        request: Request<Streaming<Req>>,
    ) -> Result<Response<ResponseStream<Req::Response>>, Status>
    where
        Req: ApiRequest,
        E: Executor<Req>,
    {
        if self.shutdown.is_cancelled() {
            return Err(Error::ServiceShutdown.into());
        }

        increment_streams_inflight();
        let (resp_tx, resp_rx) = mpsc::channel(self.config.stream_buffer_size);
        let dispatcher = Arc::clone(&self.dispatcher);
        let requests = request.into_inner();

        let fut = async move {
            if let Err(e) = dispatcher.dispatch(requests, resp_tx.clone()).await {
                #[cfg(feature = "tracing")]
                tracing::warn!("Stream ended with error: {e}");
                // The client may be gone already; nothing left to do then.
                let _ = resp_tx.send(Err(e.into())).await;
            }
            decrement_streams_inflight();
        };
        #[cfg(feature = "tracing")]
        let fut = {
            use tracing::Instrument;
            fut.instrument(tracing::info_span!("stream", method = Req::METHOD))
        };

        self.streams.spawn(fut);

        Ok(Response::new(Box::pin(ReceiverStream::new(resp_rx))))
    }
}

#[tonic::async_trait]
impl<E> Mixer for MixerService<E>
where
    E: Executor<CheckRequest> + Executor<ReportRequest> + Executor<QuotaRequest>,
{
    type CheckStream = ResponseStream<CheckResponse>;
    type ReportStream = ResponseStream<ReportResponse>;
    type QuotaStream = ResponseStream<QuotaResponse>;

    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    async fn check(
        &self,
        request: Request<Streaming<CheckRequest>>,
    ) -> Result<Response<Self::CheckStream>, Status> {
        self.open_stream(request)
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    async fn report(
        &self,
        request: Request<Streaming<ReportRequest>>,
    ) -> Result<Response<Self::ReportStream>, Status> {
        self.open_stream(request)
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    async fn quota(
        &self,
        request: Request<Streaming<QuotaRequest>>,
    ) -> Result<Response<Self::QuotaStream>, Status> {
        self.open_stream(request)
    }
}

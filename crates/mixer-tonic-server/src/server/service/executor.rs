use core::time::Duration;
use mixer_tonic_core::{
    ApiRequest, Error,
    mixer::MutableBag,
    proto::{
        CheckRequest, CheckResponse, QuotaRequest, QuotaResponse, ReportRequest, ReportResponse,
        RpcStatus,
    },
};
use tonic::Code;

/// Runs the business logic of one API method.
///
/// The dispatcher calls `execute` on a pool worker with the request, a bag
/// holding every attribute the stream has sent so far, a fresh response bag
/// and a response already correlated with the request.
///
/// Attributes written to `response_bag` are sent back to the client as a
/// delta. An executor that sets no result on `response` gets `OK`; one that
/// returns `Err` gets an `INTERNAL` result carrying the error message. The
/// stream carries on either way.
#[tonic::async_trait]
pub trait Executor<Req: ApiRequest>: Send + Sync + 'static {
    async fn execute(
        &self,
        request: &Req,
        request_bag: &MutableBag,
        response_bag: &mut MutableBag,
        response: &mut Req::Response,
    ) -> Result<(), Error>;
}

/// Adapter-free behaviour: every check and report succeeds and every quota
/// request is granted in full.
#[derive(Clone, Debug)]
pub struct DefaultExecutor {
    check_expiration: Duration,
}

impl DefaultExecutor {
    pub const fn new(check_expiration: Duration) -> Self {
        Self { check_expiration }
    }

    fn expiration(&self) -> prost_types::Duration {
        prost_types::Duration::try_from(self.check_expiration).unwrap_or_default()
    }
}

#[tonic::async_trait]
impl Executor<CheckRequest> for DefaultExecutor {
    async fn execute(
        &self,
        _request: &CheckRequest,
        _request_bag: &MutableBag,
        _response_bag: &mut MutableBag,
        response: &mut CheckResponse,
    ) -> Result<(), Error> {
        response.result = Some(RpcStatus::ok());
        response.expiration = Some(self.expiration());
        Ok(())
    }
}

#[tonic::async_trait]
impl Executor<ReportRequest> for DefaultExecutor {
    async fn execute(
        &self,
        _request: &ReportRequest,
        _request_bag: &MutableBag,
        _response_bag: &mut MutableBag,
        response: &mut ReportResponse,
    ) -> Result<(), Error> {
        response.result = Some(RpcStatus::ok());
        Ok(())
    }
}

#[tonic::async_trait]
impl Executor<QuotaRequest> for DefaultExecutor {
    async fn execute(
        &self,
        request: &QuotaRequest,
        _request_bag: &MutableBag,
        _response_bag: &mut MutableBag,
        response: &mut QuotaResponse,
    ) -> Result<(), Error> {
        if request.amount <= 0 {
            response.result = Some(RpcStatus::new(
                Code::InvalidArgument,
                format!("quota amount must be positive, got {}", request.amount),
            ));
            return Ok(());
        }

        response.amount = request.amount;
        response.expiration = Some(self.expiration());
        response.result = Some(RpcStatus::ok());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mixer_tonic_core::ApiResponse;

    async fn run<Req: ApiRequest>(executor: &dyn Executor<Req>, request: Req) -> Req::Response {
        let request_bag = MutableBag::new();
        let mut response_bag = MutableBag::new();
        let mut response = Req::Response::for_request(request.request_index());
        executor
            .execute(&request, &request_bag, &mut response_bag, &mut response)
            .await
            .unwrap();
        request_bag.done();
        response_bag.done();
        response
    }

    #[tokio::test]
    async fn check_succeeds_with_expiration() {
        let executor = DefaultExecutor::new(Duration::from_millis(1500));
        let response = run(
            &executor,
            CheckRequest {
                request_index: 3,
                ..Default::default()
            },
        )
        .await;

        assert_eq!(response.request_index, 3);
        assert!(response.result.as_ref().is_some_and(RpcStatus::is_ok));
        assert_eq!(
            response.expiration,
            Some(prost_types::Duration {
                seconds: 1,
                nanos: 500_000_000
            })
        );
    }

    #[tokio::test]
    async fn report_succeeds() {
        let executor = DefaultExecutor::new(Duration::ZERO);
        let response = run(&executor, ReportRequest::default()).await;
        assert!(response.result.as_ref().is_some_and(RpcStatus::is_ok));
    }

    #[tokio::test]
    async fn quota_grants_requested_amount() {
        let executor = DefaultExecutor::new(Duration::from_secs(1));
        let response = run(
            &executor,
            QuotaRequest {
                request_index: 9,
                quota: "requestcount".to_string(),
                amount: 5,
                ..Default::default()
            },
        )
        .await;

        assert_eq!(response.amount, 5);
        assert!(response.result.as_ref().is_some_and(RpcStatus::is_ok));
    }

    #[tokio::test]
    async fn zero_quota_is_invalid() {
        let executor = DefaultExecutor::new(Duration::from_secs(1));
        let response = run(
            &executor,
            QuotaRequest {
                amount: 0,
                ..Default::default()
            },
        )
        .await;

        assert_eq!(response.amount, 0);
        assert_eq!(
            response.result.as_ref().map(RpcStatus::code),
            Some(Code::InvalidArgument)
        );
    }
}

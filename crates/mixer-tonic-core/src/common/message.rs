//! Uniform access to the request/response pairs of the three API methods.
//!
//! `Check`, `Report` and `Quota` share one dispatch pattern: take the
//! attribute update out of the request, run an executor, and answer with a
//! response that echoes the request's `request_index`. [`ApiRequest`] and
//! [`ApiResponse`] expose exactly the fields that pattern needs so the stream
//! dispatcher can be written once.

use crate::proto::{
    Attributes, CheckRequest, CheckResponse, QuotaRequest, QuotaResponse, ReportRequest,
    ReportResponse, RpcStatus,
};
use tonic::Code;

/// An inbound message on one of the API streams.
pub trait ApiRequest: Send + Sync + 'static {
    /// The response type paired with this request.
    type Response: ApiResponse;

    /// Method name, used for logging and metrics.
    const METHOD: &'static str;

    /// The caller-supplied correlation identifier.
    fn request_index(&self) -> i64;

    /// Moves the attribute delta out of the request, leaving it empty.
    fn take_attribute_update(&mut self) -> Attributes;
}

/// An outbound message on one of the API streams.
pub trait ApiResponse: Send + 'static {
    /// Creates an empty response correlated with `request_index`.
    fn for_request(request_index: i64) -> Self;

    fn request_index(&self) -> i64;

    fn set_result(&mut self, result: RpcStatus);

    fn result(&self) -> Option<&RpcStatus>;

    fn set_attribute_update(&mut self, attributes: Attributes);
}

macro_rules! impl_api_method {
    ($($method:literal: $req:ty => $resp:ty),+ $(,)?) => {
        $(
            impl ApiRequest for $req {
                type Response = $resp;
                const METHOD: &'static str = $method;

                fn request_index(&self) -> i64 {
                    self.request_index
                }

                fn take_attribute_update(&mut self) -> Attributes {
                    self.attribute_update.take().unwrap_or_default()
                }
            }

            impl ApiResponse for $resp {
                fn for_request(request_index: i64) -> Self {
                    Self {
                        request_index,
                        ..Default::default()
                    }
                }

                fn request_index(&self) -> i64 {
                    self.request_index
                }

                fn set_result(&mut self, result: RpcStatus) {
                    self.result = Some(result);
                }

                fn result(&self) -> Option<&RpcStatus> {
                    self.result.as_ref()
                }

                fn set_attribute_update(&mut self, attributes: Attributes) {
                    self.attribute_update = Some(attributes);
                }
            }
        )+
    };
}

impl_api_method!(
    "check": CheckRequest => CheckResponse,
    "report": ReportRequest => ReportResponse,
    "quota": QuotaRequest => QuotaResponse,
);

impl RpcStatus {
    pub fn new(code: Code, message: impl Into<String>) -> Self {
        Self {
            code: code as i32,
            message: message.into(),
        }
    }

    pub fn ok() -> Self {
        Self::new(Code::Ok, "")
    }

    pub fn code(&self) -> Code {
        Code::from_i32(self.code)
    }

    pub fn is_ok(&self) -> bool {
        self.code == Code::Ok as i32
    }
}

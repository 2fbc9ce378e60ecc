//! Responses sent back to clients. Either relayed from a backend server
//! without modifications or generated by the proxy itself when dispatching
//! fails.

use http_body_util::BodyExt;
use hyper::{
    body::Incoming,
    header::{self, HeaderValue},
    Response,
    StatusCode,
};

use super::body::{self, ProxyBody};
use crate::Error;

/// Response type returned by the connection service.
pub(crate) type BoxBodyResponse = Response<ProxyBody>;

/// Relays a backend response to the client. Status, headers and body stream
/// are forwarded exactly as received.
pub(crate) fn relay(response: Response<Incoming>) -> BoxBodyResponse {
    response.map(|body| body.boxed())
}

/// Responses generated by this proxy when the request can't be forwarded.
pub(crate) struct LocalResponse;

impl LocalResponse {
    /// Plain text response whose body is the canonical reason of `status`.
    pub fn with_status(status: StatusCode) -> BoxBodyResponse {
        let reason = status.canonical_reason().unwrap_or_default();
        let mut response = Response::new(body::full(format!("HTTP {} {reason}\n", status.as_u16())));

        *response.status_mut() = status;
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        response.headers_mut().insert(
            header::SERVER,
            HeaderValue::from_static(concat!("loadbalancer/", env!("CARGO_PKG_VERSION"))),
        );

        response
    }

    /// Upstream server refused the connection or sent garbage.
    pub fn bad_gateway() -> BoxBodyResponse {
        Self::with_status(StatusCode::BAD_GATEWAY)
    }

    /// Upstream server took longer than the configured timeout.
    pub fn gateway_timeout() -> BoxBodyResponse {
        Self::with_status(StatusCode::GATEWAY_TIMEOUT)
    }

    /// There is no healthy backend to send the request to.
    pub fn service_unavailable() -> BoxBodyResponse {
        Self::with_status(StatusCode::SERVICE_UNAVAILABLE)
    }

    /// Maps a dispatch error to the status code the client should see.
    pub fn from_error(err: &Error) -> BoxBodyResponse {
        match err {
            Error::NoHealthyBackends | Error::IndexOutOfRange { .. } => {
                Self::service_unavailable()
            }
            Error::UpstreamTimeout(_) => Self::gateway_timeout(),
            Error::Upstream(_) => Self::bad_gateway(),
            Error::Configuration(_) | Error::Io(_) => {
                Self::with_status(StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }
}

//! Outbound requests. The proxy forwards the method, headers and body of the
//! client request untouched, the only thing that might change is the request
//! target, which has to be in origin-form (`/path?query`) when talking to the
//! backend over a direct connection.

use hyper::{
    header::{self, HeaderValue},
    http::uri::PathAndQuery,
    Request,
    Uri,
};

/// Path used by the health checker to probe backends.
pub(crate) const HEALTH_CHECK_PATH: &str = "/healthcheck";

/// Consumes the client request and returns the request that must be sent to
/// the backend located at `authority` (`host:port`).
///
/// Absolute-form targets (`http://host/path`) are reduced to origin-form.
/// Headers are kept verbatim, including multiple values of the same header.
/// If the client did not send a `Host` header, the backend authority is used
/// because HTTP/1.1 servers are required to reject requests without one.
pub(crate) fn into_outbound<T>(mut request: Request<T>, authority: &str) -> Request<T> {
    let path_and_query = request
        .uri()
        .path_and_query()
        .cloned()
        .unwrap_or_else(|| PathAndQuery::from_static("/"));

    *request.uri_mut() = Uri::from(path_and_query);

    if !request.headers().contains_key(header::HOST) {
        if let Ok(host) = HeaderValue::from_str(authority) {
            request.headers_mut().insert(header::HOST, host);
        }
    }

    request
}

/// Builds the liveness probe sent to every backend on each sweep.
pub(crate) fn health_check<T>(authority: &str, body: T) -> Request<T> {
    let mut request = Request::new(body);
    *request.uri_mut() = Uri::from_static(HEALTH_CHECK_PATH);

    if let Ok(host) = HeaderValue::from_str(authority) {
        request.headers_mut().insert(header::HOST, host);
    }

    request
}

use std::{net::SocketAddr, time::Duration};

use hyper::{body::Incoming, Request};

use crate::{
    http::response::{self, BoxBodyResponse, LocalResponse},
    sched::Balancer,
};

/// Forwards the request to a backend chosen by `balancer` and returns the
/// response sent by that backend. Dispatch errors are never returned to
/// hyper, they become local error responses so that the client connection
/// stays usable and other requests are not affected.
pub(super) async fn forward(
    request: Request<Incoming>,
    balancer: &Balancer,
    timeout: Duration,
    client_addr: SocketAddr,
) -> BoxBodyResponse {
    let method = request.method().clone();
    let uri = request.uri().clone();

    match balancer.schedule_request(request, timeout).await {
        Ok(response) => {
            tracing::info!(
                client = %client_addr,
                %method,
                %uri,
                status = %response.status(),
                "request forwarded"
            );
            response::relay(response)
        }

        Err(err) => {
            tracing::warn!(
                client = %client_addr,
                %method,
                %uri,
                "failed to schedule request: {err}"
            );
            LocalResponse::from_error(&err)
        }
    }
}

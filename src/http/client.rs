//! Minimal HTTP/1 client used for both forwarding requests and probing
//! backends. Each call opens a new TCP connection, there is no pooling.

use std::time::Duration;

use hyper::{
    body::{Body, Incoming},
    Request,
    Response,
};
use hyper_util::rt::TokioIo;
use tokio::net::TcpStream;

use crate::Error;

/// Sends `request` to the server listening on `authority` (`host:port`) and
/// returns the response as soon as its head is received. Connecting,
/// handshaking and waiting for the response head must all complete within
/// `timeout`, otherwise [`Error::UpstreamTimeout`] is returned. The body is
/// streamed afterwards by a background task that owns the connection.
pub(crate) async fn send<B>(
    authority: &str,
    request: Request<B>,
    timeout: Duration,
) -> Result<Response<Incoming>, Error>
where
    B: Body + Send + 'static,
    B::Data: Send,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    match tokio::time::timeout(timeout, exchange(authority, request)).await {
        Ok(result) => result,
        Err(_) => Err(Error::UpstreamTimeout(timeout)),
    }
}

async fn exchange<B>(authority: &str, request: Request<B>) -> Result<Response<Incoming>, Error>
where
    B: Body + Send + 'static,
    B::Data: Send,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let stream = TcpStream::connect(authority)
        .await
        .map_err(Error::upstream)?;

    let (mut sender, conn) = hyper::client::conn::http1::Builder::new()
        .preserve_header_case(true)
        .title_case_headers(true)
        .handshake(TokioIo::new(stream))
        .await
        .map_err(Error::upstream)?;

    let backend = authority.to_owned();

    tokio::task::spawn(async move {
        if let Err(err) = conn.await {
            tracing::debug!(%backend, "upstream connection closed with error: {err}");
        }
    });

    sender.send_request(request).await.map_err(Error::upstream)
}

//! Wrappers and abstractions over [`hyper`] HTTP services.

use std::{convert::Infallible, error::Error, future::Future, pin::Pin};

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::{
    body::{Body, Incoming},
    service::Service,
    Request,
    Response,
};
use hyper_util::rt::TokioIo;
use tokio::{net::TcpStream, sync::mpsc};

/// Backend server that can run on different tasks and shares every request that
/// it receives on a channel. This allows us to write cleaner tests where all
/// asserts are done in the test function, not on a separate task. Health
/// checks are answered but not shared.
#[derive(Clone)]
pub struct RequestInterceptor {
    tx: mpsc::Sender<(http::request::Parts, Bytes)>,
}

impl RequestInterceptor {
    pub fn new(tx: mpsc::Sender<(http::request::Parts, Bytes)>) -> Self {
        Self { tx }
    }
}

impl Service<Request<Incoming>> for RequestInterceptor {
    type Response = Response<Full<Bytes>>;

    type Error = Infallible;

    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn call(&self, req: Request<Incoming>) -> Self::Future {
        let tx = self.tx.clone();
        Box::pin(async move {
            if req.uri().path() == "/healthcheck" {
                return Ok(Response::new(Full::default()));
            }

            let (parts, body) = req.into_parts();

            tx.send((parts, body.collect().await.unwrap().to_bytes()))
                .await
                .unwrap();

            Ok(Response::builder()
                .header("x-backend", "interceptor")
                .header("set-cookie", "a=1")
                .header("set-cookie", "b=2")
                .body(Full::<Bytes>::from("Hello world"))
                .unwrap())
        })
    }
}

/// Serves an HTTP connection with the given service. Errors are ignored since
/// clients like the health checker close connections abruptly.
pub async fn serve_connection<S, B>(stream: TcpStream, service: S)
where
    S: Service<Request<Incoming>, Response = Response<B>, Error = Infallible>,
    B: Body + Send + 'static,
    B::Data: Send,
    B::Error: Into<Box<dyn Error + Send + Sync>>,
{
    let _ = hyper::server::conn::http1::Builder::new()
        .preserve_header_case(true)
        .title_case_headers(true)
        .serve_connection(TokioIo::new(stream), service)
        .await;
}

//! Backend server for trying the load balancer by hand. Answers health checks
//! with `200 OK` and every other request with a greeting that includes its
//! port, optionally after sleeping for a while to simulate a slow server.

use std::{convert::Infallible, net::SocketAddr, time::Duration};

use bytes::Bytes;
use clap::Parser;
use http_body_util::Full;
use hyper::{body::Incoming, service::service_fn, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug, Clone, Copy)]
#[command(about = "Test backend server for the load balancer")]
struct Args {
    /// Port to run the HTTP server on.
    #[arg(short, long)]
    port: u16,

    /// Microseconds to sleep before responding.
    #[arg(short, long, default_value_t = 0)]
    sleep: u64,
}

async fn handle(request: Request<Incoming>, args: Args) -> Result<Response<Full<Bytes>>, Infallible> {
    tracing::info!(
        method = %request.method(),
        uri = %request.uri(),
        user_agent = ?request.headers().get(hyper::header::USER_AGENT),
        "request received"
    );

    if request.uri().path() == "/healthcheck" {
        tracing::info!("responding to health check");
        let mut response = Response::new(Full::default());
        *response.status_mut() = StatusCode::OK;
        return Ok(response);
    }

    tokio::time::sleep(Duration::from_micros(args.sleep)).await;
    tracing::info!("replied with a hello message");

    Ok(Response::new(Full::from(format!(
        "Hello From Backend Server {}\n",
        args.port
    ))))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "testbackend=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let address = SocketAddr::from(([0, 0, 0, 0], args.port));
    let listener = TcpListener::bind(address).await?;

    tracing::info!(%address, "backend listening");

    loop {
        let (stream, _) = listener.accept().await?;

        tokio::task::spawn(async move {
            let service = service_fn(move |request| handle(request, args));

            if let Err(err) = hyper::server::conn::http1::Builder::new()
                .serve_connection(TokioIo::new(stream), service)
                .await
            {
                tracing::warn!("failed to serve connection: {err}");
            }
        });
    }
}

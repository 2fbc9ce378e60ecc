//! HTTP utilities for integrations tests.

use std::{
    convert::Infallible,
    error::Error,
    net::SocketAddr,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::{
    body::{Body, Incoming},
    client::conn::http1::SendRequest,
    service::{service_fn, Service},
    Request,
    Response,
    StatusCode,
};
use hyper_util::rt::TokioIo;
use loadbalancer::{sched::Registry, Config, Server, State};
use tokio::{
    self,
    net::{TcpSocket, TcpStream},
    sync::{oneshot, watch},
    task::JoinHandle,
};

use super::{
    service::serve_connection,
    tcp::{local_listener, local_socket, wait_until_listening},
};

/// Starts a backend server in the background with a customizable request
/// handler, returning the listening address and task handle. Each accepted
/// connection is served on its own task.
pub fn spawn_backend_server<S, B>(service: S) -> (SocketAddr, JoinHandle<()>)
where
    S: Service<Request<Incoming>, Response = Response<B>, Error = Infallible>
        + Clone
        + Send
        + 'static,
    S::Future: Send + 'static,
    B: Body + Send + 'static,
    B::Data: Send,
    B::Error: Into<Box<dyn Error + Send + Sync>>,
{
    let (listener, addr) = local_listener();

    let handle = tokio::task::spawn(async move {
        loop {
            let (stream, _) = listener.accept().await.unwrap();
            tokio::task::spawn(serve_connection(stream, service.clone()));
        }
    });

    (addr, handle)
}

/// Behaviour of a backend spawned with [`spawn_backend`].
#[derive(Clone, Copy)]
pub struct BackendOptions {
    /// Status sent to `GET /healthcheck`.
    pub health: StatusCode,

    /// Delay before answering non health check requests.
    pub delay: Duration,
}

impl Default for BackendOptions {
    fn default() -> Self {
        Self {
            health: StatusCode::OK,
            delay: Duration::ZERO,
        }
    }
}

/// Backend server that counts the requests it receives, health checks
/// excluded. Responds with its own address as the body.
pub struct CountingBackend {
    pub address: SocketAddr,
    pub requests: Arc<AtomicUsize>,
}

impl CountingBackend {
    pub fn count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

/// Starts a new [`CountingBackend`] in the background.
pub fn spawn_backend(options: BackendOptions) -> CountingBackend {
    let requests = Arc::new(AtomicUsize::new(0));
    let counter = requests.clone();

    let (listener, address) = local_listener();

    tokio::task::spawn(async move {
        loop {
            let counter = counter.clone();
            let service = service_fn(move |req: Request<Incoming>| {
                let counter = counter.clone();
                async move {
                    if req.uri().path() == "/healthcheck" {
                        let mut response = Response::new(Full::<Bytes>::default());
                        *response.status_mut() = options.health;
                        return Ok::<_, Infallible>(response);
                    }

                    counter.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(options.delay).await;

                    Ok(Response::new(Full::<Bytes>::from(address.to_string())))
                }
            });

            let (stream, _) = listener.accept().await.unwrap();
            tokio::task::spawn(serve_connection(stream, service));
        }
    });

    CountingBackend { address, requests }
}

/// Same as [`spawn_backend`] but spawns multiple backends with the same
/// options.
pub fn spawn_backends(n: usize, options: BackendOptions) -> Vec<CountingBackend> {
    (0..n).map(|_| spawn_backend(options)).collect()
}

/// Load balancer running in the background.
pub struct LoadBalancer {
    pub address: SocketAddr,
    pub registry: Arc<Registry>,
    pub handle: JoinHandle<()>,
}

/// Starts a load balancer in the background with the given config.
pub fn spawn_load_balancer(config: Config) -> LoadBalancer {
    let server = Server::init(config).unwrap();

    let address = server.socket_address();
    let registry = server.registry();

    let handle = tokio::task::spawn(async {
        server.run().await.unwrap();
    });

    LoadBalancer {
        address,
        registry,
        handle,
    }
}

/// Starts a load balancer in the background with the given config and
/// provides access to shutdown trigger and state updates.
pub fn spawn_load_balancer_with_controllers(
    config: Config,
) -> (SocketAddr, JoinHandle<()>, impl FnOnce(), watch::Receiver<State>) {
    let (tx, rx) = oneshot::channel();

    let server = Server::init(config).unwrap().shutdown_on(rx);

    let addr = server.socket_address();
    let state = server.subscribe();

    let handle = tokio::task::spawn(async {
        server.run().await.unwrap();
    });

    (addr, handle, || tx.send(()).unwrap(), state)
}

/// Provides an HTTP client that spawns a connection object in the background
/// to manage request transmissions.
pub async fn http_client<B>(stream: TcpStream) -> SendRequest<B>
where
    B: Body + Send + 'static,
    B::Data: Send,
    B::Error: Into<Box<dyn Error + Send + Sync>>,
{
    let (sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
        .await
        .unwrap();
    tokio::task::spawn(async move {
        let _ = conn.await;
    });

    sender
}

/// Sends an HTTP request from the given [`TcpSocket`] to the given
/// [`SocketAddr`].
pub async fn send_http_request_from<B>(
    from: TcpSocket,
    to: SocketAddr,
    req: Request<B>,
) -> (http::response::Parts, Bytes)
where
    B: Body + Send + 'static,
    B::Data: Send,
    B::Error: Into<Box<dyn Error + Send + Sync>>,
{
    let stream = from.connect(to).await.unwrap();
    let mut sender = http_client(stream).await;

    let (parts, body) = sender.send_request(req).await.unwrap().into_parts();
    (parts, body.collect().await.unwrap().to_bytes())
}

/// Sends an HTTP request from a random socket to the given address.
pub async fn send_http_request<B>(to: SocketAddr, req: Request<B>) -> (http::response::Parts, Bytes)
where
    B: Body + Send + 'static,
    B::Data: Send,
    B::Error: Into<Box<dyn Error + Send + Sync>>,
{
    send_http_request_from(local_socket().0, to, req).await
}

/// Same as [`send_http_request`] but runs as a different task. This allows
/// the current task to continue execution.
pub fn spawn_client<B>(
    target: SocketAddr,
    req: Request<B>,
) -> JoinHandle<(http::response::Parts, Bytes)>
where
    B: Body + Send + 'static,
    B::Data: Send,
    B::Error: Into<Box<dyn Error + Send + Sync>>,
{
    tokio::task::spawn(async move {
        wait_until_listening(target).await;
        send_http_request(target, req).await
    })
}

/// Waits until the registry reports `expected` healthy backends. Panics if
/// that doesn't happen in a few seconds.
pub async fn wait_for_healthy_count(registry: &Registry, expected: usize) {
    let wait = async {
        while registry.snapshot_healthy_count() != expected {
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    };

    tokio::time::timeout(Duration::from_secs(5), wait)
        .await
        .unwrap_or_else(|_| panic!("registry never reached {expected} healthy backends"));
}

pub mod request {
    //! Quick request factory.

    use bytes::Bytes;
    use http_body_util::Empty;
    use hyper::Request;

    pub fn empty() -> Request<Empty<Bytes>> {
        Request::builder().body(Empty::<Bytes>::new()).unwrap()
    }

    pub fn empty_with_uri(uri: &str) -> Request<Empty<Bytes>> {
        Request::builder()
            .uri(uri)
            .body(Empty::<Bytes>::new())
            .unwrap()
    }
}

use std::{future::Future, net::SocketAddr, pin::Pin, sync::Arc, time::Duration};

use hyper_util::rt::TokioIo;
use tokio::{
    net::{TcpListener, TcpSocket},
    sync::{watch, Semaphore},
};

use crate::{
    config::{BackendAddress, Config},
    sched::{Balancer, HealthChecker, Registry, Scheduler},
    service::LoadBalancer,
    sync::notify::{Notification, Notifier},
    Error,
};

/// The [`Server`] accepts client connections on the configured port and
/// spawns a Tokio task for each one, while the [`HealthChecker`] runs on its
/// own task and keeps the registry of backends up to date. It is also
/// responsible for gracefully stopping all of them. In order to perform
/// graceful shutdowns, the [`Server`] notifies all the running tasks about
/// the shutdown event and waits for their acknowledgements. See [`Notifier`]
/// for further details. Here's a simple diagram describing the process:
///
/// ```text
///                        +--------+
///                        | Server |
///                        +--------+
///                            |
///              +-------------+-------------+
///              v                           v
///        +----------+                +----------+
///        |  Health  |                |  Select  | ---+
///        | Checker  |                +----------+    |
///        +----------+                      |         v
///              |                           v   +----------+
///              |                     +--------+| Shutdown |
///              |                     | Accept |+----------+
///              |                     +--------+      |
///              |                           |         v
///              |                           v   +----------+
///              |                     +--------+|  Notify  |
///              |                     | Spawn  |+----------+
///              |                     +--------+      |
///              v                           v         |
///        +-----------+  +--------+   +--------+      |
///        | Registry  |<-| Task 1 |   | Task 2 |<-----+
///        +-----------+  +--------+   +--------+
/// ```
pub struct Server {
    /// State updates channel. Subscribers can use this to check the current
    /// [`State`] of this server.
    state: watch::Sender<State>,

    /// TCP listener used to accept connections.
    listener: TcpListener,

    /// Socket address used by this server to listen for incoming connections.
    address: SocketAddr,

    /// Scheduler shared by every connection task.
    balancer: Arc<Balancer>,

    /// Health checker for the registry of `balancer`.
    health_checker: HealthChecker,

    /// Timeout for requests sent to backends.
    timeout: Duration,

    /// [`Notifier`] object used to send notifications to tasks spawned by
    /// this server.
    notifier: Notifier,

    /// Shutdown future, this can be anything, which allows us to easily write
    /// integration tests. When this future completes, the server starts the
    /// shutdown process.
    shutdown: Pin<Box<dyn Future<Output = ()> + Send>>,

    /// Connections are limited to a maximum number. In order to allow a new
    /// connection we'll have a acquire a permit from the semaphore.
    connections: Arc<Semaphore>,

    /// Total number of permits in `connections`.
    max_connections: usize,
}

/// Represents the current state of the server.
#[derive(Debug, PartialEq, Eq)]
pub enum State {
    /// Server has started but is not accepting connections yet.
    Starting,

    /// Server is accepting incoming connections.
    Listening,

    /// Maximum number of connections reached.
    MaxConnectionsReached(usize),

    /// Server is gracefully shutting down.
    ShuttingDown(ShutdownState),
}

/// Represents a state in the graceful shutdown process.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ShutdownState {
    /// The server has received the shutdown signal and won't accept more
    /// connections, but it will still finish the requests in progress.
    PendingConnections(usize),

    /// Shutdown process complete.
    Done,
}

impl Server {
    /// Initializes a [`Server`] with the given `config`. This binds the
    /// listening socket and builds the registry, scheduler and health checker,
    /// but does not accept connections nor run health checks yet. In order to
    /// do that, [`Server::run`] must be called and `await`ed. We do it this
    /// way because we use the port 0 for integration tests, which allows the
    /// OS to pick any available port, but we still want to know which port
    /// the server is using.
    pub fn init(config: Config) -> Result<Self, Error> {
        config.validate()?;

        let (state, _) = watch::channel(State::Starting);

        let listen = config.listen();

        let socket = if listen.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };

        #[cfg(not(windows))]
        socket.set_reuseaddr(true)?;

        socket.bind(listen)?;

        // TODO: Hardcoded backlog, maybe this should be configurable.
        let listener = socket.listen(1024)?;

        // If the TCP port is 0 then the OS will choose a valid one.
        let address = listener.local_addr()?;

        let timeout = config.timeout();
        let interval = config.health_check_interval();
        let registry = Arc::new(Registry::new(config.servers.iter().map(BackendAddress::as_str)));
        let balancer = Arc::new(Balancer::new(config.algorithm, registry));
        let health_checker = balancer.health_checker(interval, timeout);

        tracing::info!(
            algorithm = %config.algorithm,
            backends = ?balancer.registry().backends().iter().map(|b| b.address()).collect::<Vec<_>>(),
            "load balancer initialized"
        );

        Ok(Self {
            state,
            listener,
            address,
            balancer,
            health_checker,
            timeout,
            notifier: Notifier::new(),
            // Don't shutdown on anything by default. CTRL-C will forcefully
            // kill the process.
            shutdown: Box::pin(std::future::pending()),
            connections: Arc::new(Semaphore::new(config.connections)),
            max_connections: config.connections,
        })
    }

    /// The [`Server`] will poll the given `future` and whenever it completes,
    /// the graceful shutdown process starts. The binary uses
    /// [`tokio::signal::ctrl_c`], tests use channels.
    pub fn shutdown_on(mut self, future: impl Future + Send + 'static) -> Self {
        self.shutdown = Box::pin(async move {
            future.await;
        });

        self
    }

    /// Address of the listening socket. This is necessary for obtaining the
    /// actual address in cases port 0 was used.
    pub fn socket_address(&self) -> SocketAddr {
        self.address
    }

    /// Registry of backends used by this server. Useful for inspecting
    /// health state from outside.
    pub fn registry(&self) -> Arc<Registry> {
        Arc::clone(self.balancer.registry())
    }

    /// By subscribing to this server the caller obtains a channel where the
    /// current state of the server can be read. This allows the server and
    /// caller to run on separate Tokio tasks while still allowing the caller
    /// to read the state.
    pub fn subscribe(&self) -> watch::Receiver<State> {
        self.state.subscribe()
    }

    /// This is the entry point, by calling and `await`ing this function the
    /// server starts running health checks and processing connections.
    pub async fn run(self) -> Result<(), Error> {
        let Self {
            state,
            listener,
            address,
            balancer,
            health_checker,
            timeout,
            notifier,
            shutdown,
            connections,
            max_connections,
        } = self;

        tokio::task::spawn(health_checker.run(notifier.subscribe()));

        state.send_replace(State::Listening);
        tracing::info!(%address, "listening for requests");

        let listener = Listener {
            listener,
            balancer,
            timeout,
            connections,
            max_connections,
            notifier: &notifier,
            state: &state,
        };

        let mut result = Ok(());

        tokio::select! {
            accepted = listener.listen() => {
                if let Err(err) = accepted {
                    tracing::error!("error while accepting connections: {err}");
                    result = Err(err);
                }
            }
            _ = shutdown => {
                tracing::info!("received shutdown signal");
            }
        }

        // Drop the listener to stop accepting new connections. This will cause
        // a "Connection Refused" error on any new client socket that attempts
        // to connect. Already connected sockets will still be able to send and
        // receive data.
        drop(listener);

        // The health checker is always subscribed, so this can't fail. Don't
        // count it as a connection though.
        if let Ok(subscribers) = notifier.send(Notification::Shutdown) {
            let pending = subscribers.saturating_sub(1);
            if pending > 0 {
                tracing::info!("can't shutdown yet, {pending} pending connections");
            }
            state.send_replace(State::ShuttingDown(ShutdownState::PendingConnections(
                pending,
            )));
            notifier.collect_acknowledgements().await;
        }

        state.send_replace(State::ShuttingDown(ShutdownState::Done));
        tracing::info!("shutdown complete");

        result
    }
}

/// Listens for incoming connections and spawns tasks to handle them if permits
/// are available.
struct Listener<'a> {
    /// Underlying TCP listener. We take ownership of this so that when this
    /// struct is dropped the socket is also dropped and we stop accepting
    /// connections.
    listener: TcpListener,

    /// Handed down to every connection task.
    balancer: Arc<Balancer>,

    timeout: Duration,

    /// Connections permits.
    connections: Arc<Semaphore>,

    max_connections: usize,

    /// Needed to obtain subscriptions and pass them down to request handler
    /// tasks.
    notifier: &'a Notifier,

    /// Used to update the state when max connections are reached.
    state: &'a watch::Sender<State>,
}

impl<'a> Listener<'a> {
    async fn listen(&self) -> Result<(), Error> {
        loop {
            let mut notify_listening_again = false;

            if self.connections.available_permits() == 0 {
                tracing::warn!("reached max connections: {}", self.max_connections);
                self.state
                    .send_replace(State::MaxConnectionsReached(self.max_connections));
                notify_listening_again = true;
            }

            // The semaphore is never closed.
            let Ok(permit) = self.connections.clone().acquire_owned().await else {
                return Ok(());
            };

            // Once we've obtained a permit we can start listening again if
            // we stopped before.
            if notify_listening_again {
                tracing::info!("accepting connections again");
                self.state.send_replace(State::Listening);
            }

            let (stream, client_addr) = self.listener.accept().await?;
            let mut subscription = self.notifier.subscribe();
            let service = LoadBalancer::new(Arc::clone(&self.balancer), self.timeout, client_addr);

            tokio::task::spawn(async move {
                let connection = hyper::server::conn::http1::Builder::new()
                    .preserve_header_case(true)
                    .title_case_headers(true)
                    .serve_connection(TokioIo::new(stream), service);

                tokio::pin!(connection);

                let mut shutting_down = false;

                // On shutdown the request in progress, if any, is completed
                // and then the connection is closed.
                let served = tokio::select! {
                    served = connection.as_mut() => served,
                    _ = subscription.notified() => {
                        shutting_down = true;
                        connection.as_mut().graceful_shutdown();
                        connection.await
                    }
                };

                if let Err(err) = served {
                    tracing::debug!(client = %client_addr, "failed to serve connection: {err}");
                }

                // Nobody reads acknowledgements unless the server is shutting
                // down, otherwise dropping the subscription is enough.
                if shutting_down || subscription.receive_notification().is_some() {
                    subscription.acknowledge_notification().await;
                }

                // Permit is dropped only when the accepted socket is done
                // sending and receiving data.
                drop(permit);
            });
        }
    }
}

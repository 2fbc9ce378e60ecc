//! Load balancing and scheduler implementations.
//!
//! All schedulers pick backends from the healthy prefix of a shared
//! [`Registry`], which is kept up to date by a [`HealthChecker`] running on
//! its own task. No lock is ever held while waiting for the network: the
//! registry is read-locked only to pick a backend, and the latency of a
//! backend is locked only to read or update it.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use hyper::{
    body::{Body, Incoming},
    Request,
    Response,
};

mod health;
mod lart;
mod registry;
mod rr;

pub use health::{probe, HealthChecker, MAX_INTERVAL};
pub use lart::LeastAverageResponseTime;
pub use registry::{Backend, HealthyPrefix, Registry};
pub use rr::RoundRobin;

use crate::{
    config::Algorithm,
    http::{client, request},
    Error,
};

/// A scheduler provides an algorithm for load balancing between multiple
/// backend servers.
pub trait Scheduler {
    /// Returns the backend that should process the next request, or
    /// [`Error::NoHealthyBackends`] if there is none available.
    fn next_server(&self) -> Result<Arc<Backend>, Error>;

    /// Notifies the scheduler that `backend` has successfully processed a
    /// request in `elapsed` time. Failed requests are not reported.
    fn request_processed(&self, _backend: &Backend, _elapsed: Duration) {}

    /// Registry this scheduler picks backends from.
    fn registry(&self) -> &Arc<Registry>;
}

/// Scheduler chosen in the configuration file. Using an enum instead of a
/// boxed `dyn` trait allows the server to share it between tasks without
/// extra indirection, and there are only two algorithms anyway.
#[derive(Debug)]
pub enum Balancer {
    RoundRobin(RoundRobin),
    LeastAverageResponseTime(LeastAverageResponseTime),
}

impl Balancer {
    /// Creates the scheduler for the given [`Algorithm`] on top of `registry`.
    pub fn new(algorithm: Algorithm, registry: Arc<Registry>) -> Self {
        match algorithm {
            Algorithm::RoundRobin => Self::RoundRobin(RoundRobin::new(registry)),
            Algorithm::AverageResponseTime => {
                Self::LeastAverageResponseTime(LeastAverageResponseTime::new(registry))
            }
        }
    }

    /// Convinience for accessing the underlying scheduler.
    fn scheduler(&self) -> &dyn Scheduler {
        match self {
            Self::RoundRobin(rr) => rr,
            Self::LeastAverageResponseTime(lart) => lart,
        }
    }

    /// Builds a [`HealthChecker`] that maintains the registry of this
    /// scheduler.
    pub fn health_checker(&self, interval: Duration, timeout: Duration) -> HealthChecker {
        HealthChecker::new(Arc::clone(self.registry()), interval, timeout)
    }

    /// Picks a backend and forwards `request` to it. The response is returned
    /// as soon as its head arrives, the body is streamed afterwards. There
    /// are no retries: if the chosen backend fails, the error is returned to
    /// the caller even if other backends are available, and the backend stays
    /// in the healthy prefix until the next sweep says otherwise.
    pub async fn schedule_request<B>(
        &self,
        request: Request<B>,
        timeout: Duration,
    ) -> Result<Response<Incoming>, Error>
    where
        B: Body + Send + 'static,
        B::Data: Send,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let backend = self.next_server()?;
        let request = request::into_outbound(request, backend.address());

        let start = Instant::now();
        let response = client::send(backend.address(), request, timeout).await?;
        let elapsed = start.elapsed();

        tracing::debug!(
            backend = backend.address(),
            status = %response.status(),
            ?elapsed,
            "request dispatched"
        );

        self.request_processed(&backend, elapsed);

        Ok(response)
    }
}

impl Scheduler for Balancer {
    fn next_server(&self) -> Result<Arc<Backend>, Error> {
        self.scheduler().next_server()
    }

    fn request_processed(&self, backend: &Backend, elapsed: Duration) {
        self.scheduler().request_processed(backend, elapsed)
    }

    fn registry(&self) -> &Arc<Registry> {
        self.scheduler().registry()
    }
}

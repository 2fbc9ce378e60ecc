//! The [`hyper`] library is based on services. Each time we accept a
//! connection we have to provide an instance of [`hyper::service::Service`]
//! to handle that connection. This module contains the [`LoadBalancer`]
//! service, which hands every request over to the configured scheduler.

mod proxy;

use std::{future::Future, net::SocketAddr, pin::Pin, sync::Arc, time::Duration};

use hyper::{body::Incoming, service::Service, Request};

use crate::{http::response::BoxBodyResponse, sched::Balancer};

/// Implements [`Service`] and handles incoming requests.
pub(crate) struct LoadBalancer {
    /// Scheduler shared by all connections.
    balancer: Arc<Balancer>,

    /// Timeout for requests sent to backends.
    timeout: Duration,

    /// Socket address of the connected client.
    client_addr: SocketAddr,
}

impl LoadBalancer {
    /// Creates a new [`LoadBalancer`] service.
    pub fn new(balancer: Arc<Balancer>, timeout: Duration, client_addr: SocketAddr) -> Self {
        Self {
            balancer,
            timeout,
            client_addr,
        }
    }
}

impl Service<Request<Incoming>> for LoadBalancer {
    type Response = BoxBodyResponse;

    type Error = hyper::Error;

    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn call(&self, request: Request<Incoming>) -> Self::Future {
        let balancer = Arc::clone(&self.balancer);
        let timeout = self.timeout;
        let client_addr = self.client_addr;

        Box::pin(async move { Ok(proxy::forward(request, &balancer, timeout, client_addr).await) })
    }
}

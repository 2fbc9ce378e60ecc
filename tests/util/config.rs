//! Configuration factories for integration tests. Load balancers always
//! listen on `127.0.0.1:0` so that tests can run in parallel.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use loadbalancer::{config::Algorithm, Config};

/// Config with the given backends and a health check interval long enough
/// that no sweep happens while the test runs.
pub fn with_backends(backends: &[SocketAddr], algorithm: Algorithm) -> Config {
    with_frequency(backends, algorithm, 60)
}

/// Same as [`with_backends`] but health checks run every `frequency`
/// seconds.
pub fn with_frequency(backends: &[SocketAddr], algorithm: Algorithm, frequency: u64) -> Config {
    Config {
        servers: backends.iter().copied().map(Into::into).collect(),
        port: 0,
        address: IpAddr::V4(Ipv4Addr::LOCALHOST),
        frequency,
        algorithm,
        timeout: 5,
        connections: 1024,
    }
}

pub fn round_robin(backends: &[SocketAddr]) -> Config {
    with_backends(backends, Algorithm::RoundRobin)
}

pub fn average_response_time(backends: &[SocketAddr]) -> Config {
    with_backends(backends, Algorithm::AverageResponseTime)
}

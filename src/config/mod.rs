//! Structs and enums derived from the config file using [`serde`].

mod deser;

use std::{
    fmt,
    net::{IpAddr, SocketAddr},
    path::Path,
    time::Duration,
};

use serde::Deserialize;
use tokio::sync::Semaphore;

use crate::{sched::MAX_INTERVAL, Error};

/// This struct represents the entire configuration file. For example:
///
/// ```toml
/// servers = ["http://127.0.0.1:8081", "http://127.0.0.1:8082"]
/// port = 8080
/// frequency = 10
/// algorithm = "roundrobin"
/// ```
///
/// Optional keys are `address` (listening IP, defaults to `0.0.0.0`),
/// `timeout` (seconds an outbound request or probe may take, defaults to 30)
/// and `connections` (max simultaneous client connections, defaults to 1024).
#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Backend servers, in scheduling order.
    #[serde(deserialize_with = "deser::backends")]
    pub servers: Vec<BackendAddress>,

    /// Listening port of the load balancer.
    pub port: u16,

    /// Listening IP address of the load balancer.
    #[serde(default = "default::address")]
    pub address: IpAddr,

    /// Health check interval in seconds.
    pub frequency: u64,

    /// Scheduling algorithm.
    pub algorithm: Algorithm,

    /// Timeout in seconds for requests sent to backends, including health
    /// checks.
    #[serde(default = "default::timeout")]
    pub timeout: u64,

    /// Max number of client connections served at the same time.
    #[serde(default = "default::connections")]
    pub connections: usize,
}

/// Address of a backend server, normalized to `host:port`. See the
/// [`TryFrom<String>`] implementation in [`deser`] for accepted formats.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendAddress(String);

/// Algorithm used for load balancing:
///
/// ```toml
/// algorithm = "roundrobin"          # RoundRobin
/// algorithm = "averageresponsetime" # AverageResponseTime
/// ```
///
/// Any other value is rejected when the configuration is loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    /// See [`crate::sched::RoundRobin`].
    RoundRobin,

    /// See [`crate::sched::LeastAverageResponseTime`].
    AverageResponseTime,
}

impl Config {
    /// Parses and validates a TOML configuration.
    pub fn from_toml(content: &str) -> Result<Self, Error> {
        let config: Self = toml::from_str(content).map_err(|err| Error::config(err.to_string()))?;
        config.validate()?;

        Ok(config)
    }

    /// Reads and validates the configuration file at `path`.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|err| {
            Error::config(format!("can't read config file {}: {err}", path.display()))
        })?;

        Self::from_toml(&content)
    }

    /// Checks the options that can't be expressed as types.
    pub fn validate(&self) -> Result<(), Error> {
        if self.servers.is_empty() {
            return Err(Error::config("at least one backend server is required"));
        }

        if self.frequency == 0 {
            return Err(Error::config("health check frequency must be at least 1 second"));
        }

        if self.frequency > MAX_INTERVAL.as_secs() {
            return Err(Error::config(format!(
                "health check frequency can't exceed {} seconds",
                MAX_INTERVAL.as_secs()
            )));
        }

        if self.timeout == 0 {
            return Err(Error::config("timeout must be at least 1 second"));
        }

        if self.connections == 0 {
            return Err(Error::config("connections must be at least 1"));
        }

        if self.connections > Semaphore::MAX_PERMITS {
            return Err(Error::config(format!(
                "connections can't exceed {}",
                Semaphore::MAX_PERMITS
            )));
        }

        Ok(())
    }

    /// Socket where the load balancer accepts connections.
    pub fn listen(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.port)
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.frequency)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}

impl BackendAddress {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<SocketAddr> for BackendAddress {
    fn from(address: SocketAddr) -> Self {
        Self(address.to_string())
    }
}

impl From<BackendAddress> for String {
    fn from(address: BackendAddress) -> Self {
        address.0
    }
}

impl fmt::Display for BackendAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

mod default {
    //! Default values for some configuration options.

    use std::net::{IpAddr, Ipv4Addr};

    pub fn address() -> IpAddr {
        IpAddr::V4(Ipv4Addr::UNSPECIFIED)
    }

    pub fn timeout() -> u64 {
        30
    }

    pub fn connections() -> usize {
        1024
    }
}

//! Custom deserialization for the load balancer configuration file.

use std::{fmt, str::FromStr};

use hyper::Uri;
use serde::{Deserialize, Deserializer};

use super::{Algorithm, BackendAddress};

/// See [`one_or_many`] for details.
#[derive(Deserialize, Debug)]
#[serde(untagged)]
enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> From<OneOrMany<T>> for Vec<T> {
    fn from(value: OneOrMany<T>) -> Self {
        match value {
            OneOrMany::One(item) => vec![item],
            OneOrMany::Many(items) => items,
        }
    }
}

/// Helper for deserializing any type `T` into [`Vec<T>`]. This allows a
/// single backend to be written without the array syntax:
///
/// ```toml
/// servers = "127.0.0.1:8081"
/// ```
///
/// Which is the same as:
///
/// ```toml
/// servers = ["127.0.0.1:8081"]
/// ```
pub(super) fn one_or_many<'de, T, D>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Ok(OneOrMany::deserialize(deserializer)?.into())
}

/// Default port of plain HTTP servers.
const HTTP_PORT: u16 = 80;

/// Backends can be written as a socket (`127.0.0.1:8081`), a host and port
/// (`localhost:8081`) or a URL with the `http` scheme and no path
/// (`http://localhost:8081`). Missing ports default to 80.
impl TryFrom<String> for BackendAddress {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let invalid = |reason: &str| format!("invalid backend address '{value}': {reason}");

        let uri: Uri = value.parse().map_err(|_| invalid("not a valid URI"))?;

        if let Some(scheme) = uri.scheme_str() {
            if scheme != "http" {
                return Err(invalid("only the http scheme is supported"));
            }
        }

        if !matches!(uri.path(), "" | "/") || uri.query().is_some() {
            return Err(invalid("paths are not allowed"));
        }

        let Some(authority) = uri.authority() else {
            return Err(invalid("missing host"));
        };

        if authority.as_str().contains('@') {
            return Err(invalid("credentials are not allowed"));
        }

        let port = authority.port_u16().unwrap_or(HTTP_PORT);

        Ok(Self(format!("{}:{port}", authority.host())))
    }
}

/// Deserializes the `servers` list. Addresses are read as strings first and
/// validated afterwards, otherwise the untagged [`OneOrMany`] would hide the
/// reason why an address was rejected.
pub(super) fn backends<'de, D>(deserializer: D) -> Result<Vec<BackendAddress>, D::Error>
where
    D: Deserializer<'de>,
{
    one_or_many::<String, D>(deserializer)?
        .into_iter()
        .map(BackendAddress::try_from)
        .collect::<Result<_, _>>()
        .map_err(serde::de::Error::custom)
}

/// Names accepted in the `algorithm` field.
impl Algorithm {
    pub const ROUND_ROBIN: &'static str = "roundrobin";
    pub const AVERAGE_RESPONSE_TIME: &'static str = "averageresponsetime";
}

impl FromStr for Algorithm {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            Self::ROUND_ROBIN => Ok(Self::RoundRobin),
            Self::AVERAGE_RESPONSE_TIME => Ok(Self::AverageResponseTime),
            unknown => Err(format!(
                "unknown scheduling algorithm '{unknown}', expected '{}' or '{}'",
                Self::ROUND_ROBIN,
                Self::AVERAGE_RESPONSE_TIME
            )),
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::RoundRobin => Self::ROUND_ROBIN,
            Self::AverageResponseTime => Self::AVERAGE_RESPONSE_TIME,
        })
    }
}

impl<'de> Deserialize<'de> for Algorithm {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        String::deserialize(deserializer)?
            .parse()
            .map_err(serde::de::Error::custom)
    }
}

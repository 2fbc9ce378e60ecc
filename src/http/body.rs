//! Utilities for creating common request and response bodies.

use bytes::Bytes;
use http_body_util::{combinators::BoxBody, BodyExt, Empty, Full};

/// Body type used for every response this proxy writes back to clients,
/// either relayed from a backend or generated locally.
pub(crate) type ProxyBody = BoxBody<Bytes, hyper::Error>;

/// Single chunk body.
pub(crate) fn full<T: Into<Bytes>>(chunk: T) -> ProxyBody {
    Full::new(chunk.into())
        .map_err(|never| match never {})
        .boxed()
}

/// Body with no content, used for health probes.
pub(crate) fn empty() -> ProxyBody {
    Empty::<Bytes>::new()
        .map_err(|never| match never {})
        .boxed()
}

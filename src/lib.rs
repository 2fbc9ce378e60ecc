//! HTTP reverse proxy and load balancer. Incoming requests are forwarded to
//! one of several backend servers chosen by a scheduling algorithm, while a
//! background task periodically checks the health of every backend and keeps
//! failing ones out of rotation.

pub mod config;
pub mod sched;

mod error;
mod http;
mod server;
mod service;
mod sync;

pub use config::Config;
pub use error::Error;
pub use server::{Server, ShutdownState, State};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

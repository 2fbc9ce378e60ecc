//! Synchronization primitives shared between the server tasks.

pub(crate) mod notify;

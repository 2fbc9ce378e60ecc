//! Some nice utilities for writing automated tests for load balancers and
//! backend servers running on the same tokio runtime.

#![allow(dead_code)]

pub mod config;
pub mod http;
pub mod service;
pub mod tcp;

//! Periodic health checks. On every tick the [`HealthChecker`] probes all the
//! registered backends in parallel, waits for every probe to finish and then
//! applies the results to the [`Registry`] in one go:
//!
//! ```text
//!              tick
//!               |
//!     +---------+---------+
//!     |         |         |
//!     v         v         v
//! +-------+ +-------+ +-------+
//! | probe | | probe | | probe |   GET /healthcheck
//! +-------+ +-------+ +-------+
//!     |         |         |
//!     +---------+---------+
//!               |
//!               v
//!     +-------------------+
//!     | apply partition   |   write lock held only here
//!     +-------------------+
//! ```
//!
//! Backends that failed a probe are still probed on the next tick, so a
//! recovered backend receives traffic again as soon as one probe succeeds.
//! Failed client requests don't affect health, only probes do.

use std::{collections::HashMap, sync::Arc, time::Duration};

use hyper::StatusCode;
use tokio::{
    task::JoinSet,
    time::{self, Instant, MissedTickBehavior},
};

use super::registry::Registry;
use crate::{
    http::{body, client, request},
    sync::notify::Subscription,
};

/// Longest period between sweeps. Tokio timers can't be scheduled much further
/// than this into the future.
pub const MAX_INTERVAL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Runs sweeps over a [`Registry`] on a fixed period.
#[derive(Debug, Clone)]
pub struct HealthChecker {
    registry: Arc<Registry>,

    /// Period of the sweep timer.
    interval: Duration,

    /// Max time a single probe can take.
    timeout: Duration,
}

impl HealthChecker {
    /// Periods longer than [`MAX_INTERVAL`] are capped.
    pub fn new(registry: Arc<Registry>, interval: Duration, timeout: Duration) -> Self {
        Self {
            registry,
            interval: interval.min(MAX_INTERVAL),
            timeout,
        }
    }

    /// Probes every backend concurrently and rewrites the healthy prefix of
    /// the registry. Returns the number of healthy backends after the sweep.
    pub async fn sweep(&self) -> usize {
        let mut probes = JoinSet::new();

        for backend in self.registry.backends() {
            let backend = Arc::clone(backend);
            let timeout = self.timeout;
            probes.spawn(async move { (backend.slot(), probe(backend.address(), timeout).await) });
        }

        let mut results = HashMap::with_capacity(self.registry.len());

        while let Some(joined) = probes.join_next().await {
            match joined {
                Ok((slot, healthy)) => {
                    results.insert(slot, healthy);
                }
                // The backend keeps its previous status.
                Err(err) => tracing::error!("health probe task failed: {err}"),
            }
        }

        let healthy = self.registry.apply_health_partition(&results);

        tracing::debug!(
            healthy,
            total = self.registry.len(),
            "health check sweep complete"
        );

        healthy
    }

    /// Sweeps forever, once per interval, until a notification is received
    /// on `subscription`. Sweeps never overlap: if one takes longer than the
    /// interval the next one is delayed instead of started concurrently. The
    /// first sweep happens one interval after calling this, backends are
    /// assumed to be healthy until then.
    pub(crate) async fn run(self, mut subscription: Subscription) {
        let mut ticker = time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(interval = ?self.interval, "health checker started");

        loop {
            tokio::select! {
                _ = subscription.notified() => {
                    tracing::info!("health checker received shutdown signal");
                    break;
                }

                _ = async {
                    ticker.tick().await;
                    self.sweep().await;
                } => {}
            }
        }

        subscription.acknowledge_notification().await;
    }
}

/// Sends `GET /healthcheck` to `address`. The backend is healthy only if it
/// answers with `200 OK` within `timeout`.
pub async fn probe(address: &str, timeout: Duration) -> bool {
    match client::send(address, request::health_check(address, body::empty()), timeout).await {
        Ok(response) if response.status() == StatusCode::OK => {
            tracing::debug!(backend = address, "health check passed");
            true
        }
        Ok(response) => {
            tracing::debug!(
                backend = address,
                status = %response.status(),
                "health check failed"
            );
            false
        }
        Err(err) => {
            tracing::debug!(backend = address, "health check failed: {err}");
            false
        }
    }
}

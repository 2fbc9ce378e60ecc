//! Shared set of backend servers.
//!
//! The registry is an arena of [`Backend`] records plus an ordering of those
//! records. The ordering is partitioned so that the first `healthy` entries
//! are exactly the backends that passed the last health check:
//!
//! ```text
//!  order:   [ 2, 0, 3 | 1, 4 ]
//!             healthy   unhealthy
//!             prefix
//! ```
//!
//! Schedulers only ever pick from the healthy prefix. The health checker is
//! the only writer, it builds a brand new ordering after each sweep and swaps
//! it in behind the write lock, so readers observe either the old partition
//! or the new one, never a mix of both. Records themselves never move, only
//! their position in the ordering does, which means a scheduler can keep a
//! reference to a [`Backend`] across a sweep and still update its latency.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
        Mutex,
        MutexGuard,
        PoisonError,
        RwLock,
        RwLockReadGuard,
    },
    time::Duration,
};

use crate::Error;

/// One upstream server.
#[derive(Debug)]
pub struct Backend {
    /// Position of this record in the registry arena. Never changes.
    slot: usize,

    /// `host:port` of the server.
    address: String,

    /// Outcome of the last health check. Written only by
    /// [`Registry::apply_health_partition`] while holding the write lock.
    healthy: AtomicBool,

    /// Exponentially smoothed round-trip time of successful requests. Each
    /// backend has its own lock so that requests finishing on different
    /// backends never contend with each other or with the registry lock.
    average_latency: Mutex<Duration>,
}

impl Backend {
    fn new(slot: usize, address: String) -> Self {
        Self {
            slot,
            address,
            healthy: AtomicBool::new(true),
            average_latency: Mutex::new(Duration::ZERO),
        }
    }

    /// Stable identifier of this backend inside its [`Registry`].
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// `host:port` where this backend listens.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Health flag as of the last sweep.
    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Acquire)
    }

    /// Current smoothed response time. Zero until the first successful
    /// request completes.
    pub fn average_latency(&self) -> Duration {
        *self.latency_lock()
    }

    /// Applies one smoothing step, `new = (old + elapsed) / 2`, and returns
    /// the new average.
    pub fn record_latency(&self, elapsed: Duration) -> Duration {
        let mut average = self.latency_lock();
        *average = (*average + elapsed) / 2;
        *average
    }

    #[cfg(test)]
    pub(crate) fn set_average_latency(&self, average: Duration) {
        *self.latency_lock() = average;
    }

    fn latency_lock(&self) -> MutexGuard<'_, Duration> {
        // A Duration can't be left half written, so a poisoned lock still
        // holds a valid value.
        self.average_latency
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Ordering of the arena. Replaced as a whole after each sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Partition {
    /// Arena slots, healthy ones first.
    order: Vec<usize>,

    /// Length of the healthy prefix of `order`.
    healthy: usize,
}

/// Fixed set of backends built at startup. See the module docs.
#[derive(Debug)]
pub struct Registry {
    backends: Vec<Arc<Backend>>,
    partition: RwLock<Partition>,
}

impl Registry {
    /// Creates a registry where every backend is assumed to be healthy until
    /// the first sweep says otherwise. Initial order is the given order.
    pub fn new<I, S>(addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let backends: Vec<_> = addresses
            .into_iter()
            .enumerate()
            .map(|(slot, address)| Arc::new(Backend::new(slot, address.into())))
            .collect();

        let partition = Partition {
            order: (0..backends.len()).collect(),
            healthy: backends.len(),
        };

        Self {
            backends,
            partition: RwLock::new(partition),
        }
    }

    /// Number of registered backends, healthy or not.
    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    /// All the records in arena (configuration) order. Health checks probe
    /// every one of them, not only the healthy prefix.
    pub fn backends(&self) -> &[Arc<Backend>] {
        &self.backends
    }

    /// Acquires read protection over the current partition. While the
    /// returned [`HealthyPrefix`] is alive no sweep can be applied, so its
    /// length and contents are always consistent with each other.
    pub fn healthy(&self) -> HealthyPrefix<'_> {
        HealthyPrefix {
            backends: &self.backends,
            partition: self.partition.read().unwrap_or_else(PoisonError::into_inner),
        }
    }

    /// Current number of healthy backends.
    pub fn snapshot_healthy_count(&self) -> usize {
        self.healthy().len()
    }

    /// Returns the backend at `index` of the healthy prefix. The prefix might
    /// have shrunk since the caller computed `index`, in which case
    /// [`Error::IndexOutOfRange`] is returned.
    pub fn select(&self, index: usize) -> Result<Arc<Backend>, Error> {
        self.healthy().get(index).cloned()
    }

    /// Full ordering, healthy prefix first.
    #[cfg(test)]
    pub(crate) fn ordered(&self) -> Vec<Arc<Backend>> {
        self.healthy().all().cloned().collect()
    }

    /// Rewrites the partition with the outcome of a sweep. `results` maps
    /// arena slots to their new health, slots missing from the map keep
    /// their current status. The partition is stable: backends with the same
    /// status keep their relative order. Returns the new healthy count.
    pub fn apply_health_partition(&self, results: &HashMap<usize, bool>) -> usize {
        let mut partition = self.partition.write().unwrap_or_else(PoisonError::into_inner);

        let status = |slot: usize| {
            results
                .get(&slot)
                .copied()
                .unwrap_or_else(|| self.backends[slot].is_healthy())
        };

        let (healthy, unhealthy): (Vec<usize>, Vec<usize>) =
            partition.order.iter().partition(|slot| status(**slot));

        for slot in &healthy {
            let backend = &self.backends[*slot];
            if !backend.healthy.swap(true, Ordering::AcqRel) {
                tracing::info!(backend = backend.address(), "backend is healthy again");
            }
        }

        for slot in &unhealthy {
            let backend = &self.backends[*slot];
            if backend.healthy.swap(false, Ordering::AcqRel) {
                tracing::warn!(backend = backend.address(), "backend found to be unhealthy");
            }
        }

        let healthy_count = healthy.len();
        let mut order = healthy;
        order.extend(unhealthy);

        *partition = Partition {
            order,
            healthy: healthy_count,
        };

        healthy_count
    }
}

/// Read-locked view of the healthy prefix. See [`Registry::healthy`].
pub struct HealthyPrefix<'a> {
    backends: &'a [Arc<Backend>],
    partition: RwLockReadGuard<'a, Partition>,
}

impl<'a> HealthyPrefix<'a> {
    /// Number of healthy backends.
    pub fn len(&self) -> usize {
        self.partition.healthy
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Backend at position `index` of the healthy prefix.
    pub fn get(&self, index: usize) -> Result<&Arc<Backend>, Error> {
        if index >= self.len() {
            return Err(Error::IndexOutOfRange {
                index,
                healthy: self.len(),
            });
        }

        Ok(&self.backends[self.partition.order[index]])
    }

    /// Healthy backends in scheduling order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Backend>> + '_ {
        self.partition.order[..self.len()]
            .iter()
            .map(|slot| &self.backends[*slot])
    }

    #[cfg(test)]
    fn all(&self) -> impl Iterator<Item = &Arc<Backend>> + '_ {
        self.partition.order.iter().map(|slot| &self.backends[*slot])
    }
}

use std::{sync::Arc, time::Duration};

use super::{
    registry::{Backend, Registry},
    Scheduler,
};
use crate::Error;

/// Least Average Response Time. Each request goes to the healthy backend
/// whose smoothed round-trip time is the lowest. The average of a backend is
/// updated when a request sent to it completes successfully:
///
/// ```text
/// average = (average + elapsed) / 2
/// ```
///
/// Ties are won by the backend that comes first in the healthy prefix. Since
/// every backend starts with an average of zero, the first backend receives
/// all the traffic until it records a non-zero response time.
#[derive(Debug)]
pub struct LeastAverageResponseTime {
    registry: Arc<Registry>,
}

impl LeastAverageResponseTime {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }
}

impl Scheduler for LeastAverageResponseTime {
    fn next_server(&self) -> Result<Arc<Backend>, Error> {
        let healthy = self.registry.healthy();

        // Each latency lock is acquired and released inside `average_latency`,
        // never two at once.
        let mut fastest: Option<(&Arc<Backend>, Duration)> = None;

        for backend in healthy.iter() {
            let latency = backend.average_latency();
            if fastest.map_or(true, |(_, min)| latency < min) {
                fastest = Some((backend, latency));
            }
        }

        fastest
            .map(|(backend, _)| Arc::clone(backend))
            .ok_or(Error::NoHealthyBackends)
    }

    fn request_processed(&self, backend: &Backend, elapsed: Duration) {
        let average = backend.record_latency(elapsed);
        tracing::debug!(
            backend = backend.address(),
            ?elapsed,
            ?average,
            "updated average response time"
        );
    }

    fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }
}

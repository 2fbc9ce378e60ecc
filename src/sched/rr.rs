use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use super::{
    registry::{Backend, Registry},
    Scheduler,
};
use crate::Error;

/// Classical Round Robin (RR) algorithm. If we have 3 healthy backend servers
/// A, B and C and receive 6 requests, this is how RR schedules them:
/// `[A, B, C, A, B, C]`.
///
/// The cycle runs over the healthy prefix of the [`Registry`] as it exists
/// when each request is scheduled. When a sweep changes the prefix the cycle
/// simply continues over the new one, no attempt is made to compensate
/// backends that missed their turn.
#[derive(Debug)]
pub struct RoundRobin {
    registry: Arc<Registry>,

    /// Total number of requests scheduled so far. Lock free and shared by all
    /// the workers, it's never reset and wraps around on overflow.
    counter: AtomicUsize,
}

impl RoundRobin {
    /// Creates and initializes a new [`RoundRobin`] scheduler. The first
    /// request goes to the backend at index 0.
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            registry,
            counter: AtomicUsize::new(0),
        }
    }
}

impl Scheduler for RoundRobin {
    fn next_server(&self) -> Result<Arc<Backend>, Error> {
        let healthy = self.registry.snapshot_healthy_count();

        if healthy == 0 {
            return Err(Error::NoHealthyBackends);
        }

        let index = self.counter.fetch_add(1, Ordering::Relaxed) % healthy;

        // A sweep may shrink the prefix before this read, in which case the
        // request fails with IndexOutOfRange.
        self.registry.select(index)
    }

    fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn round_robin(n: usize) -> RoundRobin {
        RoundRobin::new(Arc::new(Registry::new(
            (0..n).map(|i| format!("127.0.0.1:{}", 8080 + i)),
        )))
    }

    fn next_slot(rr: &RoundRobin) -> usize {
        rr.next_server().unwrap().slot()
    }

    #[test]
    fn round_robin_cycles_in_config_order() {
        let rr = round_robin(3);

        let scheduled: Vec<_> = (0..7).map(|_| next_slot(&rr)).collect();

        assert_eq!(scheduled, [0, 1, 2, 0, 1, 2, 0]);
    }

    #[test]
    fn round_robin_distributes_evenly() {
        let (n, m) = (4, 103);
        let rr = round_robin(n);
        let mut visits = vec![0; n];

        for _ in 0..m {
            visits[next_slot(&rr)] += 1;
        }

        for count in visits {
            assert!(count == m / n || count == m / n + 1, "{count} visits");
        }
    }

    #[test]
    fn round_robin_skips_unhealthy_backends() {
        let rr = round_robin(3);
        rr.registry.apply_health_partition(&HashMap::from([(1, false)]));

        let scheduled: Vec<_> = (0..4).map(|_| next_slot(&rr)).collect();

        assert_eq!(scheduled, [0, 2, 0, 2]);
    }

    #[test]
    fn round_robin_adapts_to_recovered_backends() {
        let rr = round_robin(3);
        rr.registry.apply_health_partition(&HashMap::from([(0, false)]));

        assert_eq!(next_slot(&rr), 1);
        assert_eq!(next_slot(&rr), 2);

        // Counter is at 2, the recovered backend is appended to the prefix.
        rr.registry.apply_health_partition(&HashMap::from([(0, true)]));

        assert_eq!(next_slot(&rr), 0);
        assert_eq!(next_slot(&rr), 1);
    }

    #[test]
    fn round_robin_fails_without_healthy_backends() {
        let rr = round_robin(2);
        rr.registry
            .apply_health_partition(&HashMap::from([(0, false), (1, false)]));

        assert!(matches!(rr.next_server(), Err(Error::NoHealthyBackends)));
        assert_eq!(rr.counter.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn round_robin_counter_wraps_around() {
        let rr = round_robin(3);
        rr.counter.store(usize::MAX, Ordering::Relaxed);

        assert_eq!(next_slot(&rr), usize::MAX % 3);
        assert_eq!(next_slot(&rr), 0);
    }

    #[test]
    fn round_robin_is_fair_across_threads() {
        let rr = Arc::new(round_robin(3));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let rr = rr.clone();
                std::thread::spawn(move || (0..300).map(|_| next_slot(&rr)).collect::<Vec<_>>())
            })
            .collect();

        let mut visits = [0; 3];
        for handle in handles {
            for slot in handle.join().unwrap() {
                visits[slot] += 1;
            }
        }

        assert_eq!(visits, [400, 400, 400]);
    }
}

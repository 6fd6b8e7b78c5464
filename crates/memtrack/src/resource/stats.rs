use hdrhistogram::Histogram;
use serde::Serialize;
use std::sync::{Mutex, PoisonError};

/// Counters for a snapshot of [`ResourceStats`].
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub allocations: u64,
    pub deallocations: u64,
    pub bytes_allocated: u64,
    pub bytes_freed: u64,
    pub live_bytes: u64,
    pub peak_live_bytes: u64,
}

#[derive(Debug)]
struct StatsInner {
    counters: StatsSnapshot,
    sizes: Histogram<u64>,
}

/// Aggregated traffic through a [`ResourceTracker`](super::ResourceTracker).
///
/// Request sizes are kept in a histogram so reports can show percentiles.
#[derive(Debug)]
pub struct ResourceStats {
    inner: Mutex<StatsInner>,
}

impl ResourceStats {
    const LOW_BYTES: u64 = 1;
    const HIGH_BYTES: u64 = 1_000_000_000; // 1GB
    const SIGFIGS: u8 = 3;

    pub fn new() -> Self {
        let sizes =
            Histogram::<u64>::new_with_bounds(Self::LOW_BYTES, Self::HIGH_BYTES, Self::SIGFIGS)
                .expect("size histogram init");

        Self {
            inner: Mutex::new(StatsInner {
                counters: StatsSnapshot::default(),
                sizes,
            }),
        }
    }

    pub fn record_allocation(&self, bytes: usize) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let bytes = bytes as u64;

        let counters = &mut inner.counters;
        counters.allocations += 1;
        counters.bytes_allocated += bytes;
        counters.live_bytes += bytes;
        counters.peak_live_bytes = counters.peak_live_bytes.max(counters.live_bytes);

        if bytes > 0 {
            let clamped = bytes.clamp(Self::LOW_BYTES, Self::HIGH_BYTES);
            let _ = inner.sizes.record(clamped);
        }
    }

    pub fn record_deallocation(&self, bytes: usize) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let bytes = bytes as u64;

        inner.counters.deallocations += 1;
        inner.counters.bytes_freed += bytes;
        inner.counters.live_bytes = inner.counters.live_bytes.saturating_sub(bytes);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .counters
    }

    /// Request size at percentile `p` (0-100), or 0 before any allocation.
    pub fn size_percentile(&self, p: f64) -> u64 {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if inner.sizes.is_empty() {
            return 0;
        }
        inner.sizes.value_at_percentile(p.clamp(0.0, 100.0))
    }
}

impl Default for ResourceStats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_and_peak() {
        let stats = ResourceStats::new();
        stats.record_allocation(100);
        stats.record_allocation(300);
        stats.record_deallocation(100);
        stats.record_allocation(50);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.allocations, 3);
        assert_eq!(snapshot.deallocations, 1);
        assert_eq!(snapshot.bytes_allocated, 450);
        assert_eq!(snapshot.bytes_freed, 100);
        assert_eq!(snapshot.live_bytes, 350);
        assert_eq!(snapshot.peak_live_bytes, 400);
    }

    #[test]
    fn test_size_percentiles() {
        let stats = ResourceStats::new();
        assert_eq!(stats.size_percentile(50.0), 0);

        for _ in 0..99 {
            stats.record_allocation(21);
        }
        stats.record_allocation(4096);

        assert_eq!(stats.size_percentile(50.0), 21);
        assert!(stats.size_percentile(100.0) >= 4096);
    }
}

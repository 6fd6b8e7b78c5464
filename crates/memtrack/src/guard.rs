use crate::sink::{LineSink, StderrSink};
use crate::tracker::{AllocationTracker, Snapshot};
use crate::TRACKER;

#[inline]
pub(crate) fn is_trace_env_enabled() -> bool {
    std::env::var("MEMTRACK_TRACE")
        .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
        .unwrap_or(false)
}

/// Resets a tracker on creation and prints its status when dropped.
///
/// This is what `#[memtrack::main]` expands to. Tracing is switched on when
/// `MEMTRACK_TRACE` is `1` or `true`, or when built with [`traced`](Self::traced).
pub struct StatusGuard<S: LineSink + 'static = StderrSink> {
    tracker: &'static AllocationTracker<S>,
}

impl<S: LineSink + 'static> StatusGuard<S> {
    pub fn new(tracker: &'static AllocationTracker<S>) -> Self {
        let trace = is_trace_env_enabled();
        Self::start(tracker, trace)
    }

    pub fn traced(tracker: &'static AllocationTracker<S>) -> Self {
        Self::start(tracker, true)
    }

    fn start(tracker: &'static AllocationTracker<S>, trace: bool) -> Self {
        tracker.reset();
        tracker.trace(trace);
        Self { tracker }
    }
}

impl<S: LineSink + 'static> Drop for StatusGuard<S> {
    fn drop(&mut self) {
        self.tracker.trace(false);
        self.tracker.status();
    }
}

/// Reports the allocations made between its creation and drop.
///
/// The counters are process-wide, so allocations made by other threads in the
/// same window are included.
pub struct MeasureGuard<S: LineSink + 'static = StderrSink> {
    name: &'static str,
    tracker: &'static AllocationTracker<S>,
    start: Snapshot,
}

impl MeasureGuard<StderrSink> {
    #[inline]
    pub fn new(name: &'static str) -> Self {
        Self::with_tracker(name, &TRACKER)
    }
}

impl<S: LineSink + 'static> MeasureGuard<S> {
    #[inline]
    pub fn with_tracker(name: &'static str, tracker: &'static AllocationTracker<S>) -> Self {
        Self {
            name,
            tracker,
            start: tracker.snapshot(),
        }
    }

    pub fn elapsed(&self) -> Snapshot {
        self.tracker.snapshot().since(&self.start)
    }
}

impl<S: LineSink + 'static> Drop for MeasureGuard<S> {
    #[inline]
    fn drop(&mut self) {
        let delta = self.elapsed();
        self.tracker.write_line(format_args!(
            "{}: {} allocations for {} bytes",
            self.name, delta.allocations, delta.total_bytes
        ));
    }
}

use crate::error::AllocError;
use crate::sink::{LineBuf, LineSink, StderrSink};
use crate::{dangling, layout_for};
use serde::Serialize;
use std::alloc::{GlobalAlloc, System};
use std::fmt::{self, Write};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Alignments at or below this are reported as default-aligned when a
/// tracker is driven through the global allocator.
pub const DEFAULT_ALIGN: usize = 2 * std::mem::size_of::<usize>();

/// Point-in-time copy of a tracker's counters.
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct Snapshot {
    /// Allocation calls since the last reset.
    pub allocations: usize,
    /// Sum of requested allocation sizes since the last reset.
    pub total_bytes: usize,
    pub deallocations: usize,
    pub freed_bytes: usize,
}

impl Snapshot {
    pub fn live_bytes(&self) -> usize {
        self.total_bytes.saturating_sub(self.freed_bytes)
    }

    /// Counter deltas between `earlier` and `self`.
    pub fn since(&self, earlier: &Snapshot) -> Snapshot {
        Snapshot {
            allocations: self.allocations.saturating_sub(earlier.allocations),
            total_bytes: self.total_bytes.saturating_sub(earlier.total_bytes),
            deallocations: self.deallocations.saturating_sub(earlier.deallocations),
            freed_bytes: self.freed_bytes.saturating_sub(earlier.freed_bytes),
        }
    }
}

/// Counts, sums and optionally traces allocations routed through it.
///
/// The counters are relaxed atomics: they are statistics, not synchronization,
/// so a tracker can live in a `static` and be shared by every thread. Use it
/// directly through [`allocate`](Self::allocate), or install it process-wide
/// with [`TrackingAllocator`](crate::TrackingAllocator).
///
/// # Examples
///
/// ```rust
/// use memtrack::AllocationTracker;
///
/// let tracker = AllocationTracker::new();
/// tracker.reset();
/// let a = tracker.allocate(64, 0, "test").unwrap();
/// let b = tracker.allocate(128, 16, "test").unwrap();
///
/// let snapshot = tracker.snapshot();
/// assert_eq!(snapshot.allocations, 2);
/// assert_eq!(snapshot.total_bytes, 192);
///
/// unsafe {
///     tracker.deallocate(a, 64, 0);
///     tracker.deallocate(b, 128, 16);
/// }
/// ```
pub struct AllocationTracker<S: LineSink = StderrSink> {
    allocations: AtomicUsize,
    total_bytes: AtomicUsize,
    deallocations: AtomicUsize,
    freed_bytes: AtomicUsize,
    tracing: AtomicBool,
    sink: S,
}

impl AllocationTracker<StderrSink> {
    pub const fn new() -> Self {
        Self::with_sink(StderrSink)
    }
}

impl Default for AllocationTracker<StderrSink> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: LineSink> AllocationTracker<S> {
    pub const fn with_sink(sink: S) -> Self {
        Self {
            allocations: AtomicUsize::new(0),
            total_bytes: AtomicUsize::new(0),
            deallocations: AtomicUsize::new(0),
            freed_bytes: AtomicUsize::new(0),
            tracing: AtomicBool::new(false),
            sink,
        }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn reset(&self) {
        self.allocations.store(0, Ordering::Relaxed);
        self.total_bytes.store(0, Ordering::Relaxed);
        self.deallocations.store(0, Ordering::Relaxed);
        self.freed_bytes.store(0, Ordering::Relaxed);
    }

    pub fn trace(&self, enabled: bool) {
        self.tracing.store(enabled, Ordering::Relaxed);
    }

    pub fn is_tracing(&self) -> bool {
        self.tracing.load(Ordering::Relaxed)
    }

    /// Allocates `size` bytes from the system allocator and records the call.
    ///
    /// `align == 0` requests the allocator's default alignment; any other value
    /// must be a power of two. The call is counted before memory is requested,
    /// so a failed allocation still shows up in the totals.
    pub fn allocate(&self, size: usize, align: usize, call: &str) -> Result<NonNull<u8>, AllocError> {
        let layout = layout_for(size, align)?;
        let (index, total) = self.count_allocation(size);

        let ptr = if size == 0 {
            Some(dangling(layout))
        } else {
            NonNull::new(unsafe { System.alloc(layout) })
        };

        let addr = ptr.map_or(std::ptr::null(), |p| p.as_ptr().cast_const());
        self.log_allocation(index, call, size, align, addr, total);

        ptr.ok_or(AllocError::exhausted(layout))
    }

    /// Returns a block obtained from [`allocate`](Self::allocate).
    ///
    /// # Safety
    ///
    /// `ptr` must come from `allocate` on this tracker with the same `size` and
    /// `align`, and must not be used afterwards.
    pub unsafe fn deallocate(&self, ptr: NonNull<u8>, size: usize, align: usize) {
        let Ok(layout) = layout_for(size, align) else {
            return;
        };
        self.count_deallocation(size);

        if size != 0 {
            unsafe { System.dealloc(ptr.as_ptr(), layout) }
        }
    }

    pub fn status(&self) {
        let snapshot = self.snapshot();
        self.write_line(format_args!(
            "{} allocations for {} bytes",
            snapshot.allocations, snapshot.total_bytes
        ));
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            allocations: self.allocations.load(Ordering::Relaxed),
            total_bytes: self.total_bytes.load(Ordering::Relaxed),
            deallocations: self.deallocations.load(Ordering::Relaxed),
            freed_bytes: self.freed_bytes.load(Ordering::Relaxed),
        }
    }

    /// Returns the 1-based index of this allocation and the new byte total.
    #[inline]
    pub(crate) fn count_allocation(&self, size: usize) -> (usize, usize) {
        let index = self.allocations.fetch_add(1, Ordering::Relaxed) + 1;
        let total = self.total_bytes.fetch_add(size, Ordering::Relaxed) + size;
        (index, total)
    }

    #[inline]
    pub(crate) fn count_deallocation(&self, size: usize) {
        self.deallocations.fetch_add(1, Ordering::Relaxed);
        self.freed_bytes.fetch_add(size, Ordering::Relaxed);
    }

    pub(crate) fn log_allocation(
        &self,
        index: usize,
        call: &str,
        size: usize,
        align: usize,
        addr: *const u8,
        total: usize,
    ) {
        if !self.is_tracing() {
            return;
        }

        let mut line = LineBuf::new();
        let _ = write!(line, "#{index} {call} ({size} bytes, ");
        if align > 0 {
            let _ = write!(line, "{align}-byte aligned");
        } else {
            let _ = line.write_str("default-aligned");
        }
        let _ = write!(line, ") => {addr:p} (total: {total} bytes)");
        self.sink.write_line(line.as_str());
    }

    pub(crate) fn write_line(&self, args: fmt::Arguments<'_>) {
        let mut line = LineBuf::new();
        let _ = line.write_fmt(args);
        self.sink.write_line(line.as_str());
    }
}

// Reentrancy handling follows https://github.com/fornwall/allocation-counter
//
// Licensed under either of:
// - Apache License, Version 2.0.
// - MIT/X Consortium License
//
// Modifications:
// - Counting moved into AllocationTracker, with optional per-call tracing
// - Generic over the wrapped allocator and the tracker's sink

use crate::sink::{LineSink, StderrSink};
use crate::tracker::{AllocationTracker, DEFAULT_ALIGN};
use std::alloc::{GlobalAlloc, Layout, System};
use std::cell::Cell;

thread_local! {
    /// Set while a tracker event is being recorded on this thread.
    static IN_TRACKER: Cell<bool> = const { Cell::new(false) };
}

/// Global allocator adapter that reports every heap operation to a tracker.
///
/// Nothing is intercepted until a program opts in:
///
/// ```rust,no_run
/// use memtrack::TrackingAllocator;
///
/// #[global_allocator]
/// static GLOBAL: TrackingAllocator = TrackingAllocator::new(&memtrack::TRACKER);
///
/// fn main() {
///     memtrack::TRACKER.reset();
///     let names = vec![String::from("a"), String::from("b")];
///     memtrack::TRACKER.status();
///     drop(names);
/// }
/// ```
///
/// Allocations made while an event is being recorded (for example by a sink
/// that allocates) go straight to the inner allocator and are not counted.
pub struct TrackingAllocator<S: LineSink + 'static = StderrSink, A: GlobalAlloc = System> {
    tracker: &'static AllocationTracker<S>,
    inner: A,
}

impl<S: LineSink + 'static> TrackingAllocator<S, System> {
    pub const fn new(tracker: &'static AllocationTracker<S>) -> Self {
        Self {
            tracker,
            inner: System,
        }
    }
}

impl<S: LineSink + 'static, A: GlobalAlloc> TrackingAllocator<S, A> {
    pub const fn with_allocator(tracker: &'static AllocationTracker<S>, inner: A) -> Self {
        Self { tracker, inner }
    }

    pub fn tracker(&self) -> &'static AllocationTracker<S> {
        self.tracker
    }

    fn record<F>(&self, layout: Layout, call: &str, aligned_call: &str, f: F) -> *mut u8
    where
        F: FnOnce() -> *mut u8,
    {
        let (index, total) = self.tracker.count_allocation(layout.size());
        let ptr = f();

        let (call, align) = if layout.align() > DEFAULT_ALIGN {
            (aligned_call, layout.align())
        } else {
            (call, 0)
        };
        self.tracker
            .log_allocation(index, call, layout.size(), align, ptr, total);
        ptr
    }
}

#[inline]
fn is_reentrant() -> bool {
    IN_TRACKER.try_with(Cell::get).unwrap_or(true)
}

fn enter_tracker<T>(f: impl FnOnce() -> T) -> T {
    let previous = IN_TRACKER.replace(true);
    let output = f();
    IN_TRACKER.set(previous);
    output
}

unsafe impl<S: LineSink + 'static, A: GlobalAlloc> GlobalAlloc for TrackingAllocator<S, A> {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        if is_reentrant() {
            return unsafe { self.inner.alloc(layout) };
        }

        enter_tracker(|| {
            self.record(layout, "alloc", "alloc aligned", || unsafe {
                self.inner.alloc(layout)
            })
        })
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        if is_reentrant() {
            return unsafe { self.inner.alloc_zeroed(layout) };
        }

        enter_tracker(|| {
            self.record(layout, "alloc_zeroed", "alloc_zeroed aligned", || unsafe {
                self.inner.alloc_zeroed(layout)
            })
        })
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        if !is_reentrant() {
            self.tracker.count_deallocation(layout.size());
        }

        unsafe { self.inner.dealloc(ptr, layout) }
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        if is_reentrant() {
            return unsafe { self.inner.realloc(ptr, layout, new_size) };
        }

        enter_tracker(|| {
            // new_size was validated by the caller against layout.align()
            let new_layout = unsafe { Layout::from_size_align_unchecked(new_size, layout.align()) };
            let new_ptr = self.record(new_layout, "realloc", "realloc aligned", || unsafe {
                self.inner.realloc(ptr, layout, new_size)
            });
            // on failure the old block stays live
            if !new_ptr.is_null() {
                self.tracker.count_deallocation(layout.size());
            }
            new_ptr
        })
    }
}

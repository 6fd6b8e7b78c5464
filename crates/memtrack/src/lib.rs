//! Allocation tracking in two flavours.
//!
//! * [`AllocationTracker`] counts and optionally traces allocations. Call it
//!   directly, or install it for the whole process through
//!   [`TrackingAllocator`] and the shared [`TRACKER`].
//! * [`resource::ResourceTracker`] is a [`resource::MemoryResource`] that logs
//!   every request with a label before forwarding it to its upstream resource.
//!
//! The two are independent; use either or both.

pub use memtrack_macros::{main, measure};

mod error;
mod global;
mod guard;
mod tracker;

pub mod collections;
pub mod output;
pub mod resource;
pub mod sink;

pub use error::AllocError;
pub use global::TrackingAllocator;
pub use guard::{MeasureGuard, StatusGuard};
pub use output::{Format, Reporter};
pub use tracker::{AllocationTracker, Snapshot, DEFAULT_ALIGN};

use std::alloc::Layout;
use std::ptr::NonNull;

/// Process-wide tracker, reporting to standard error.
///
/// It only sees allocations once a program installs
/// `TrackingAllocator::new(&memtrack::TRACKER)` as its `#[global_allocator]`.
pub static TRACKER: AllocationTracker = AllocationTracker::new();

/// Builds the layout for a `(size, align)` request, where `align == 0` means
/// the natural alignment for `size`, capped at [`DEFAULT_ALIGN`].
pub(crate) fn layout_for(size: usize, align: usize) -> Result<Layout, AllocError> {
    let effective = if align == 0 {
        size.checked_next_power_of_two()
            .unwrap_or(DEFAULT_ALIGN)
            .clamp(1, DEFAULT_ALIGN)
    } else {
        align
    };

    Layout::from_size_align(size, effective).map_err(|_| AllocError::InvalidLayout { size, align })
}

/// Non-null, suitably aligned pointer for zero-sized requests.
pub(crate) fn dangling(layout: Layout) -> NonNull<u8> {
    // align is a non-zero power of two
    NonNull::new(layout.align() as *mut u8).unwrap_or(NonNull::dangling())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_for_natural_alignment() {
        assert_eq!(layout_for(0, 0).unwrap().align(), 1);
        assert_eq!(layout_for(3, 0).unwrap().align(), 4);
        assert_eq!(layout_for(8, 0).unwrap().align(), 8);
        assert_eq!(layout_for(1000, 0).unwrap().align(), DEFAULT_ALIGN);
        assert_eq!(layout_for(1000, 64).unwrap().align(), 64);
    }

    #[test]
    fn test_layout_for_rejects_bad_alignment() {
        assert_eq!(
            layout_for(10, 12),
            Err(AllocError::InvalidLayout { size: 10, align: 12 })
        );
        assert!(layout_for(usize::MAX, 8).is_err());
    }

    #[test]
    fn test_dangling_is_aligned() {
        let layout = Layout::from_size_align(0, 256).unwrap();
        assert_eq!(dangling(layout).as_ptr() as usize, 256);
    }
}

//! Pluggable memory resources.
//!
//! A [`MemoryResource`] hands out raw blocks described by a [`Layout`]. Resources
//! compose: a [`MonotonicBuffer`] or [`PoolResource`] draws its chunks from an
//! upstream resource, and a [`ResourceTracker`] logs every request before
//! forwarding it upstream.
//!
//! ```rust
//! use memtrack::resource::{MemoryResource, MonotonicBuffer, ResourceTracker, SystemResource};
//! use std::alloc::Layout;
//!
//! let system = SystemResource;
//! let tracker = ResourceTracker::with_upstream("arena:", &system);
//! let arena = MonotonicBuffer::with_capacity(4096, &tracker);
//!
//! let block = arena.allocate(Layout::from_size_align(100, 8).unwrap()).unwrap();
//! unsafe { arena.deallocate(block, Layout::from_size_align(100, 8).unwrap()) };
//! ```

use crate::error::AllocError;
use crate::{dangling, layout_for};
use arc_swap::ArcSwap;
use std::alloc::Layout;
use std::any::Any;
use std::ptr::NonNull;
use std::sync::{Arc, OnceLock};

mod monotonic;
mod pool;
mod stats;
mod tracker;

pub use monotonic::MonotonicBuffer;
pub use pool::{PoolOptions, PoolResource};
pub use stats::{ResourceStats, StatsSnapshot};
pub use tracker::ResourceTracker;

/// Allocator capability that containers and subsystems take at construction.
pub trait MemoryResource: Send + Sync {
    /// Returns a block that fits `layout`, or fails without side effects upstream.
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError>;

    /// Returns a block to this resource.
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by `allocate` on a resource that compares
    /// equal to this one, with the same `layout`, and must not be used afterwards.
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout);

    /// Whether memory allocated from `self` can be deallocated through `other`
    /// and vice versa.
    fn is_equal(&self, other: &dyn MemoryResource) -> bool;

    /// Downcast hook used by [`ResourceTracker`] equality.
    fn as_resource_tracker(&self) -> Option<&ResourceTracker<'_>> {
        None
    }

    /// Downcast hook for `'static` resources.
    fn as_any(&self) -> Option<&dyn Any> {
        None
    }

    /// [`allocate`](Self::allocate) taking a byte count and alignment; `0`
    /// selects the natural alignment for `bytes`.
    fn allocate_bytes(&self, bytes: usize, alignment: usize) -> Result<NonNull<u8>, AllocError> {
        self.allocate(layout_for(bytes, alignment)?)
    }

    /// # Safety
    ///
    /// Same contract as [`deallocate`](Self::deallocate), with `bytes` and
    /// `alignment` matching the original `allocate_bytes` call.
    unsafe fn deallocate_bytes(&self, ptr: NonNull<u8>, bytes: usize, alignment: usize) {
        if let Ok(layout) = layout_for(bytes, alignment) {
            unsafe { self.deallocate(ptr, layout) }
        }
    }
}

impl std::fmt::Debug for dyn MemoryResource + '_ {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MemoryResource({:p})", self)
    }
}

/// Identity comparison, ignoring vtables.
pub(crate) fn is_same_object<T: ?Sized>(this: &T, other: &dyn MemoryResource) -> bool {
    std::ptr::addr_eq(std::ptr::from_ref(this), std::ptr::from_ref(other))
}

/// The process heap, reached through `std::alloc`.
///
/// Requests go through the global allocator, so they are visible to a
/// [`TrackingAllocator`](crate::TrackingAllocator) when one is installed.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemResource;

impl MemoryResource for SystemResource {
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        if layout.size() == 0 {
            return Ok(dangling(layout));
        }
        NonNull::new(unsafe { std::alloc::alloc(layout) }).ok_or(AllocError::exhausted(layout))
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        if layout.size() != 0 {
            unsafe { std::alloc::dealloc(ptr.as_ptr(), layout) }
        }
    }

    fn is_equal(&self, other: &dyn MemoryResource) -> bool {
        other.as_any().is_some_and(|any| any.is::<SystemResource>())
    }

    fn as_any(&self) -> Option<&dyn Any> {
        Some(self)
    }
}

/// A resource that fails every allocation.
///
/// Useful as the upstream of a [`MonotonicBuffer`] that must never touch the
/// heap.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullResource;

impl MemoryResource for NullResource {
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        Err(AllocError::exhausted(layout))
    }

    unsafe fn deallocate(&self, _ptr: NonNull<u8>, _layout: Layout) {}

    fn is_equal(&self, other: &dyn MemoryResource) -> bool {
        other.as_any().is_some_and(|any| any.is::<NullResource>())
    }

    fn as_any(&self) -> Option<&dyn Any> {
        Some(self)
    }
}

static SYSTEM: SystemResource = SystemResource;
static NULL: NullResource = NullResource;
static DEFAULT_RESOURCE: OnceLock<ArcSwap<&'static dyn MemoryResource>> = OnceLock::new();

fn default_slot() -> &'static ArcSwap<&'static dyn MemoryResource> {
    DEFAULT_RESOURCE.get_or_init(|| ArcSwap::from_pointee(&SYSTEM as &'static dyn MemoryResource))
}

pub fn system_resource() -> &'static dyn MemoryResource {
    &SYSTEM
}

pub fn null_resource() -> &'static dyn MemoryResource {
    &NULL
}

/// The resource used when none is given explicitly. Starts as [`SystemResource`].
pub fn default_resource() -> &'static dyn MemoryResource {
    **default_slot().load()
}

/// Replaces the process default resource and returns the previous one.
pub fn set_default_resource(resource: &'static dyn MemoryResource) -> &'static dyn MemoryResource {
    let previous = default_slot().swap(Arc::new(resource));
    *previous
}

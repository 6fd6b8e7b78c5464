//! Containers whose storage comes from a [`MemoryResource`].

use crate::error::AllocError;
use crate::resource::MemoryResource;
use std::alloc::{handle_alloc_error, Layout};
use std::fmt;
use std::marker::PhantomData;
use std::mem;
use std::ops::{Deref, DerefMut};
use std::ptr::{self, NonNull};

const MIN_CAPACITY: usize = 4;

/// Growable array allocating from a borrowed resource.
///
/// Growth doubles the capacity (at least 4 elements): a new buffer is
/// allocated, elements are moved over and the old buffer is deallocated, each
/// through the resource.
pub struct ResourceVec<'r, T> {
    ptr: NonNull<T>,
    cap: usize,
    len: usize,
    resource: &'r dyn MemoryResource,
    _owns: PhantomData<T>,
}

unsafe impl<T: Send> Send for ResourceVec<'_, T> {}
unsafe impl<T: Sync> Sync for ResourceVec<'_, T> {}

impl<'r, T> ResourceVec<'r, T> {
    const IS_ZST: bool = mem::size_of::<T>() == 0;

    pub fn new_in(resource: &'r dyn MemoryResource) -> Self {
        Self {
            ptr: NonNull::dangling(),
            cap: if Self::IS_ZST { usize::MAX } else { 0 },
            len: 0,
            resource,
            _owns: PhantomData,
        }
    }

    pub fn with_capacity_in(capacity: usize, resource: &'r dyn MemoryResource) -> Result<Self, AllocError> {
        let mut vec = Self::new_in(resource);
        if capacity > 0 {
            vec.grow_to(capacity)?;
        }
        Ok(vec)
    }

    pub fn resource(&self) -> &'r dyn MemoryResource {
        self.resource
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.cap
    }

    pub fn as_slice(&self) -> &[T] {
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }

    /// Makes room for at least `additional` more elements.
    pub fn try_reserve(&mut self, additional: usize) -> Result<(), AllocError> {
        let required = self
            .len
            .checked_add(additional)
            .ok_or_else(|| capacity_overflow::<T>(usize::MAX))?;
        if required <= self.cap {
            return Ok(());
        }

        let doubled = self.cap.saturating_mul(2);
        self.grow_to(required.max(doubled).max(MIN_CAPACITY))
    }

    pub fn reserve(&mut self, additional: usize) {
        if let Err(err) = self.try_reserve(additional) {
            alloc_failure(err)
        }
    }

    /// Appends `value`, or drops it and returns the error if growth fails.
    pub fn try_push(&mut self, value: T) -> Result<(), AllocError> {
        self.try_reserve(1)?;
        unsafe { self.ptr.as_ptr().add(self.len).write(value) };
        self.len += 1;
        Ok(())
    }

    pub fn push(&mut self, value: T) {
        self.reserve(1);
        unsafe { self.ptr.as_ptr().add(self.len).write(value) };
        self.len += 1;
    }

    pub fn pop(&mut self) -> Option<T> {
        if self.len == 0 {
            return None;
        }
        self.len -= 1;
        Some(unsafe { self.ptr.as_ptr().add(self.len).read() })
    }

    pub fn clear(&mut self) {
        let elements = ptr::slice_from_raw_parts_mut(self.ptr.as_ptr(), self.len);
        self.len = 0;
        unsafe { ptr::drop_in_place(elements) };
    }

    fn grow_to(&mut self, new_cap: usize) -> Result<(), AllocError> {
        if Self::IS_ZST {
            return Err(capacity_overflow::<T>(new_cap));
        }

        let new_layout = Layout::array::<T>(new_cap).map_err(|_| capacity_overflow::<T>(new_cap))?;
        let new_ptr = self.resource.allocate(new_layout)?.cast::<T>();

        if self.cap > 0 {
            unsafe {
                ptr::copy_nonoverlapping(self.ptr.as_ptr(), new_ptr.as_ptr(), self.len);
                self.resource.deallocate(self.ptr.cast(), self.current_layout());
            }
        }

        self.ptr = new_ptr;
        self.cap = new_cap;
        Ok(())
    }

    fn current_layout(&self) -> Layout {
        // cap was accepted by Layout::array when the buffer was allocated
        unsafe { Layout::from_size_align_unchecked(mem::size_of::<T>() * self.cap, mem::align_of::<T>()) }
    }
}

impl<T: Copy> ResourceVec<'_, T> {
    pub fn try_extend_from_slice(&mut self, items: &[T]) -> Result<(), AllocError> {
        self.try_reserve(items.len())?;
        unsafe {
            ptr::copy_nonoverlapping(items.as_ptr(), self.ptr.as_ptr().add(self.len), items.len());
        }
        self.len += items.len();
        Ok(())
    }
}

fn capacity_overflow<T>(count: usize) -> AllocError {
    AllocError::InvalidLayout {
        size: count.saturating_mul(mem::size_of::<T>()),
        align: mem::align_of::<T>(),
    }
}

fn alloc_failure(err: AllocError) -> ! {
    match err {
        AllocError::Exhausted { size, align } => match Layout::from_size_align(size, align) {
            Ok(layout) => handle_alloc_error(layout),
            Err(_) => panic!("{err}"),
        },
        AllocError::InvalidLayout { .. } => panic!("capacity overflow: {err}"),
    }
}

impl<T> Drop for ResourceVec<'_, T> {
    fn drop(&mut self) {
        self.clear();
        if !Self::IS_ZST && self.cap > 0 {
            unsafe { self.resource.deallocate(self.ptr.cast(), self.current_layout()) };
        }
    }
}

impl<T> Deref for ResourceVec<'_, T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        self.as_slice()
    }
}

impl<T> DerefMut for ResourceVec<'_, T> {
    fn deref_mut(&mut self) -> &mut [T] {
        self.as_mut_slice()
    }
}

impl<T: fmt::Debug> fmt::Debug for ResourceVec<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl<'a, T> IntoIterator for &'a ResourceVec<'_, T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// UTF-8 string allocating from a borrowed resource.
pub struct ResourceString<'r> {
    bytes: ResourceVec<'r, u8>,
}

impl<'r> ResourceString<'r> {
    pub fn new_in(resource: &'r dyn MemoryResource) -> Self {
        Self {
            bytes: ResourceVec::new_in(resource),
        }
    }

    /// Copies `s` into a buffer of exactly `s.len()` bytes.
    pub fn from_str_in(s: &str, resource: &'r dyn MemoryResource) -> Result<Self, AllocError> {
        let mut bytes = ResourceVec::new_in(resource);
        if !s.is_empty() {
            bytes.grow_to(s.len())?;
            bytes.try_extend_from_slice(s.as_bytes())?;
        }
        Ok(Self { bytes })
    }

    pub fn try_push_str(&mut self, s: &str) -> Result<(), AllocError> {
        self.bytes.try_extend_from_slice(s.as_bytes())
    }

    pub fn push_str(&mut self, s: &str) {
        if let Err(err) = self.try_push_str(s) {
            alloc_failure(err)
        }
    }

    pub fn as_str(&self) -> &str {
        // only ever extended with complete &str values
        unsafe { std::str::from_utf8_unchecked(self.bytes.as_slice()) }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.bytes.capacity()
    }
}

impl Deref for ResourceString<'_> {
    type Target = str;

    fn deref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for ResourceString<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for ResourceString<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.as_str(), f)
    }
}

impl PartialEq<str> for ResourceString<'_> {
    fn eq(&self, other: &str) -> bool {
        self.as_str() == other
    }
}

impl PartialEq<&str> for ResourceString<'_> {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == *other
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{MonotonicBuffer, NullResource, ResourceStats, ResourceTracker, SystemResource};
    use crate::sink::CaptureSink;
    use std::rc::Rc;

    #[test]
    fn test_push_grows_through_resource() {
        let system = SystemResource;
        let sink = CaptureSink::default();
        let tracker = ResourceTracker::with_upstream("", &system).with_sink(&sink);

        let mut vec = ResourceVec::new_in(&tracker);
        for i in 0..9u64 {
            vec.push(i);
        }
        assert_eq!(vec.as_slice(), &[0, 1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(vec.capacity(), 16);

        // 4 -> 8 -> 16 elements of 8 bytes
        assert_eq!(
            sink.lines(),
            vec![
                "allocate 32 Bytes",
                "allocate 64 Bytes",
                "deallocate 32 Bytes",
                "allocate 128 Bytes",
                "deallocate 64 Bytes",
            ]
        );

        drop(vec);
        assert_eq!(sink.lines().last().unwrap(), "deallocate 128 Bytes");
    }

    #[test]
    fn test_pop_and_clear_drop_elements() {
        let system = SystemResource;
        let marker = Rc::new(());
        let mut vec = ResourceVec::new_in(&system);
        for _ in 0..5 {
            vec.push(Rc::clone(&marker));
        }
        assert_eq!(Rc::strong_count(&marker), 6);

        drop(vec.pop());
        assert_eq!(Rc::strong_count(&marker), 5);

        vec.clear();
        assert!(vec.is_empty());
        assert_eq!(Rc::strong_count(&marker), 1);
    }

    #[test]
    fn test_drop_releases_everything() {
        let system = SystemResource;
        let stats = ResourceStats::new();
        let sink = CaptureSink::default();
        let tracker = ResourceTracker::with_upstream("", &system)
            .with_sink(&sink)
            .with_stats(&stats);

        {
            let mut names = ResourceVec::new_in(&tracker);
            for i in 0..10 {
                names.push(ResourceString::from_str_in(&format!("customer {i}"), &tracker).unwrap());
            }
            assert_eq!(names[3], "customer 3");
        }

        assert_eq!(stats.snapshot().live_bytes, 0);
        assert_eq!(stats.snapshot().allocations, stats.snapshot().deallocations);
    }

    #[test]
    fn test_try_push_reports_exhaustion() {
        let mut buf = [0u8; 64];
        let arena = MonotonicBuffer::with_buffer(&mut buf, &NullResource);
        let mut vec = ResourceVec::new_in(&arena);

        let mut pushed = 0;
        while vec.try_push(pushed as u32).is_ok() {
            pushed += 1;
        }
        // 4 * 4 + 8 * 4 bytes fit, 16 * 4 does not
        assert_eq!(pushed, 8);
        assert_eq!(vec.len(), 8);
    }

    #[test]
    fn test_string_exact_capacity() {
        let system = SystemResource;
        let mut s = ResourceString::from_str_in("just a non-SSO string", &system).unwrap();
        assert_eq!(s.len(), 21);
        assert_eq!(s.capacity(), 21);

        s.push_str("!");
        assert_eq!(s, "just a non-SSO string!");
        assert_eq!(s.to_string(), "just a non-SSO string!");
        assert!(ResourceString::from_str_in("", &NullResource).unwrap().is_empty());
    }

    #[test]
    fn test_zero_sized_elements_never_allocate() {
        let mut vec = ResourceVec::new_in(&NullResource);
        for _ in 0..100 {
            vec.push(());
        }
        assert_eq!(vec.len(), 100);
    }
}

use super::{is_same_object, MemoryResource};
use crate::error::AllocError;
use std::alloc::Layout;
use std::marker::PhantomData;
use std::mem;
use std::ptr::{self, NonNull};
use std::sync::{Mutex, PoisonError};

const DEFAULT_CHUNK_SIZE: usize = 1024;
const GROWTH_FACTOR: usize = 2;

/// Header stored at the start of every chunk taken from upstream.
struct ChunkHeader {
    next: Option<NonNull<ChunkHeader>>,
    layout: Layout,
}

struct Region {
    base: *mut u8,
    len: usize,
    used: usize,
}

impl Region {
    const EMPTY: Region = Region {
        base: ptr::null_mut(),
        len: 0,
        used: 0,
    };

    fn bump(&mut self, layout: Layout) -> Option<NonNull<u8>> {
        if self.base.is_null() {
            return None;
        }

        let addr = self.base as usize + self.used;
        let padding = addr.wrapping_neg() & (layout.align() - 1);
        let start = self.used.checked_add(padding)?;
        let end = start.checked_add(layout.size())?;
        if end > self.len {
            return None;
        }

        self.used = end;
        NonNull::new(unsafe { self.base.add(start) })
    }
}

struct BumpState {
    current: Region,
    initial: Region,
    chunks: Option<NonNull<ChunkHeader>>,
    next_size: usize,
}

// Raw pointers into the initial buffer and upstream chunks, owned by the resource.
unsafe impl Send for BumpState {}

/// Bump allocator that never reuses memory until it is released.
///
/// Requests are carved from an optional caller-provided buffer first; once that
/// is exhausted, chunks of geometrically growing size are taken from the
/// upstream resource. `deallocate` is a no-op. Everything goes back upstream
/// on [`release`](Self::release) or drop.
pub struct MonotonicBuffer<'a> {
    upstream: &'a dyn MemoryResource,
    state: Mutex<BumpState>,
    first_chunk: usize,
    _buffer: PhantomData<&'a mut [u8]>,
}

impl<'a> MonotonicBuffer<'a> {
    pub fn new(upstream: &'a dyn MemoryResource) -> Self {
        Self::with_capacity(DEFAULT_CHUNK_SIZE, upstream)
    }

    /// The first chunk requested upstream will hold at least `initial_size` bytes.
    pub fn with_capacity(initial_size: usize, upstream: &'a dyn MemoryResource) -> Self {
        Self::build(Region::EMPTY, initial_size.max(1), upstream)
    }

    /// Serves requests from `buffer` before asking `upstream` for anything.
    pub fn with_buffer(buffer: &'a mut [u8], upstream: &'a dyn MemoryResource) -> Self {
        let next_size = buffer.len().max(1).saturating_mul(GROWTH_FACTOR);
        let initial = Region {
            base: buffer.as_mut_ptr(),
            len: buffer.len(),
            used: 0,
        };
        Self::build(initial, next_size, upstream)
    }

    fn build(initial: Region, first_chunk: usize, upstream: &'a dyn MemoryResource) -> Self {
        let current = Region {
            base: initial.base,
            len: initial.len,
            used: 0,
        };

        Self {
            upstream,
            state: Mutex::new(BumpState {
                current,
                initial,
                chunks: None,
                next_size: first_chunk,
            }),
            first_chunk,
            _buffer: PhantomData,
        }
    }

    pub fn upstream(&self) -> &'a dyn MemoryResource {
        self.upstream
    }

    /// Bytes still available in the current region before upstream is asked.
    pub fn remaining(&self) -> usize {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.current.len - state.current.used
    }

    /// Returns every upstream chunk and rewinds to the initial buffer.
    pub fn release(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);

        let mut released = 0usize;
        let mut cursor = state.chunks.take();
        while let Some(header) = cursor {
            let ChunkHeader { next, layout } = unsafe { header.as_ptr().read() };
            unsafe { self.upstream.deallocate(header.cast(), layout) };
            released += 1;
            cursor = next;
        }

        state.current = Region {
            base: state.initial.base,
            len: state.initial.len,
            used: 0,
        };
        state.next_size = self.first_chunk;

        if released > 0 {
            tracing::debug!(chunks = released, "monotonic buffer released");
        }
    }

    fn grow(&self, state: &mut BumpState, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        let invalid = || AllocError::InvalidLayout {
            size: layout.size(),
            align: layout.align(),
        };

        let header = mem::size_of::<ChunkHeader>();
        let usable = state
            .next_size
            .max(layout.size().checked_add(layout.align()).ok_or_else(invalid)?);
        let chunk_layout = Layout::from_size_align(
            header.checked_add(usable).ok_or_else(invalid)?,
            layout.align().max(mem::align_of::<ChunkHeader>()),
        )
        .map_err(|_| invalid())?;

        let chunk = self.upstream.allocate(chunk_layout)?;
        unsafe {
            chunk.cast::<ChunkHeader>().as_ptr().write(ChunkHeader {
                next: state.chunks,
                layout: chunk_layout,
            });
        }
        state.chunks = Some(chunk.cast());
        state.current = Region {
            base: unsafe { chunk.as_ptr().add(header) },
            len: usable,
            used: 0,
        };
        state.next_size = state.next_size.saturating_mul(GROWTH_FACTOR);

        tracing::debug!(size = chunk_layout.size(), "monotonic buffer acquired chunk");

        state.current.bump(layout).ok_or(AllocError::exhausted(layout))
    }
}

impl MemoryResource for MonotonicBuffer<'_> {
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match state.current.bump(layout) {
            Some(ptr) => Ok(ptr),
            None => self.grow(&mut state, layout),
        }
    }

    unsafe fn deallocate(&self, _ptr: NonNull<u8>, _layout: Layout) {}

    fn is_equal(&self, other: &dyn MemoryResource) -> bool {
        is_same_object(self, other)
    }
}

impl Drop for MonotonicBuffer<'_> {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{NullResource, ResourceTracker, SystemResource};
    use crate::sink::CaptureSink;

    fn layout(size: usize, align: usize) -> Layout {
        Layout::from_size_align(size, align).unwrap()
    }

    #[test]
    fn test_initial_buffer_does_not_touch_upstream() {
        let mut buf = [0u8; 1024];
        let range = buf.as_ptr_range();
        let arena = MonotonicBuffer::with_buffer(&mut buf, &NullResource);

        for _ in 0..10 {
            let p = arena.allocate(layout(21, 1)).unwrap();
            assert!(range.contains(&p.as_ptr().cast_const()));
        }
        assert_eq!(arena.remaining(), 1024 - 210);
    }

    #[test]
    fn test_exhausted_with_null_upstream() {
        let mut buf = [0u8; 64];
        let arena = MonotonicBuffer::with_buffer(&mut buf, &NullResource);

        assert!(arena.allocate(layout(60, 1)).is_ok());
        let err = arena.allocate(layout(8, 8)).unwrap_err();
        assert!(matches!(err, AllocError::Exhausted { .. }));
    }

    #[test]
    fn test_alignment_is_respected() {
        let system = SystemResource;
        let arena = MonotonicBuffer::with_capacity(256, &system);

        arena.allocate(layout(3, 1)).unwrap();
        let p = arena.allocate(layout(16, 64)).unwrap();
        assert_eq!(p.as_ptr() as usize % 64, 0);
    }

    #[test]
    fn test_chunks_grow_and_release_upstream() {
        let system = SystemResource;
        let sink = CaptureSink::default();
        let tracker = ResourceTracker::with_upstream("up:", &system).with_sink(&sink);

        let mut arena = MonotonicBuffer::with_capacity(100, &tracker);
        assert!(sink.is_empty());

        arena.allocate(layout(80, 8)).unwrap();
        arena.allocate(layout(80, 8)).unwrap();
        arena.allocate(layout(500, 8)).unwrap();

        let lines = sink.lines();
        assert_eq!(lines.len(), 3);
        assert!(lines.iter().all(|l| l.starts_with("up:allocate ")));

        // second chunk is twice the first, third covers the oversized request
        let header = mem::size_of::<ChunkHeader>();
        assert_eq!(lines[0], format!("up:allocate {} Bytes", header + 100));
        assert_eq!(lines[1], format!("up:allocate {} Bytes", header + 200));
        assert_eq!(lines[2], format!("up:allocate {} Bytes", header + 508));

        arena.release();
        let lines = sink.lines();
        assert_eq!(lines.len(), 6);
        assert!(lines[3..].iter().all(|l| l.starts_with("up:deallocate ")));

        // release rewinds growth
        arena.allocate(layout(10, 1)).unwrap();
        assert_eq!(
            sink.lines().last().unwrap(),
            &format!("up:allocate {} Bytes", header + 100)
        );
    }

    #[test]
    fn test_equality_is_identity() {
        let system = SystemResource;
        let a = MonotonicBuffer::new(&system);
        let b = MonotonicBuffer::new(&system);

        assert!(a.is_equal(&a));
        assert!(!a.is_equal(&b));
    }
}

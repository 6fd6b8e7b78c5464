use super::{is_same_object, MemoryResource};
use crate::error::AllocError;
use std::alloc::Layout;
use std::mem;
use std::ptr::NonNull;
use std::sync::{Mutex, PoisonError};

const MIN_BLOCK: usize = 8;
const MIN_BLOCK_SHIFT: u32 = MIN_BLOCK.trailing_zeros();
const MAX_POOLS: usize = usize::BITS as usize - MIN_BLOCK_SHIFT as usize;
const INITIAL_BLOCKS: usize = 4;

/// Tuning knobs for [`PoolResource`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolOptions {
    /// Upper bound on the number of blocks taken from upstream in one chunk.
    pub max_blocks_per_chunk: usize,
    /// Requests larger than this bypass the pools and go straight upstream.
    pub largest_required_pool_block: usize,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            max_blocks_per_chunk: 64,
            largest_required_pool_block: 4096,
        }
    }
}

/// Trailer stored after the blocks of every chunk.
struct ChunkTrailer {
    next: Option<NonNull<u8>>,
    layout: Layout,
}

#[derive(Clone, Copy)]
struct Pool {
    free: Option<NonNull<u8>>,
    chunks: Option<NonNull<u8>>,
    next_blocks: usize,
}

impl Pool {
    const EMPTY: Pool = Pool {
        free: None,
        chunks: None,
        next_blocks: INITIAL_BLOCKS,
    };
}

struct PoolState {
    pools: [Pool; MAX_POOLS],
}

// Free lists and chunk lists point into memory owned by this resource.
unsafe impl Send for PoolState {}

/// Thread-safe pool of fixed-size blocks.
///
/// Requests are rounded up to a power-of-two size class between 8 bytes and
/// [`PoolOptions::largest_required_pool_block`]. Each class keeps an intrusive
/// free list, refilled with chunks from upstream whose block count doubles up
/// to [`PoolOptions::max_blocks_per_chunk`]. Larger requests are forwarded
/// upstream as-is. Freed blocks are kept for reuse until
/// [`release`](Self::release) or drop.
pub struct PoolResource<'a> {
    upstream: &'a dyn MemoryResource,
    options: PoolOptions,
    pool_count: usize,
    state: Mutex<PoolState>,
}

impl<'a> PoolResource<'a> {
    pub fn new(upstream: &'a dyn MemoryResource) -> Self {
        Self::with_options(PoolOptions::default(), upstream)
    }

    pub fn with_options(options: PoolOptions, upstream: &'a dyn MemoryResource) -> Self {
        let largest = options
            .largest_required_pool_block
            .clamp(MIN_BLOCK, 1 << (usize::BITS - 2))
            .next_power_of_two();
        let options = PoolOptions {
            max_blocks_per_chunk: options.max_blocks_per_chunk.max(1),
            largest_required_pool_block: largest,
        };
        let pool_count = (largest.trailing_zeros() - MIN_BLOCK_SHIFT) as usize + 1;

        Self {
            upstream,
            options,
            pool_count,
            state: Mutex::new(PoolState {
                pools: [Pool::EMPTY; MAX_POOLS],
            }),
        }
    }

    pub fn options(&self) -> PoolOptions {
        self.options
    }

    pub fn upstream(&self) -> &'a dyn MemoryResource {
        self.upstream
    }

    /// Returns every chunk to upstream. Oversized blocks are not tracked and
    /// must still be deallocated individually.
    pub fn release(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);

        for (index, pool) in state.pools[..self.pool_count].iter_mut().enumerate() {
            let block = block_size(index);
            let mut cursor = pool.chunks.take();
            while let Some(trailer) = cursor {
                let ChunkTrailer { next, layout } = unsafe { trailer.cast::<ChunkTrailer>().as_ptr().read() };
                let chunk = unsafe { trailer.as_ptr().sub(layout.size() - mem::size_of::<ChunkTrailer>()) };
                unsafe { self.upstream.deallocate(NonNull::new_unchecked(chunk), layout) };
                tracing::trace!(block, size = layout.size(), "pool returned chunk");
                cursor = next;
            }
            *pool = Pool::EMPTY;
        }
    }

    /// Size class index for `layout`, or `None` when it bypasses the pools.
    fn class_of(&self, layout: Layout) -> Option<usize> {
        let size = layout.size().max(layout.align()).max(MIN_BLOCK);
        if size > self.options.largest_required_pool_block {
            return None;
        }
        Some((size.next_power_of_two().trailing_zeros() - MIN_BLOCK_SHIFT) as usize)
    }

    fn refill(&self, pool: &mut Pool, index: usize) -> Result<(), AllocError> {
        let block = block_size(index);
        let blocks = pool.next_blocks.min(self.options.max_blocks_per_chunk);
        let invalid = AllocError::InvalidLayout {
            size: block.saturating_mul(blocks),
            align: block,
        };
        let body = block.checked_mul(blocks).ok_or(invalid)?;
        let size = body
            .checked_add(mem::size_of::<ChunkTrailer>())
            .ok_or(invalid)?;
        let layout = Layout::from_size_align(size, block).map_err(|_| invalid)?;

        let chunk = self.upstream.allocate(layout)?;
        unsafe {
            let trailer = chunk.as_ptr().add(body);
            trailer.cast::<ChunkTrailer>().write(ChunkTrailer {
                next: pool.chunks,
                layout,
            });
            pool.chunks = Some(NonNull::new_unchecked(trailer));

            for i in (0..blocks).rev() {
                let slot = chunk.as_ptr().add(i * block);
                slot.cast::<Option<NonNull<u8>>>().write(pool.free);
                pool.free = Some(NonNull::new_unchecked(slot));
            }
        }
        pool.next_blocks = (blocks * 2).min(self.options.max_blocks_per_chunk);

        tracing::debug!(block, blocks, "pool acquired chunk");
        Ok(())
    }
}

fn block_size(index: usize) -> usize {
    MIN_BLOCK << index
}

impl MemoryResource for PoolResource<'_> {
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        let Some(index) = self.class_of(layout) else {
            return self.upstream.allocate(layout);
        };

        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let pool = &mut state.pools[index];
        if pool.free.is_none() {
            self.refill(pool, index)?;
        }

        let block = pool.free.ok_or(AllocError::exhausted(layout))?;
        pool.free = unsafe { block.cast::<Option<NonNull<u8>>>().as_ptr().read() };
        Ok(block)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        let Some(index) = self.class_of(layout) else {
            return unsafe { self.upstream.deallocate(ptr, layout) };
        };

        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let pool = &mut state.pools[index];
        unsafe { ptr.cast::<Option<NonNull<u8>>>().as_ptr().write(pool.free) };
        pool.free = Some(ptr);
    }

    fn is_equal(&self, other: &dyn MemoryResource) -> bool {
        is_same_object(self, other)
    }
}

impl Drop for PoolResource<'_> {
    fn drop(&mut self) {
        self.release();
    }
}

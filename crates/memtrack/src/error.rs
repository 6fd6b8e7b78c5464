use thiserror::Error;

/// Failure returned by every allocating operation in this crate.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AllocError {
    /// The underlying allocator or resource could not satisfy the request.
    #[error("allocation of {size} bytes ({align}-byte aligned) exhausted the resource")]
    Exhausted { size: usize, align: usize },

    /// Alignment was not a power of two, or the rounded size overflows `isize`.
    #[error("invalid layout: {size} bytes with alignment {align}")]
    InvalidLayout { size: usize, align: usize },
}

impl AllocError {
    pub(crate) fn exhausted(layout: std::alloc::Layout) -> Self {
        AllocError::Exhausted {
            size: layout.size(),
            align: layout.align(),
        }
    }
}

use thiserror::Error;

/// Failures surfaced by [`crate::heap::Heap::try_allocate`].
///
/// Exhaustion is the ordinary "your request went unsatisfied" outcome and is
/// never fatal. Corruption means an internal invariant of the block chain no
/// longer holds (or the request could not correspond to any real allocation),
/// so the operation is aborted rather than repaired. The two are separate
/// variants on purpose: callers and tests must be able to tell them apart.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AllocError {
    /// No free block is large enough, even after one growth attempt.
    #[error("no free block can satisfy the request and the heap could not grow")]
    Exhausted,

    /// The block chain is malformed where at least one block must exist, or
    /// the request itself is invalid (zero-sized).
    #[error("invalid request or corrupted block chain")]
    Corrupted,
}

//! Helper functions shared by the rest of the allocator. These don't belong
//! to any concrete module of the program.

/// It aligns `to_be_aligned` upwards using `alignment`, or `None` when the
/// rounded value does not fit in a `usize` (a request that large can never
/// be satisfied anyway).
///
/// This is used in two places: region sizes are aligned to be a multiple of
/// [`crate::kernel::page_size`], and block capacities are aligned to the
/// computer's word size so every header the allocator writes lands on an
/// aligned address.
///
/// `alignment` must be a power of two.
pub(crate) fn align(to_be_aligned: usize, alignment: usize) -> Option<usize> {
    Some(to_be_aligned.checked_add(alignment - 1)? & !(alignment - 1))
}

use std::ptr;

use log::trace;

use crate::{
    block::{BLOCK_HEADER_SIZE, BlockSize, init_block},
    kernel::{map_pages, page_size},
    utils::align,
};

/// Smallest extent ever requested from the kernel in one mapping call, in
/// bytes. Rounding small requests up to this amortizes the syscall cost over
/// many allocations.
pub const REGION_MIN_SIZE: usize = 4 * 4096;

/// A contiguous range of memory obtained from the kernel in one mapping call.
///
/// The heap is built out of these. Usually a single growing region, but when
/// the address range right after the heap is occupied by something else a
/// growth attempt produces a second, disjoint region (see
/// [`crate::heap::Heap`]). [`libc::mmap`] hands regions out aligned to the
/// page size, so every region starts word-aligned.
pub struct Region {
    /// Start address returned by the mapping call. Null marks the invalid
    /// sentinel.
    pub addr: *mut u8,
    /// Size of the region in bytes, a whole number of pages.
    pub size: usize,
    /// Whether the mapping landed exactly on the requested address, i.e.
    /// whether it extends whatever came right before it.
    pub extends: bool,
}

impl Region {
    /// Sentinel denoting a failed mapping.
    pub const INVALID: Region = Region {
        addr: ptr::null_mut(),
        size: 0,
        extends: false,
    };

    pub fn is_invalid(&self) -> bool {
        self.addr.is_null()
    }
}

/// Actual extent mapped for a request of `query` usable bytes: the block
/// header overhead on top, rounded up to whole pages, and never below
/// [`REGION_MIN_SIZE`]. `None` when the extent would not fit in a `usize`;
/// no mapping call could satisfy that anyway.
fn region_actual_size(query: usize) -> Option<usize> {
    let extent = align(query.checked_add(BLOCK_HEADER_SIZE)?, page_size())?;

    Some(extent.max(REGION_MIN_SIZE))
}

/// Maps a new region able to hold `query` usable bytes, anchored at
/// `addr_hint`, and initializes it as a single free block with no successor.
///
/// Exact placement is tried first; if the hinted range is occupied the kernel
/// is allowed to choose another address instead, which is the recoverable
/// fallback behind disjoint heap growth. [`Region::extends`] records whether
/// the hint was honored. Returns [`Region::INVALID`] when `addr_hint` is null
/// or the mapping fails outright.
pub(crate) unsafe fn alloc_region(addr_hint: *mut u8, query: usize) -> Region {
    if addr_hint.is_null() {
        return Region::INVALID;
    }

    let Some(size) = region_actual_size(query) else {
        trace!("region request of {query} bytes overflows the address space");
        return Region::INVALID;
    };

    let mapped = unsafe {
        match map_pages(addr_hint, size, true) {
            Some(addr) => Some(addr),
            None => map_pages(addr_hint, size, false),
        }
    };

    let Some(addr) = mapped else {
        trace!("mapping {size} bytes near {addr_hint:p} failed");
        return Region::INVALID;
    };

    let addr = addr.as_ptr();

    unsafe {
        init_block(addr, BlockSize { bytes: size }, None);
    }

    trace!("mapped a {size} byte region at {addr:p} (hint {addr_hint:p})");

    Region {
        addr,
        size,
        extends: addr == addr_hint,
    }
}

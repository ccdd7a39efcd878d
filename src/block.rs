use std::{mem, ptr::NonNull};

use crate::utils::align;

/// Non-null pointer to `T`. `None` marks the end of the block chain.
pub type Link<T> = Option<NonNull<T>>;

/// Header size of a block in bytes. Every block pays this overhead on top of
/// its usable capacity.
pub const BLOCK_HEADER_SIZE: usize = mem::size_of::<BlockHeader>();

/// Smallest capacity a block is ever given. Splitting never produces a
/// fragment smaller than this, and every request is clamped up to it, so the
/// heap cannot fill up with unusably tiny blocks.
pub const BLOCK_MIN_CAPACITY: usize = 24;

/// Usable payload size of a block in bytes. The header overhead is *not*
/// included; see [`BlockSize`] for the header-inclusive count.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[repr(transparent)]
pub struct Capacity {
    pub bytes: usize,
}

/// Full size of a block in bytes, header included. Kept as a separate type
/// from [`Capacity`] so the two byte counts can never be mixed up; converting
/// between them is a pure function of [`BLOCK_HEADER_SIZE`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[repr(transparent)]
pub struct BlockSize {
    pub bytes: usize,
}

impl From<Capacity> for BlockSize {
    fn from(capacity: Capacity) -> Self {
        Self { bytes: capacity.bytes + BLOCK_HEADER_SIZE }
    }
}

impl From<BlockSize> for Capacity {
    fn from(size: BlockSize) -> Self {
        Self { bytes: size.bytes - BLOCK_HEADER_SIZE }
    }
}

/// This is the metadata record that physically precedes every block of heap
/// memory. The payload bytes follow it immediately:
///
/// ```text
/// +---------------------+ <------+
/// |        next         |        |
/// +---------------------+        |
/// |      capacity       |        | -> Header
/// +---------------------+        |
/// |    is_free (1b)     |        |
/// +---------------------+ <------+
/// |       Payload       |        |
/// |         ...         |        | -> capacity.bytes of
/// |         ...         |        |    addressable content
/// +---------------------+ <------+
/// ```
///
/// The `next` links form a singly linked, address-ordered chain through the
/// whole heap. Within one mapped region the chain order and the physical
/// address order coincide; across regions the chain may jump to a disjoint
/// address range (see [`crate::heap::Heap`]). The address one past a block's
/// payload is therefore the *physically* adjacent header, which is not
/// necessarily the same thing as `next`.
#[repr(C)]
pub struct BlockHeader {
    /// Next block of the chain. `None` marks the last block of the heap.
    pub next: Link<BlockHeader>,
    /// Usable payload size of this block.
    pub capacity: Capacity,
    /// Flag to tell whether the block is available for reuse.
    pub is_free: bool,
}

impl BlockHeader {
    /// Address of the first payload byte of this block.
    pub fn payload(&self) -> *mut u8 {
        (self as *const Self as *mut u8).wrapping_add(BLOCK_HEADER_SIZE)
    }

    /// Address one past the last payload byte of this block. When another
    /// block sits physically right after this one, this is the address of
    /// that block's header.
    pub fn payload_end(&self) -> *mut u8 {
        self.payload().wrapping_add(self.capacity.bytes)
    }
}

/// Writes a brand new free [`BlockHeader`] at `addr`, spanning `size` bytes
/// header included.
///
/// **SAFETY**: caller must guarantee that `addr` points to at least
/// `size.bytes` of writable memory and is word-aligned.
pub(crate) unsafe fn init_block(
    addr: *mut u8,
    size: BlockSize,
    next: Link<BlockHeader>,
) -> NonNull<BlockHeader> {
    let header = addr.cast::<BlockHeader>();

    unsafe {
        header.write(BlockHeader {
            next,
            capacity: Capacity::from(size),
            is_free: true,
        });

        NonNull::new_unchecked(header)
    }
}

/// Recovers the owning [`BlockHeader`] from a live payload pointer by fixed
/// offset back-calculation. Diagnostic accessor; ordinary callers only need
/// the payload pointer itself.
///
/// **SAFETY**: `payload` must be a pointer previously handed out by
/// [`crate::heap::Heap::allocate`] and not yet released.
pub unsafe fn header_of(payload: *mut u8) -> NonNull<BlockHeader> {
    unsafe { NonNull::new_unchecked(payload.sub(BLOCK_HEADER_SIZE)).cast() }
}

/// Clamps a requested size up to [`BLOCK_MIN_CAPACITY`] and pads it to a
/// multiple of the word size, so every capacity the allocator hands out keeps
/// headers aligned. Padding only rounds up, never down. `None` when the
/// padded size would not fit in a `usize`; such a request can never be
/// satisfied and must surface as exhaustion, not wrap around to a tiny one.
pub(crate) fn padded_request(query: usize) -> Option<usize> {
    align(query.max(BLOCK_MIN_CAPACITY), mem::size_of::<usize>())
}

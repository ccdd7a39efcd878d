use std::{ptr, ptr::NonNull};

use log::{debug, trace, warn};

use crate::{
    block::{BLOCK_HEADER_SIZE, BlockHeader, header_of, padded_request},
    error::AllocError,
    region::alloc_region,
    search::{SearchResult, find_good_or_last},
    split::{split_if_too_big, try_merge_with_next},
};

/// Default base address for [`Heap::init`]. Low enough to sit below the
/// usual placement of stack and shared libraries, high enough to clear the
/// program image on common layouts.
pub const DEFAULT_HEAP_BASE: usize = 0x0404_0000;

/// A private heap: the ordered chain of [`BlockHeader`] starting at the base
/// address chosen at initialization.
///
/// Each `Heap` is an independent instance carrying its own chain head, so
/// several heaps can coexist in one process as long as their base addresses
/// don't collide. The heap usually lives in one region that grows in place,
/// but when the address range right after it is occupied a growth attempt
/// maps a disjoint region instead; the chain then jumps across the hole and
/// logical order keeps matching physical order only within each region:
///
/// ```text
///  base                                          elsewhere
/// +----------------------------------+          +------------------------+
/// | +-------+   +-------+  +-------+ |  (hole)  | +-------+   +-------+  |
/// | | Block |-->| Block |->| Block |-|--------->| | Block |-->| Block |  |
/// | +-------+   +-------+  +-------+ |          | +-------+   +-------+  |
/// +----------------------------------+          +------------------------+
/// ```
///
/// Not [`Send`] or [`Sync`]: the chain is shared mutable state with no
/// locking, by design. Multi-threaded hosts must serialize access externally.
/// Mapped pages are never handed back to the kernel for the lifetime of the
/// process.
pub struct Heap {
    /// First block of the chain. Present from initialization on; an empty
    /// chain can only be the result of corruption.
    start: NonNull<BlockHeader>,
}

impl Heap {
    /// Maps the first region at [`DEFAULT_HEAP_BASE`] and hands back the
    /// heap. Returns `None` if that address range is already occupied or the
    /// mapping fails outright.
    pub fn init(initial: usize) -> Option<Self> {
        Self::init_at(DEFAULT_HEAP_BASE as *mut u8, initial)
    }

    /// Same as [`Heap::init`] with a caller-chosen base address. Useful for
    /// running several independent heaps, tests included.
    pub fn init_at(base: *mut u8, initial: usize) -> Option<Self> {
        let region = unsafe { alloc_region(base, initial) };

        if region.is_invalid() {
            warn!("heap init failed: could not map an initial region at {base:p}");
            return None;
        }

        if !region.extends {
            // The base was occupied and the kernel placed the region
            // elsewhere. A heap must live at its declared base, so give up;
            // the stray pages stay mapped, as all pages do.
            warn!(
                "heap init failed: base {base:p} is occupied, kernel offered {:p}",
                region.addr
            );
            return None;
        }

        debug!("heap initialized at {base:p} with {} bytes", region.size);

        Some(Self {
            start: unsafe { NonNull::new_unchecked(region.addr).cast() },
        })
    }

    /// Base address of the heap, i.e. the address of its first block header.
    pub fn base(&self) -> *mut u8 {
        self.start.as_ptr().cast()
    }

    /// First block of the chain. Diagnostic accessor, like [`header_of`].
    pub fn first_block(&self) -> &BlockHeader {
        unsafe { self.start.as_ref() }
    }

    /// Allocates `size` usable bytes and returns a pointer to the payload,
    /// or null when the request cannot be satisfied. The drop-in analogue of
    /// `malloc`; see [`Heap::try_allocate`] for the error-carrying form.
    pub fn allocate(&mut self, size: usize) -> *mut u8 {
        match self.try_allocate(size) {
            Ok(payload) => payload.as_ptr(),
            Err(error) => {
                trace!("allocate({size}) failed: {error}");
                ptr::null_mut()
            }
        }
    }

    /// Allocates `size` usable bytes: first-fit search over the chain, a
    /// split when the match has enough slack, and exactly one growth attempt
    /// followed by one re-search when no existing block fits.
    ///
    /// The block backing the returned pointer always has a capacity of at
    /// least `size` and at least [`crate::block::BLOCK_MIN_CAPACITY`].
    pub fn try_allocate(&mut self, size: usize) -> Result<NonNull<u8>, AllocError> {
        let mut result = unsafe { self.allocate_existing(size) };

        if let SearchResult::ReachedEndNotFound(last) = result {
            if unsafe { self.grow(last, size) }.is_some() {
                result = unsafe { self.allocate_existing(size) };
            }
        }

        match result {
            SearchResult::FoundGood(block) => {
                let payload = unsafe { block.as_ptr().cast::<u8>().add(BLOCK_HEADER_SIZE) };
                Ok(unsafe { NonNull::new_unchecked(payload) })
            }
            SearchResult::ReachedEndNotFound(_) => Err(AllocError::Exhausted),
            SearchResult::Corrupted => Err(AllocError::Corrupted),
        }
    }

    /// Releases a payload pointer previously handed out by
    /// [`Heap::allocate`]. No-op on null. After marking the block free the
    /// whole chain is swept from the start, coalescing every run of
    /// physically contiguous free blocks; the sweep is O(n) but leaves no
    /// pair of contiguous free blocks behind.
    ///
    /// **SAFETY**: `ptr` must be null or a pointer obtained from this heap's
    /// `allocate` that has not been released yet.
    pub unsafe fn release(&mut self, ptr: *mut u8) {
        if ptr.is_null() {
            return;
        }

        unsafe {
            header_of(ptr).as_mut().is_free = true;

            let mut current = Some(self.start);

            while let Some(block) = current {
                while try_merge_with_next(block) {}
                current = block.as_ref().next;
            }
        }
    }

    /// Tries to satisfy the request from the existing chain: search, split
    /// the match if it is oversized, mark it used. Growth is the caller's
    /// business; a reached-end outcome is handed back untouched so it can be
    /// used as the growth anchor.
    unsafe fn allocate_existing(&mut self, query: usize) -> SearchResult {
        let result = unsafe { find_good_or_last(Some(self.start), query) };

        if let SearchResult::FoundGood(mut block) = result {
            unsafe {
                split_if_too_big(block, query);
                block.as_mut().is_free = false;
            }
        }

        result
    }

    /// Grows the heap for a request no existing block can hold: maps a new
    /// region anchored right after `last`'s payload and links it in. When the
    /// region lands contiguously the new block is merged into `last` and
    /// `last` is returned; otherwise the heap now spans a disjoint address
    /// range and the new region's block is returned. The hole between
    /// disjoint regions is never reclaimed. Returns `None` when the mapping
    /// fails, which surfaces as exhaustion.
    ///
    /// **SAFETY**: `last` must be the final block of this heap's chain.
    unsafe fn grow(
        &mut self,
        mut last: NonNull<BlockHeader>,
        query: usize,
    ) -> Option<NonNull<BlockHeader>> {
        let Some(query) = padded_request(query) else {
            warn!("heap growth refused: a {query} byte request cannot be satisfied");
            return None;
        };

        unsafe {
            let hint = last.as_ref().payload_end();
            let region = alloc_region(hint, query);

            if region.is_invalid() {
                warn!("heap growth for {query} bytes failed");
                return None;
            }

            let new_block = NonNull::new_unchecked(region.addr).cast::<BlockHeader>();
            last.as_mut().next = Some(new_block);

            if try_merge_with_next(last) {
                debug!("heap grew in place by {} bytes", region.size);
                Some(last)
            } else {
                debug!("heap grew with a disjoint {} byte region at {:p}", region.size, region.addr);
                Some(new_block)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        block::BLOCK_MIN_CAPACITY,
        region::REGION_MIN_SIZE,
    };

    /// Each test gets its own address range, far away from anything the
    /// process maps on its own and from the other tests (they run in
    /// parallel threads and pages are never unmapped).
    fn test_heap(slot: usize, initial: usize) -> Heap {
        let base = (0x10_0000_0000 + slot * 0x1000_0000) as *mut u8;
        Heap::init_at(base, initial).expect("test heap could not be mapped")
    }

    /// Usable capacity of a fresh minimum-sized region.
    const INITIAL_CAPACITY: usize = REGION_MIN_SIZE - BLOCK_HEADER_SIZE;

    #[test]
    fn init_yields_one_free_block_at_the_base() {
        let heap = test_heap(0, 1024);

        let first = heap.first_block();
        assert!(first.is_free);
        assert!(first.next.is_none());
        assert_eq!(INITIAL_CAPACITY, first.capacity.bytes);
        assert_eq!(heap.base(), first as *const BlockHeader as *mut u8);
    }

    #[test]
    fn released_space_is_reused_for_equal_requests() {
        let mut heap = test_heap(1, 1024);

        for size in [1, 24, 100, 512, 4000] {
            let first = heap.allocate(size);
            assert!(!first.is_null());

            unsafe { heap.release(first) };

            let second = heap.allocate(size);
            assert_eq!(first, second, "size {size} did not reuse the freed block");

            unsafe { heap.release(second) };
        }
    }

    #[test]
    fn releasing_a_block_leaves_its_neighbour_intact() {
        let mut heap = test_heap(2, 1024);

        unsafe {
            let a = heap.allocate(64);
            let b = heap.allocate(64);

            ptr::write_bytes(b, 0xCD, 64);
            heap.release(a);

            assert!(header_of(a).as_ref().is_free);
            assert!(!header_of(b).as_ref().is_free);

            for offset in 0..64 {
                assert_eq!(0xCD, *b.add(offset));
            }
        }
    }

    #[test]
    fn splitting_accounts_for_every_byte() {
        let mut heap = test_heap(3, 1024);

        unsafe {
            let payload = heap.allocate(100);
            let header = header_of(payload);
            let header = header.as_ref();

            assert!(header.capacity.bytes >= 100);
            assert!(header.capacity.bytes >= BLOCK_MIN_CAPACITY);
            assert_eq!(Some(header.capacity.bytes), padded_request(100));

            // The leftover block sits exactly one past the used payload.
            let leftover = header.next.expect("an oversized block must split");
            assert_eq!(header.payload_end(), leftover.as_ptr().cast::<u8>());
            assert!(leftover.as_ref().is_free);

            // Full sizes add up to the whole region, nothing lost or gained.
            let used_full = BLOCK_HEADER_SIZE + header.capacity.bytes;
            let leftover_full = BLOCK_HEADER_SIZE + leftover.as_ref().capacity.bytes;
            assert_eq!(REGION_MIN_SIZE, used_full + leftover_full);
        }
    }

    #[test]
    fn releasing_adjacent_blocks_coalesces_them() {
        let mut heap = test_heap(4, 1024);

        unsafe {
            let a = heap.allocate(100);
            let b = heap.allocate(100);
            // Keeps the tail of the region out of the merge.
            let c = heap.allocate(100);

            let capacity_a = header_of(a).as_ref().capacity.bytes;
            let capacity_b = header_of(b).as_ref().capacity.bytes;

            heap.release(a);
            heap.release(b);

            let merged = header_of(a);
            assert!(merged.as_ref().is_free);
            assert_eq!(
                capacity_a + capacity_b + BLOCK_HEADER_SIZE,
                merged.as_ref().capacity.bytes
            );
            assert_eq!(Some(header_of(c)), merged.as_ref().next);
        }
    }

    #[cfg(unix)]
    #[test]
    fn growth_extends_the_heap_in_place() {
        let mut heap = test_heap(5, 1024);

        unsafe {
            // Fill the region exactly; the single block has no slack to split.
            let first = heap.allocate(INITIAL_CAPACITY);
            assert!(!first.is_null());

            // Nothing free is left, so this maps a new region right after the
            // old heap end.
            let second = heap.allocate(200);
            assert!(!second.is_null());

            let old_end = header_of(first).as_ref().payload_end();
            assert_eq!(old_end, header_of(second).as_ptr().cast::<u8>());
        }
    }

    #[cfg(unix)]
    #[test]
    fn growth_merges_with_a_free_tail() {
        let mut heap = test_heap(6, 1024);

        unsafe {
            // Leave a small free tail behind the used block.
            let first = heap.allocate(INITIAL_CAPACITY - 360);
            let tail = header_of(first).as_ref().next.expect("expected a split");
            let tail_address = tail.as_ptr();

            // Too big for the tail: growth maps right after it and the two
            // free blocks collapse into one, so the allocation starts at the
            // old tail.
            let second = heap.allocate(1000);

            assert_eq!(tail_address, header_of(second).as_ptr());
            assert_eq!(
                header_of(first).as_ref().payload_end(),
                header_of(second).as_ptr().cast::<u8>()
            );
        }
    }

    #[cfg(unix)]
    #[test]
    fn growth_falls_back_to_a_disjoint_region() {
        use crate::kernel::{map_pages, page_size};

        let mut heap = test_heap(7, 1024);

        unsafe {
            let first = heap.allocate(INITIAL_CAPACITY);
            let old_end = header_of(first).as_ref().payload_end();

            // Occupy the range right after the heap so in-place growth is
            // impossible.
            map_pages(old_end, page_size(), true)
                .expect("the range after the heap should be free to obstruct");

            let second = heap.allocate(100);
            assert!(!second.is_null());

            let last = header_of(first).as_ref();
            let new_block = last.next.expect("the new region must be chain-linked");

            // Reachable through the chain, but physically elsewhere.
            assert_eq!(new_block, header_of(second));
            assert_ne!(old_end, new_block.as_ptr().cast::<u8>());
            assert_ne!(last.payload_end(), new_block.as_ptr().cast::<u8>());

            // Both sides of the hole stay independently trackable.
            assert!(!last.is_free);
            assert!(!new_block.as_ref().is_free);
        }
    }

    #[test]
    fn zero_sized_requests_are_corruption_not_exhaustion() {
        let mut heap = test_heap(8, 1024);

        assert_eq!(Err(AllocError::Corrupted), heap.try_allocate(0));
    }

    #[test]
    fn unmappable_requests_surface_as_exhaustion() {
        let mut heap = test_heap(11, 1024);

        // Representable, but far beyond any address space the kernel can
        // map: the single growth attempt fails and the request surfaces as
        // exhaustion, distinguishable from corruption.
        assert_eq!(Err(AllocError::Exhausted), heap.try_allocate(usize::MAX / 4));

        // An ordinary request still succeeds afterwards.
        assert!(!heap.allocate(100).is_null());
    }

    #[test]
    fn huge_requests_return_null_instead_of_overflowing() {
        let mut heap = test_heap(12, 1024);

        // Sizes whose padding would wrap around `usize::MAX` must come back
        // as null, never as a panic or as a tiny block masquerading as a
        // huge one.
        assert!(heap.allocate(usize::MAX).is_null());
        assert_eq!(
            Err(AllocError::Exhausted),
            heap.try_allocate(usize::MAX - BLOCK_HEADER_SIZE)
        );

        // The chain is untouched: the whole region is still one free block
        // and ordinary requests keep working.
        assert!(heap.first_block().is_free);
        assert!(!heap.allocate(100).is_null());
    }

    #[test]
    fn releasing_null_is_a_no_op() {
        let mut heap = test_heap(9, 1024);

        unsafe { heap.release(ptr::null_mut()) };

        assert!(heap.first_block().is_free);
    }

    #[test]
    fn end_to_end_scenario() {
        let mut heap = test_heap(10, 1024);

        unsafe {
            let a = heap.allocate(100);
            let b = heap.allocate(100);
            assert!(!a.is_null());
            assert!(!b.is_null());

            // Non-overlapping: b starts past a's block.
            let a_span = padded_request(100).unwrap();
            assert!(b as usize >= a as usize + a_span + BLOCK_HEADER_SIZE);

            // Releasing and reallocating the same size reuses a's block.
            heap.release(a);
            let c = heap.allocate(100);
            assert_eq!(a, c);

            // Releasing everything coalesces the whole region back into one
            // free block.
            heap.release(c);
            heap.release(b);

            let first = heap.first_block();
            assert!(first.is_free);
            assert!(first.next.is_none());
            assert_eq!(INITIAL_CAPACITY, first.capacity.bytes);
        }
    }
}

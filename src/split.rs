use std::ptr::NonNull;

use crate::block::{
    BLOCK_HEADER_SIZE, BLOCK_MIN_CAPACITY, BlockHeader, BlockSize, Capacity, init_block,
    padded_request,
};

/// A block can be split for a `query` only when it is free and the leftover
/// would still fit a header plus the minimum capacity; anything smaller would
/// leave an unusable fragment behind. Queries near `usize::MAX` can't leave
/// a leftover at all, so they never split.
fn splittable(block: &BlockHeader, query: usize) -> bool {
    let Some(needed) = query.checked_add(BLOCK_HEADER_SIZE + BLOCK_MIN_CAPACITY) else {
        return false;
    };

    block.is_free && needed <= block.capacity.bytes
}

/// Physical adjacency: the byte right after `fst`'s payload is exactly
/// `snd`'s header. Blocks linked across a disjoint growth region are chain
/// neighbours but never contiguous.
fn blocks_contiguous(fst: &BlockHeader, snd: NonNull<BlockHeader>) -> bool {
    fst.payload_end() == snd.as_ptr().cast::<u8>()
}

/// Trims an oversized free block down to `query` usable bytes and spawns a
/// new free block right after it holding the leftover capacity. The new block
/// inherits the original's successor and is linked in as the new `next`.
///
/// Returns whether a split occurred; blocks without enough slack are left
/// untouched.
///
/// **SAFETY**: `block` must point to a live header of the chain.
pub(crate) unsafe fn split_if_too_big(mut block: NonNull<BlockHeader>, query: usize) -> bool {
    let Some(query) = padded_request(query) else {
        return false;
    };

    unsafe {
        if !splittable(block.as_ref(), query) {
            return false;
        }

        let header = block.as_mut();
        let leftover = BlockSize { bytes: header.capacity.bytes - query };

        header.capacity = Capacity { bytes: query };

        let second = init_block(header.payload_end(), leftover, header.next);
        header.next = Some(second);
    }

    true
}

/// Coalesces `block` with its successor iff both exist, both are free and
/// they are physically contiguous. The absorbed block's full size (header
/// included) is added to `block`'s capacity and its header is skipped over.
///
/// Returns whether a merge occurred.
///
/// **SAFETY**: `block` must point to a live header of the chain.
pub(crate) unsafe fn try_merge_with_next(mut block: NonNull<BlockHeader>) -> bool {
    unsafe {
        let Some(next) = block.as_ref().next else {
            return false;
        };

        if !block.as_ref().is_free || !next.as_ref().is_free {
            return false;
        }

        if !blocks_contiguous(block.as_ref(), next) {
            return false;
        }

        // Read everything out of the absorbed header before touching `block`;
        // after the merge that memory is plain payload again.
        let absorbed = BlockSize::from(next.as_ref().capacity);
        let successor = next.as_ref().next;

        let header = block.as_mut();
        header.capacity.bytes += absorbed.bytes;
        header.next = successor;
    }

    true
}

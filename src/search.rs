use std::ptr::NonNull;

use crate::block::{BlockHeader, Link, padded_request};

/// Outcome of a walk over the block chain.
#[derive(Clone, Copy, Debug)]
pub(crate) enum SearchResult {
    /// First free block big enough for the request.
    FoundGood(NonNull<BlockHeader>),
    /// No block matched; this is the last block of the chain, so a growth
    /// attempt can be anchored right after it.
    ReachedEndNotFound(NonNull<BlockHeader>),
    /// The request is invalid or the chain is empty. The heap always has at
    /// least one block once initialized, so an empty chain means the data
    /// structure can no longer be trusted.
    Corrupted,
}

/// Walks the chain from `start` looking for the first free block whose
/// capacity satisfies `query` (first-fit: no best-fit reordering, the first
/// match wins). The query is clamped up to the minimum block capacity before
/// comparing, just like every other entry point.
///
/// **SAFETY**: `start` must be the head of a well-formed, acyclic chain.
pub(crate) unsafe fn find_good_or_last(start: Link<BlockHeader>, query: usize) -> SearchResult {
    if query == 0 {
        return SearchResult::Corrupted;
    }

    let Some(start) = start else {
        return SearchResult::Corrupted;
    };

    // A query too large to even pad can't match any block; walking with an
    // impossible target still hands back the last block, and the growth
    // attempt anchored there fails in turn, surfacing exhaustion.
    let needed = padded_request(query).unwrap_or(usize::MAX);
    let mut current = start;

    loop {
        let block = unsafe { current.as_ref() };

        if block.is_free && block.capacity.bytes >= needed {
            return SearchResult::FoundGood(current);
        }

        match block.next {
            Some(next) => current = next,
            None => return SearchResult::ReachedEndNotFound(current),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{BLOCK_HEADER_SIZE, BlockSize, init_block};

    #[repr(align(4096))]
    struct Arena([u8; 4096]);

    /// Carves the arena into two blocks: a used one of `first_size` bytes
    /// (header included) and a free one spanning the rest.
    unsafe fn two_blocks(arena: &mut Arena, first_size: usize) -> NonNull<BlockHeader> {
        let base = arena.0.as_mut_ptr();

        unsafe {
            let second = init_block(
                base.add(first_size),
                BlockSize { bytes: 4096 - first_size },
                None,
            );

            let mut first = init_block(base, BlockSize { bytes: first_size }, Some(second));
            first.as_mut().is_free = false;

            first
        }
    }

    #[test]
    fn zero_query_is_corruption() {
        assert!(matches!(
            unsafe { find_good_or_last(None, 0) },
            SearchResult::Corrupted
        ));
    }

    #[test]
    fn empty_chain_is_corruption() {
        assert!(matches!(
            unsafe { find_good_or_last(None, 100) },
            SearchResult::Corrupted
        ));
    }

    #[test]
    fn first_fit_skips_used_blocks() {
        let mut arena = Arena([0; 4096]);

        unsafe {
            let first = two_blocks(&mut arena, 1024);
            let second = first.as_ref().next.unwrap();

            match find_good_or_last(Some(first), 100) {
                SearchResult::FoundGood(found) => assert_eq!(second, found),
                other => panic!("expected a match, got {other:?}"),
            }
        }
    }

    #[test]
    fn too_small_free_blocks_report_the_last_block() {
        let mut arena = Arena([0; 4096]);

        unsafe {
            let first = two_blocks(&mut arena, 1024);
            let second = first.as_ref().next.unwrap();

            // Larger than the free block's capacity, so the walk runs off the
            // end and hands back the last block as the growth anchor.
            let query = 4096 - 1024;

            match find_good_or_last(Some(first), query) {
                SearchResult::ReachedEndNotFound(last) => assert_eq!(second, last),
                other => panic!("expected to reach the end, got {other:?}"),
            }
        }
    }

    #[test]
    fn unpaddable_queries_report_the_last_block() {
        let mut arena = Arena([0; 4096]);

        unsafe {
            let first = two_blocks(&mut arena, 1024);
            let second = first.as_ref().next.unwrap();

            match find_good_or_last(Some(first), usize::MAX) {
                SearchResult::ReachedEndNotFound(last) => assert_eq!(second, last),
                other => panic!("expected to reach the end, got {other:?}"),
            }
        }
    }

    #[test]
    fn tiny_queries_are_clamped_to_the_minimum_capacity() {
        let mut arena = Arena([0; 4096]);

        unsafe {
            // A free block too small for the minimum capacity is never a match,
            // even for a one byte request.
            let first = two_blocks(&mut arena, 4096 - BLOCK_HEADER_SIZE - 8);

            assert!(matches!(
                find_good_or_last(Some(first), 1),
                SearchResult::ReachedEndNotFound(_)
            ));
        }
    }
}

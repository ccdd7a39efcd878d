//! `mapalloc` is a user-space memory allocator that replaces the standard
//! allocation API with its own [`Heap::allocate`] / [`Heap::release`] pair,
//! managing a private heap built from memory-mapped pages.
//!
//! Every block of heap memory is prefixed by a [`BlockHeader`] holding its
//! metadata; the returned pointer is at the start of the payload that
//! follows it:
//!
//! ```text
//! +--------------------------------+
//! | Header   | Actual memory block |
//! +--------------------------------+
//! ```
//!
//! The headers form a singly linked chain threaded through every region the
//! heap has mapped. Allocation is a first-fit walk over that chain, trimming
//! oversized matches with a split; release marks the block free and sweeps
//! the chain coalescing physically adjacent free blocks. When no free block
//! fits, the heap grows by mapping a new region right after its last block,
//! merging the two when the kernel honors the address and living with a
//! disjoint region when it does not:
//!
//! ```text
//!           contiguous growth                       disjoint growth
//! +-------------------+==========+      +-------------------+   +==========+
//! | Block |...| Block |  fresh   |      | Block |...| Block |-->|  fresh   |
//! +-------------------+==========+      +-------------------+   +==========+
//!                 ^ merged in place            occupied ^ hole stays
//! ```
//!
//! The design is single-threaded on purpose: a [`Heap`] is neither `Send`
//! nor `Sync`, and multi-threaded hosts must serialize access externally.
//! Pages, once mapped, are never returned to the kernel.
//!
//! ```no_run
//! use mapalloc::Heap;
//!
//! let mut heap = Heap::init(1024).expect("heap base occupied");
//!
//! let ptr = heap.allocate(100);
//! assert!(!ptr.is_null());
//!
//! unsafe { heap.release(ptr) };
//! ```

mod kernel;
mod search;
mod split;
mod utils;

pub mod block;
pub mod error;
pub mod heap;
pub mod region;

pub use block::{BLOCK_HEADER_SIZE, BLOCK_MIN_CAPACITY, BlockHeader, BlockSize, Capacity, header_of};
pub use error::AllocError;
pub use heap::{DEFAULT_HEAP_BASE, Heap};
pub use region::{REGION_MIN_SIZE, Region};

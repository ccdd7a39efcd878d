//! Demonstrates heap growth: exhaust the initial region and watch the heap
//! map a follow-up region right after its end. Run with `RUST_LOG=debug` to
//! see the growth decisions as they happen.

use mapalloc::{BLOCK_HEADER_SIZE, Heap, REGION_MIN_SIZE, header_of};

fn main() {
    pretty_env_logger::init();

    let mut heap = Heap::init(1024).expect("could not map the heap base");
    println!("Heap base: {:p}", heap.base());

    // One allocation spanning the whole initial region.
    let first = heap.allocate(REGION_MIN_SIZE - BLOCK_HEADER_SIZE);
    println!("Filled the initial region: {first:?}");

    // Nothing free is left, so this one forces a growth.
    let second = heap.allocate(4096);
    println!("Allocated past the region: {second:?}");

    unsafe {
        let old_end = header_of(first).as_ref().payload_end();

        if old_end == header_of(second).as_ptr().cast() {
            println!("The heap grew in place, no gap at {old_end:?}");
        } else {
            println!(
                "The heap grew with a disjoint region: end was {old_end:?}, \
                 new block at {:?}",
                header_of(second).as_ptr()
            );
        }

        heap.release(second);
        heap.release(first);
    }
}

//! Basic walkthrough of the public API: initialize a heap, allocate a few
//! blocks, inspect their headers and release everything.

use mapalloc::{Heap, header_of};

fn log_alloc(what: &str, addr: *mut u8) {
    println!("Allocated {what} at {addr:?}");
    unsafe {
        let header = header_of(addr);
        println!(
            "  capacity: {} bytes, free: {}",
            header.as_ref().capacity.bytes,
            header.as_ref().is_free
        );
    }
}

fn main() {
    pretty_env_logger::init();

    let mut heap = Heap::init(1024).expect("could not map the heap base");
    println!("Heap base: {:p}", heap.base());

    let a = heap.allocate(100);
    log_alloc("100 bytes", a);

    let b = heap.allocate(8);
    log_alloc("8 bytes (clamped to the minimum capacity)", b);

    unsafe {
        heap.release(a);

        let c = heap.allocate(100);
        log_alloc("100 bytes again", c);

        if a == c {
            println!("Freed space correctly reused at {c:?}");
        }

        heap.release(b);
        heap.release(c);
    }

    let first = heap.first_block();
    println!(
        "After releasing everything: one free block of {} bytes",
        first.capacity.bytes
    );
}

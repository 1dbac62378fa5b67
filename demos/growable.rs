//! Builds the same array twice, once on the heap and once in a fixed buffer,
//! and shows what each allocator does along the way.
//!
//! Run with `RUST_LOG=trace` to see every allocation.

use basic_mem::{Allocator, BumpAllocator, GrowableArray, HeapAllocator, LibcHeap};

fn fill<A: Allocator + ?Sized>(alloc: &A, array: &mut GrowableArray<u32>) {
    for i in 0..10 {
        unsafe { array.append(alloc, i * i).expect("out of memory") };
        println!(
            "  appended {:3}: len = {:2}, capacity = {:2}",
            i * i,
            array.len(),
            array.capacity()
        );
    }
}

fn main() {
    env_logger::init();

    println!("Heap:");
    let heap = HeapAllocator::<LibcHeap>::new();
    let mut on_heap = GrowableArray::new();
    fill(&heap, &mut on_heap);

    println!("\nBump allocator over 512 bytes:");
    let mut buf = [0u8; 512];
    let bump = BumpAllocator::new(&mut buf);
    let mut in_buffer = GrowableArray::new();
    fill(&bump, &mut in_buffer);
    println!("  cursor at {} of {}", bump.position(), bump.capacity());

    in_buffer.remove(0);
    in_buffer.swap_remove(0);
    println!("\nAfter remove(0) and swap_remove(0): {:?}", in_buffer);

    let owned = unsafe { in_buffer.to_owned_slice(&bump) }.expect("out of memory");
    println!(
        "Owned slice of {} elements; the array now has capacity {}",
        owned.len(),
        in_buffer.capacity()
    );
    println!("  cursor at {} of {}", bump.position(), bump.capacity());

    unsafe {
        bump.destroy_array(owned);
        on_heap.deinit(&heap);
    }
    println!("  cursor at {} after freeing the owned slice", bump.position());
}

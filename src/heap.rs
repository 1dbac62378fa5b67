//! A general purpose allocator on top of the process heap.
//!
//! ## [`HeapAllocator`](struct.HeapAllocator.html)
//!
//! The heap only promises a small baseline alignment, so `HeapAllocator`
//! over-allocates and places each block at the next suitably aligned address.
//! The distance from the raw start to the block is written just before the
//! block, and read back on deallocation to find the raw pointer again:
//!
//! ```text
//!   raw                        block
//!    |<--------- offset ------->|
//!    |  padding  | offset slot  |  block bytes ...  | spare |
//!                 <- usize ---->
//! ```
//!
//! ## [`HeapSource`](trait.HeapSource.html)
//!
//! `HeapSource` abstracts over the raw allocate/free calls. The default,
//! [`LibcHeap`](struct.LibcHeap.html), calls `malloc` and `free`;
//! [`CappedHeap`](struct.CappedHeap.html) puts a byte budget on another
//! source, which makes exhaustion easy to reproduce.

use core::cell::Cell;
use core::mem;
use core::ptr::NonNull;

use static_assertions::const_assert;

use crate::allocator::{Allocator, Block};
use crate::layout::{align_up, Layout, MAX_ALIGNMENT};

/// Bytes reserved in front of every block to record its offset.
const OFFSET_SLOT: usize = mem::size_of::<usize>();
const_assert!(OFFSET_SLOT <= MAX_ALIGNMENT);

/// A supplier of raw, unaligned memory for a [`HeapAllocator`](struct.HeapAllocator.html).
pub trait HeapSource {
    /// Get `size` bytes of raw memory, or `None` if none is available.
    ///
    /// # Safety
    ///
    /// `size` must be non-zero. The returned memory need only be byte
    /// aligned, and must not be in use by anything else.
    unsafe fn alloc_raw(&self, size: usize) -> Option<NonNull<u8>>;

    /// Give back memory from [`alloc_raw`](#tymethod.alloc_raw).
    ///
    /// # Safety
    ///
    /// `ptr` must come from `alloc_raw` on this source with the same `size`,
    /// and must not be used afterwards.
    unsafe fn free_raw(&self, ptr: NonNull<u8>, size: usize);
}

/// Raw memory from `malloc`, returned with `free`.
#[derive(Copy, Clone, Debug, Default)]
pub struct LibcHeap;

impl HeapSource for LibcHeap {
    unsafe fn alloc_raw(&self, size: usize) -> Option<NonNull<u8>> {
        NonNull::new(libc::malloc(size) as *mut u8)
    }

    unsafe fn free_raw(&self, ptr: NonNull<u8>, _size: usize) {
        libc::free(ptr.as_ptr() as *mut libc::c_void)
    }
}

/// A heap source that refuses to hand out more than `limit` bytes at once.
///
/// Mainly useful for testing how callers cope with running out of memory.
#[derive(Debug)]
pub struct CappedHeap<S = LibcHeap> {
    source: S,
    limit: usize,
    in_use: Cell<usize>,
}

impl<S: HeapSource + Default> CappedHeap<S> {
    pub fn new(limit: usize) -> Self {
        CappedHeap::with_source(S::default(), limit)
    }
}

impl<S: HeapSource> CappedHeap<S> {
    pub fn with_source(source: S, limit: usize) -> Self {
        CappedHeap {
            source,
            limit,
            in_use: Cell::new(0),
        }
    }

    /// Bytes currently handed out, including allocator overhead.
    pub fn in_use(&self) -> usize {
        self.in_use.get()
    }

    /// Bytes that can still be handed out.
    pub fn remaining(&self) -> usize {
        self.limit - self.in_use.get()
    }
}

impl<S: HeapSource> HeapSource for CappedHeap<S> {
    unsafe fn alloc_raw(&self, size: usize) -> Option<NonNull<u8>> {
        let in_use = self.in_use.get().checked_add(size)?;
        if in_use > self.limit {
            return None;
        }
        let ptr = self.source.alloc_raw(size)?;
        self.in_use.set(in_use);
        Some(ptr)
    }

    unsafe fn free_raw(&self, ptr: NonNull<u8>, size: usize) {
        self.in_use.set(self.in_use.get() - size);
        self.source.free_raw(ptr, size)
    }
}

/// A general purpose allocator, handing out blocks of any supported alignment
/// from a [`HeapSource`](trait.HeapSource.html).
///
/// Blocks may be deallocated in any order.
#[derive(Debug, Default)]
pub struct HeapAllocator<S = LibcHeap> {
    source: S,
}

impl<S: HeapSource + Default> HeapAllocator<S> {
    pub fn new() -> Self {
        HeapAllocator::with_source(S::default())
    }
}

impl<S: HeapSource> HeapAllocator<S> {
    pub fn with_source(source: S) -> Self {
        HeapAllocator { source }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// The number of raw bytes requested from the source for `layout`.
    pub fn raw_size(layout: Layout) -> Option<usize> {
        layout.padded_size()?.checked_add(OFFSET_SLOT)
    }
}

impl<S: HeapSource> Allocator for HeapAllocator<S> {
    fn allocate(&self, layout: Layout) -> Option<Block> {
        let total = match Self::raw_size(layout) {
            Some(total) => total,
            None => {
                log::debug!("heap: {}@{} is too large", layout.size(), layout.align());
                return None;
            }
        };

        let raw = match unsafe { self.source.alloc_raw(total) } {
            Some(raw) => raw,
            None => {
                log::debug!("heap exhausted allocating {} bytes", total);
                return None;
            }
        };

        let addr = raw.as_ptr() as usize;
        let aligned = match addr
            .checked_add(OFFSET_SLOT)
            .and_then(|a| align_up(a, layout.align()))
        {
            Some(aligned) => aligned,
            None => crate::contract::violation(format_args!(
                "aligning heap address {:#x} to {} overflows",
                addr,
                layout.align()
            )),
        };
        let offset = aligned - addr;

        unsafe {
            // offset <= OFFSET_SLOT + align - 1, so the block ends within
            // the `total` bytes requested.
            let ptr = raw.as_ptr().add(offset);
            (ptr.sub(OFFSET_SLOT) as *mut usize).write_unaligned(offset);
            log::trace!(
                "heap allocated {}@{} at {:p} (raw {:p}, offset {})",
                layout.size(),
                layout.align(),
                ptr,
                raw,
                offset
            );
            Some(Block::from_raw_parts(NonNull::new_unchecked(ptr), layout.size()))
        }
    }

    unsafe fn deallocate(&self, block: Block, layout: Layout) {
        let (ptr, _) = block.into_raw_parts();
        let offset = (ptr.as_ptr().sub(OFFSET_SLOT) as *const usize).read_unaligned();
        contract!(
            offset >= OFFSET_SLOT && offset - OFFSET_SLOT < layout.align(),
            "block at {:p} has offset {}, which does not fit alignment {}; \
             wrong allocator or layout?",
            ptr,
            offset,
            layout.align()
        );
        let total = match Self::raw_size(layout) {
            Some(total) => total,
            None => crate::contract::violation(format_args!(
                "{}@{} could not have been allocated",
                layout.size(),
                layout.align()
            )),
        };

        let raw = ptr.as_ptr().sub(offset);
        log::trace!(
            "heap freed {}@{} at {:p} (raw {:p})",
            layout.size(),
            layout.align(),
            ptr,
            raw
        );
        self.source.free_raw(NonNull::new_unchecked(raw), total);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use test_env_log::test;

    #[test]
    fn test_alignments() {
        let heap = HeapAllocator::<LibcHeap>::new();

        let mut align = 1;
        while align <= 4096 {
            for &size in &[0usize, 1, 7, 64, 1000] {
                let layout = Layout::from_size_align(size, align);
                let mut block = heap.allocate(layout).expect("malloc failed");
                assert_eq!(block.as_ptr() as usize % align, 0);
                assert_eq!(block.len(), size);
                unsafe {
                    block.as_bytes_mut().iter_mut().for_each(|b| *b = 0x5A);
                    heap.deallocate(block, layout);
                }
            }
            align *= 2;
        }
    }

    #[test]
    fn test_max_alignment() {
        let heap = HeapAllocator::<LibcHeap>::new();
        let layout = Layout::from_size_align(16, MAX_ALIGNMENT);
        let block = heap.allocate(layout).unwrap();
        assert_eq!(block.as_ptr() as usize % MAX_ALIGNMENT, 0);
        unsafe { heap.deallocate(block, layout) };
    }

    #[test]
    fn test_any_order() {
        let heap = HeapAllocator::<LibcHeap>::new();
        let layouts = [
            Layout::of::<u8>(),
            Layout::of::<u64>(),
            Layout::from_size_align(100, 32),
        ];
        let mut blocks: Vec<Block> = layouts.iter().map(|&l| heap.allocate(l).unwrap()).collect();

        for (i, block) in blocks.iter_mut().enumerate() {
            unsafe { block.as_bytes_mut().iter_mut().for_each(|b| *b = i as u8) };
        }

        let middle = blocks.remove(1);
        unsafe { heap.deallocate(middle, layouts[1]) };
        let last = blocks.pop().unwrap();
        assert!(unsafe { last.as_bytes() }.iter().all(|&b| b == 2));
        unsafe { heap.deallocate(last, layouts[2]) };
        let first = blocks.pop().unwrap();
        assert_eq!(unsafe { first.as_bytes() }, &[0]);
        unsafe { heap.deallocate(first, layouts[0]) };
    }

    #[test]
    fn test_exhaustion() {
        let heap = HeapAllocator::with_source(CappedHeap::<LibcHeap>::new(256));
        let layout = Layout::from_size_align(200, 8);

        let block = heap.allocate(layout).unwrap();
        let used = HeapAllocator::<LibcHeap>::raw_size(layout).unwrap();
        assert_eq!(heap.source().in_use(), used);
        assert!(heap.allocate(layout).is_none());
        assert!(heap.allocate_zeroed(layout).is_none());

        unsafe { heap.deallocate(block, layout) };
        assert_eq!(heap.source().in_use(), 0);
        assert_eq!(heap.source().remaining(), 256);

        let block = heap.allocate(layout).expect("space is available again");
        unsafe { heap.deallocate(block, layout) };
    }

    #[test]
    fn test_unsatisfiable_size() {
        let heap = HeapAllocator::<LibcHeap>::new();
        assert!(heap.allocate(Layout::from_size_align(usize::MAX - 4, 8)).is_none());
    }

    #[test]
    fn test_grow_shrink_round_trip() {
        let heap = HeapAllocator::<LibcHeap>::new();
        let small = Layout::array::<u16>(4);
        let large = Layout::array::<u16>(64);

        let block = heap.allocate(small).unwrap();
        unsafe {
            let values = block.cast::<u16>().as_ptr();
            for i in 0..4 {
                values.add(i).write(100 + i as u16);
            }
        }

        let block = unsafe { heap.grow_zeroed(block, small, large) }.unwrap();
        let values = unsafe { core::slice::from_raw_parts(block.cast::<u16>().as_ptr(), 64) };
        assert_eq!(&values[..4], &[100, 101, 102, 103]);
        assert!(values[4..].iter().all(|&v| v == 0));

        let block = unsafe { heap.shrink(block, large, small) }.unwrap();
        let values = unsafe { core::slice::from_raw_parts(block.cast::<u16>().as_ptr(), 4) };
        assert_eq!(values, &[100, 101, 102, 103]);
        unsafe { heap.deallocate(block, small) };
    }

    #[test]
    fn test_failed_grow_keeps_block() {
        let heap = HeapAllocator::with_source(CappedHeap::<LibcHeap>::new(128));
        let small = Layout::from_size_align(8, 8);
        let large = Layout::from_size_align(512, 8);

        let block = heap.allocate(small).unwrap();
        unsafe { block.cast::<u64>().as_ptr().write(42) };
        let in_use = heap.source().in_use();

        let block = unsafe { heap.grow(block, small, large) }.unwrap_err();
        assert_eq!(heap.source().in_use(), in_use);
        assert_eq!(unsafe { *block.cast::<u64>().as_ptr() }, 42);
        unsafe { heap.deallocate(block, small) };
        assert_eq!(heap.source().in_use(), 0);
    }

    #[test]
    fn test_as_trait_object() {
        let heap = HeapAllocator::<LibcHeap>::new();
        let alloc: &dyn Allocator = &heap;
        let layout = Layout::from_size_align(32, 16);
        let block = alloc.allocate_zeroed(layout).unwrap();
        assert!(unsafe { block.as_bytes() }.iter().all(|&b| b == 0));
        unsafe { alloc.deallocate(block, layout) };
    }

    #[test]
    #[should_panic(expected = "wrong allocator or layout")]
    fn test_foreign_block() {
        let heap = HeapAllocator::<LibcHeap>::new();
        // An offset slot of zero can never be written by `allocate`.
        let mut fake = [0usize; 4];
        let ptr = NonNull::new(fake[2..].as_mut_ptr() as *mut u8).unwrap();
        let block = unsafe { Block::from_raw_parts(ptr, 8) };
        unsafe { heap.deallocate(block, Layout::of::<usize>()) };
    }
}

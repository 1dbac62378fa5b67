//! A bump allocator over a fixed, caller-owned buffer.
//!
//! Every allocation reserves a footprint of `size + align` bytes at the
//! cursor, and places an aligned block inside it:
//!
//! ```text
//!   buffer: |------ live ------|pad|## block ##|rest|----- free -----|
//!                              ^                    ^
//!                           footprint             cursor
//!                             start
//! ```
//!
//! Reserving a full alignment of padding makes the footprint independent of
//! where the buffer sits in memory, so deallocating the most recent block
//! rewinds the cursor to exactly where it was before that allocation.

use core::cell::Cell;
use core::marker::PhantomData;
use core::ptr::NonNull;

use crate::allocator::{Allocator, Block};
use crate::layout::{align_up, Layout};

/// Allocates from a fixed buffer by advancing a cursor.
///
/// Deallocation follows stack discipline: only the most recently allocated
/// block is given back, by rewinding the cursor. Deallocating any other live
/// block leaves the cursor where it is, and that memory is only recovered by
/// [`reset`](#method.reset). Out-of-order deallocation is a caller error this
/// allocator does not reliably detect.
pub struct BumpAllocator<'buf> {
    start: NonNull<u8>,
    len: usize,
    cursor: Cell<usize>,
    _buf: PhantomData<&'buf mut [u8]>,
}

impl<'buf> BumpAllocator<'buf> {
    /// Create an allocator handing out memory from `buf`.
    pub fn new(buf: &'buf mut [u8]) -> Self {
        let len = buf.len();
        // A slice pointer is never null, even for an empty slice.
        let start = NonNull::from(buf).cast::<u8>();
        BumpAllocator {
            start,
            len,
            cursor: Cell::new(0),
            _buf: PhantomData,
        }
    }

    /// The number of bytes of the buffer reserved so far.
    pub fn position(&self) -> usize {
        self.cursor.get()
    }

    /// The number of bytes not yet reserved.
    pub fn remaining(&self) -> usize {
        self.len - self.cursor.get()
    }

    /// The total size of the buffer.
    pub fn capacity(&self) -> usize {
        self.len
    }

    /// Rewind the cursor to the start of the buffer.
    ///
    /// # Safety
    ///
    /// Every block handed out so far is invalidated. The caller must not use
    /// any of them, or anything pointing into them, afterwards: later
    /// allocations reuse the same bytes.
    pub unsafe fn reset(&mut self) {
        log::trace!("bump reset from {} of {} bytes", self.cursor.get(), self.len);
        self.cursor.set(0);
    }

    /// Whether `ptr` points into this allocator's buffer.
    pub fn owns_ptr(&self, ptr: *const u8) -> bool {
        let addr = ptr as usize;
        let start = self.start.as_ptr() as usize;
        addr >= start && addr - start < self.len
    }

    /// Whether all of `block` lies within this allocator's buffer.
    pub fn owns_block(&self, block: &Block) -> bool {
        self.contains(block.as_ptr() as usize, block.len())
    }

    fn contains(&self, addr: usize, len: usize) -> bool {
        let start = self.start.as_ptr() as usize;
        match addr.checked_sub(start) {
            Some(offset) => offset <= self.len && len <= self.len - offset,
            None => false,
        }
    }

    // The buffer offset of a block of `layout` whose footprint starts at
    // `offset`. Returns `None` on address overflow.
    fn place(&self, offset: usize, layout: Layout) -> Option<usize> {
        let start = self.start.as_ptr() as usize;
        let addr = align_up(start.checked_add(offset)?, layout.align())?;
        Some(addr - start)
    }
}

impl<'buf> Allocator for BumpAllocator<'buf> {
    fn allocate(&self, layout: Layout) -> Option<Block> {
        let cursor = self.cursor.get();
        let footprint = layout.padded_size()?;
        let remaining = self.len.checked_sub(cursor)?;
        if footprint > remaining {
            log::debug!(
                "bump exhausted: need {} bytes for {}@{}, {} remaining",
                footprint,
                layout.size(),
                layout.align(),
                remaining
            );
            return None;
        }

        let offset = self.place(cursor, layout)?;
        self.cursor.set(cursor + footprint);

        // The block ends before `cursor + footprint`, inside the buffer.
        let ptr = unsafe { NonNull::new_unchecked(self.start.as_ptr().add(offset)) };
        log::trace!(
            "bump allocated {}@{} at {:p}, cursor {} -> {}",
            layout.size(),
            layout.align(),
            ptr,
            cursor,
            cursor + footprint
        );
        Some(unsafe { Block::from_raw_parts(ptr, layout.size()) })
    }

    unsafe fn deallocate(&self, block: Block, layout: Layout) {
        contract!(
            self.owns_block(&block),
            "block at {:p} was not allocated by this bump allocator",
            block.as_ptr()
        );

        let cursor = self.cursor.get();
        let offset = block.as_ptr() as usize - self.start.as_ptr() as usize;
        let previous = layout
            .padded_size()
            .and_then(|footprint| cursor.checked_sub(footprint));

        match previous {
            Some(previous) if self.place(previous, layout) == Some(offset) => {
                log::trace!(
                    "bump freed {}@{} at {:p}, cursor {} -> {}",
                    layout.size(),
                    layout.align(),
                    block.as_ptr(),
                    cursor,
                    previous
                );
                self.cursor.set(previous);
            }
            _ => {
                log::trace!(
                    "bump left {}@{} at {:p} in place; not the last block",
                    layout.size(),
                    layout.align(),
                    block.as_ptr()
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use core::mem::MaybeUninit;

    use test_env_log::test;

    fn is_aligned(ptr: *const u8, align: usize) -> bool {
        (ptr as usize) % align == 0
    }

    #[test]
    fn test_small_buffer() {
        let mut buf = [0u8; 16];
        let bump = BumpAllocator::new(&mut buf);
        let layout = Layout::from_size_align(4, 8);

        let block = bump.allocate(layout).expect("first allocation fits");
        assert!(is_aligned(block.as_ptr(), 8));
        assert!(bump.owns_block(&block));
        assert_eq!(block.len(), 4);
        assert_eq!(bump.position(), 12);

        // 4 bytes remain, the footprint is 12.
        assert!(bump.allocate(layout).is_none());
        assert_eq!(bump.position(), 12);

        unsafe { bump.deallocate(block, layout) };
        assert_eq!(bump.position(), 0);
    }

    #[test]
    fn test_reset() {
        let mut buf = [0u8; 16];
        let mut bump = BumpAllocator::new(&mut buf);
        let layout = Layout::from_size_align(4, 8);

        let block = bump.allocate(layout).unwrap();
        let _ = block.into_raw_parts();
        assert!(bump.allocate(layout).is_none());

        unsafe { bump.reset() };
        assert_eq!(bump.position(), 0);
        assert_eq!(bump.remaining(), 16);
        let value = bump.create::<i32>().expect("space after reset");
        unsafe {
            value.as_ptr().write(2);
            assert_eq!(*value.as_ptr(), 2);
        }
    }

    #[test]
    fn test_reset_reuses_memory() {
        let mut buf = [0u8; 32];
        let mut bump = BumpAllocator::new(&mut buf);
        let layout = Layout::from_size_align(8, 8);

        let mut first = bump.allocate(layout).unwrap();
        unsafe { first.as_uninit_mut()[0] = MaybeUninit::new(99) };
        let (first_ptr, _) = first.into_raw_parts();

        unsafe { bump.reset() };
        let mut second = bump.allocate(layout).unwrap();
        // The old block's bytes are handed out again.
        assert_eq!(second.ptr(), first_ptr);
        unsafe {
            second.as_uninit_mut()[0] = MaybeUninit::new(7);
            assert_eq!(second.as_bytes()[0], 7);
            bump.deallocate(second, layout);
        }
        assert_eq!(bump.position(), 0);
    }

    #[test]
    fn test_lifo_restores_cursor() {
        let mut buf = [0u8; 256];
        let bump = BumpAllocator::new(&mut buf);

        let layouts = [
            Layout::from_size_align(3, 1),
            Layout::from_size_align(16, 16),
            Layout::from_size_align(5, 4),
            Layout::from_size_align(8, 8),
        ];

        let mut blocks = Vec::new();
        let mut positions = Vec::new();
        for &layout in &layouts {
            positions.push(bump.position());
            let block = bump.allocate(layout).unwrap();
            assert!(is_aligned(block.as_ptr(), layout.align()));
            assert!(bump.owns_block(&block));
            blocks.push(block);
        }

        while let Some(block) = blocks.pop() {
            let layout = layouts[blocks.len()];
            unsafe { bump.deallocate(block, layout) };
            assert_eq!(bump.position(), positions[blocks.len()]);
        }
        assert_eq!(bump.position(), 0);
    }

    #[test]
    fn test_out_of_order_deallocation_keeps_cursor() {
        let mut buf = [0u8; 64];
        let bump = BumpAllocator::new(&mut buf);
        let layout = Layout::from_size_align(8, 8);

        let first = bump.allocate(layout).unwrap();
        let second = bump.allocate(layout).unwrap();
        let position = bump.position();

        unsafe { bump.deallocate(first, layout) };
        assert_eq!(bump.position(), position);

        unsafe { bump.deallocate(second, layout) };
        assert_eq!(bump.position(), position - 16);
    }

    #[test]
    fn test_grow_and_shrink_in_buffer() {
        let mut buf = [0u8; 128];
        let bump = BumpAllocator::new(&mut buf);
        let small = Layout::array::<u32>(2);
        let large = Layout::array::<u32>(6);

        let block = bump.allocate(small).unwrap();
        unsafe {
            let values = block.cast::<u32>().as_ptr();
            values.write(11);
            values.add(1).write(22);
        }

        let block = unsafe { bump.grow_zeroed(block, small, large) }.unwrap();
        assert!(bump.owns_block(&block));
        let values = unsafe { core::slice::from_raw_parts(block.cast::<u32>().as_ptr(), 6) };
        assert_eq!(values, &[11, 22, 0, 0, 0, 0]);

        let block = unsafe { bump.shrink(block, large, small) }.unwrap();
        let values = unsafe { core::slice::from_raw_parts(block.cast::<u32>().as_ptr(), 2) };
        assert_eq!(values, &[11, 22]);

        // The most recent block can still be handed back.
        let before = bump.position() - small.padded_size().unwrap();
        unsafe { bump.deallocate(block, small) };
        assert_eq!(bump.position(), before);
    }

    #[test]
    fn test_grow_failure_keeps_block() {
        let mut buf = [0u8; 32];
        let bump = BumpAllocator::new(&mut buf);
        let small = Layout::from_size_align(8, 8);
        let large = Layout::from_size_align(64, 8);

        let block = bump.allocate(small).unwrap();
        let ptr = block.ptr();
        let block = unsafe { bump.grow(block, small, large) }.unwrap_err();
        assert_eq!(block.ptr(), ptr);
        assert_eq!(bump.position(), 16);
        unsafe { bump.deallocate(block, small) };
        assert_eq!(bump.position(), 0);
    }

    #[test]
    fn test_ownership_checks() {
        let mut buf = [0u8; 32];
        let start = buf.as_ptr();
        let bump = BumpAllocator::new(&mut buf);

        assert!(bump.owns_ptr(start));
        assert!(bump.owns_ptr(unsafe { start.add(31) }));
        assert!(!bump.owns_ptr(unsafe { start.add(32) }));
        assert!(!bump.owns_ptr(core::ptr::null()));

        let other = [0u8; 8];
        assert!(!bump.owns_ptr(other.as_ptr()));
    }

    #[test]
    #[should_panic(expected = "was not allocated by this bump allocator")]
    fn test_foreign_block() {
        let mut buf = [0u8; 32];
        let mut other = [0u8; 32];
        let bump = BumpAllocator::new(&mut buf);
        let other_bump = BumpAllocator::new(&mut other);

        let layout = Layout::from_size_align(4, 4);
        let block = other_bump.allocate(layout).unwrap();
        unsafe { bump.deallocate(block, layout) };
    }

    #[test]
    fn test_empty_and_oversized() {
        let mut empty: [u8; 0] = [];
        let bump = BumpAllocator::new(&mut empty);
        assert!(bump.allocate(Layout::from_size_align(0, 1)).is_none());

        let mut buf = [0u8; 16];
        let bump = BumpAllocator::new(&mut buf);
        assert!(bump.allocate(Layout::from_size_align(usize::MAX, 2)).is_none());
        assert!(bump.allocate(Layout::from_size_align(8, 16)).is_none());
        assert_eq!(bump.position(), 0);
    }
}

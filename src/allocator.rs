//! The allocator capability.
//!
//! ## [`Allocator`](trait.Allocator.html)
//!
//! A strategy implements two primitives, `allocate` and `deallocate`. Every
//! other operation (`allocate_zeroed`, `grow`, `grow_zeroed`, `shrink` and the
//! typed `create`/`create_array` helpers) is provided on top of them, the same
//! way for every strategy.
//!
//! ## [`Block`](struct.Block.html)
//!
//! A `Block` is a live region of memory handed out by an allocator. It is
//! move-only: passing it to `deallocate`, `grow` or `shrink` gives it up, so
//! the old region cannot be touched after a successful transfer. A failed
//! `grow` or `shrink` hands the original block back.
//!
//! Dropping a `Block` does not free it; that is a leak.

use core::fmt;
use core::mem::MaybeUninit;
use core::ptr::{self, NonNull};

use crate::layout::Layout;

/// A live block of memory, owned by whoever holds this value.
#[must_use = "dropping a Block leaks its memory"]
#[derive(Debug, PartialEq, Eq)]
pub struct Block {
    ptr: NonNull<u8>,
    len: usize,
}

impl Block {
    /// Reassemble a block from its parts.
    ///
    /// # Safety
    ///
    /// `ptr` and `len` must describe a block that is live under some
    /// allocator, and the caller must be its only owner; typically they come
    /// from [`into_raw_parts`](#method.into_raw_parts).
    pub unsafe fn from_raw_parts(ptr: NonNull<u8>, len: usize) -> Block {
        Block { ptr, len }
    }

    /// Give up the `Block` wrapper, keeping ownership of the memory.
    pub fn into_raw_parts(self) -> (NonNull<u8>, usize) {
        (self.ptr, self.len)
    }

    /// The start of the block.
    pub fn ptr(&self) -> NonNull<u8> {
        self.ptr
    }

    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    /// Usable size in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The start of the block, as a pointer to `T`.
    pub fn cast<T>(&self) -> NonNull<T> {
        self.ptr.cast()
    }

    /// The block's memory, which may not be initialized.
    ///
    /// # Safety
    ///
    /// The block must still be live: its allocator has not been reset or
    /// dropped, and the memory behind it has not been released.
    pub unsafe fn as_uninit_mut(&mut self) -> &mut [MaybeUninit<u8>] {
        let ptr = self.ptr.as_ptr() as *mut MaybeUninit<u8>;
        core::slice::from_raw_parts_mut(ptr, self.len)
    }

    /// The block's memory as bytes.
    ///
    /// # Safety
    ///
    /// As for [`as_uninit_mut`](#method.as_uninit_mut). In addition, every
    /// byte of the block must have been initialized, for example by
    /// `allocate_zeroed` or by writing to it.
    pub unsafe fn as_bytes(&self) -> &[u8] {
        core::slice::from_raw_parts(self.ptr.as_ptr(), self.len)
    }

    /// The block's memory as mutable bytes.
    ///
    /// # Safety
    ///
    /// As for [`as_bytes`](#method.as_bytes).
    pub unsafe fn as_bytes_mut(&mut self) -> &mut [u8] {
        core::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len)
    }
}

/// Returned when an allocator could not provide the requested memory.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct AllocError;

impl fmt::Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "memory allocation failed")
    }
}

/// An allocation strategy.
///
/// Implementations provide [`allocate`](#tymethod.allocate) and
/// [`deallocate`](#tymethod.deallocate); the rest are built on those two.
///
/// Methods take `&self`, so one allocator may be shared by several
/// containers. Strategies with internal state (such as a bump cursor) keep it
/// in a `Cell`; none of them are thread-safe.
pub trait Allocator {
    /// Allocate a block fitting `layout`.
    ///
    /// The returned block starts at an address aligned to `layout.align()`
    /// and is `layout.size()` bytes long. Its contents are unspecified.
    ///
    /// Returns `None` when the strategy is out of memory, or cannot satisfy
    /// the layout.
    fn allocate(&self, layout: Layout) -> Option<Block>;

    /// Return a block to this allocator.
    ///
    /// # Safety
    ///
    /// `block` must have been returned by this allocator (from `allocate`,
    /// `grow` or `shrink`), and `layout` must be the layout it was allocated
    /// or last resized with.
    unsafe fn deallocate(&self, block: Block, layout: Layout);

    /// Allocate a block fitting `layout`, with every byte set to zero.
    fn allocate_zeroed(&self, layout: Layout) -> Option<Block> {
        let block = self.allocate(layout)?;
        unsafe { ptr::write_bytes(block.as_ptr(), 0, block.len()) };
        Some(block)
    }

    /// Move `block` into a larger block fitting `new_layout`.
    ///
    /// The first `old_layout.size()` bytes are copied over; the rest of the new
    /// block is unspecified. On success the old block has been deallocated.
    /// If a new block cannot be allocated, the old block is returned as
    /// `Err`, untouched and still owned by the caller.
    ///
    /// # Safety
    ///
    /// As for [`deallocate`](#tymethod.deallocate): `block` must be live under
    /// this allocator with layout `old_layout`.
    #[track_caller]
    unsafe fn grow(
        &self,
        block: Block,
        old_layout: Layout,
        new_layout: Layout,
    ) -> Result<Block, Block> {
        contract!(
            new_layout.size() >= old_layout.size(),
            "grow: new size {} is smaller than old size {}",
            new_layout.size(),
            old_layout.size()
        );
        let new_block = match self.allocate(new_layout) {
            Some(b) => b,
            None => return Err(block),
        };
        ptr::copy_nonoverlapping(block.as_ptr(), new_block.as_ptr(), old_layout.size());
        self.deallocate(block, old_layout);
        Ok(new_block)
    }

    /// Like [`grow`](#method.grow), but the part of the new block past
    /// `old_layout.size()` is zeroed.
    ///
    /// # Safety
    ///
    /// As for [`grow`](#method.grow).
    #[track_caller]
    unsafe fn grow_zeroed(
        &self,
        block: Block,
        old_layout: Layout,
        new_layout: Layout,
    ) -> Result<Block, Block> {
        contract!(
            new_layout.size() >= old_layout.size(),
            "grow_zeroed: new size {} is smaller than old size {}",
            new_layout.size(),
            old_layout.size()
        );
        let new_block = match self.allocate_zeroed(new_layout) {
            Some(b) => b,
            None => return Err(block),
        };
        ptr::copy_nonoverlapping(block.as_ptr(), new_block.as_ptr(), old_layout.size());
        self.deallocate(block, old_layout);
        Ok(new_block)
    }

    /// Move `block` into a smaller block fitting `new_layout`, keeping its
    /// first `new_layout.size()` bytes.
    ///
    /// Failure behaves as for [`grow`](#method.grow).
    ///
    /// # Safety
    ///
    /// As for [`grow`](#method.grow).
    #[track_caller]
    unsafe fn shrink(
        &self,
        block: Block,
        old_layout: Layout,
        new_layout: Layout,
    ) -> Result<Block, Block> {
        contract!(
            new_layout.size() <= old_layout.size(),
            "shrink: new size {} is larger than old size {}",
            new_layout.size(),
            old_layout.size()
        );
        let new_block = match self.allocate(new_layout) {
            Some(b) => b,
            None => return Err(block),
        };
        ptr::copy_nonoverlapping(block.as_ptr(), new_block.as_ptr(), new_layout.size());
        self.deallocate(block, old_layout);
        Ok(new_block)
    }

    /// Allocate zeroed memory for one `T`.
    ///
    /// The memory is not a valid `T` unless all-zero bytes are one; write a
    /// value before reading it. A zero-sized `T` gets a dangling pointer and
    /// no allocation. Free with [`destroy`](#method.destroy).
    fn create<T>(&self) -> Option<NonNull<T>>
    where
        Self: Sized,
    {
        let layout = Layout::of::<T>();
        if layout.size() == 0 {
            return Some(NonNull::dangling());
        }
        self.allocate_zeroed(layout).map(|b| b.into_raw_parts().0.cast())
    }

    /// Free memory from [`create`](#method.create). The value is not dropped.
    ///
    /// # Safety
    ///
    /// `ptr` must come from `create::<T>` on this allocator, and must not be
    /// used afterwards.
    unsafe fn destroy<T>(&self, ptr: NonNull<T>)
    where
        Self: Sized,
    {
        let layout = Layout::of::<T>();
        if layout.size() == 0 {
            return;
        }
        self.deallocate(Block::from_raw_parts(ptr.cast(), layout.size()), layout);
    }

    /// Allocate zeroed memory for `len` values of `T`.
    ///
    /// As with [`create`](#method.create), the elements are not initialized
    /// `T`s. Requests of zero bytes return a dangling slice without
    /// allocating. Panics if the array size overflows.
    #[track_caller]
    fn create_array<T>(&self, len: usize) -> Option<NonNull<[T]>>
    where
        Self: Sized,
    {
        let layout = Layout::array::<T>(len);
        let ptr = if layout.size() == 0 {
            NonNull::dangling()
        } else {
            self.allocate_zeroed(layout)?.into_raw_parts().0.cast()
        };
        Some(NonNull::slice_from_raw_parts(ptr, len))
    }

    /// Free memory from [`create_array`](#method.create_array). Elements are
    /// not dropped.
    ///
    /// # Safety
    ///
    /// `slice` must come from `create_array::<T>` on this allocator (or be an
    /// owned slice from this allocator with the same length), and must not be
    /// used afterwards.
    unsafe fn destroy_array<T>(&self, slice: NonNull<[T]>)
    where
        Self: Sized,
    {
        let layout = Layout::array::<T>(slice.len());
        if layout.size() == 0 {
            return;
        }
        let ptr: NonNull<u8> = slice.cast();
        self.deallocate(Block::from_raw_parts(ptr, layout.size()), layout);
    }
}

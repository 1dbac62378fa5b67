//! A growable array that does not own an allocator.
//!
//! [`GrowableArray`](struct.GrowableArray.html) stores only a pointer, a
//! length and a capacity. Every operation that may allocate or free takes the
//! allocator as an argument, and it must be the same allocator every time: the
//! array cannot check which allocator produced its storage. For that reason
//! those operations are `unsafe`.
//!
//! Dropping an array does not free its storage or drop its elements; call
//! [`deinit`](struct.GrowableArray.html#method.deinit) for that. An array with
//! zero capacity holds no memory, and zero-sized element types never
//! allocate.

use core::fmt;
use core::marker::PhantomData;
use core::mem;
use core::ops::{Deref, DerefMut};
use core::ptr::{self, NonNull};
use core::slice;

use crate::allocator::{AllocError, Allocator, Block};
use crate::layout::Layout;

/// A contiguous, growable sequence of `T`, with storage from an
/// [`Allocator`](../allocator/trait.Allocator.html) passed to each call.
///
/// # Safety
///
/// Methods marked `unsafe` take the allocator. The allocator must be the one
/// that allocated the array's current storage. While the array has zero
/// capacity, any allocator may be used, and the one used then becomes the
/// array's allocator.
///
/// Growing moves the elements, so references into the array never survive a
/// call that takes an allocator; the borrow checker enforces this.
pub struct GrowableArray<T> {
    ptr: NonNull<T>,
    len: usize,
    cap: usize,
    _marker: PhantomData<T>,
}

impl<T> GrowableArray<T> {
    const IS_ZST: bool = mem::size_of::<T>() == 0;

    /// An empty array, holding no memory.
    pub const fn new() -> Self {
        GrowableArray {
            ptr: NonNull::dangling(),
            len: 0,
            cap: if mem::size_of::<T>() == 0 { usize::MAX } else { 0 },
            _marker: PhantomData,
        }
    }

    /// An empty array with room for `capacity` elements, allocated from
    /// `alloc`.
    pub fn with_capacity<A>(alloc: &A, capacity: usize) -> Result<Self, AllocError>
    where
        A: Allocator + ?Sized,
    {
        let mut array = GrowableArray::new();
        if capacity > array.cap {
            // Nothing is allocated yet, so any allocator is the right one.
            unsafe { array.reallocate(alloc, capacity)? };
        }
        Ok(array)
    }

    /// Adopt a caller-owned slice as an array's storage. The array's length
    /// and capacity are both the slice's length.
    ///
    /// # Safety
    ///
    /// Every element of `slice` must be initialized, and its memory must be a
    /// block allocated for exactly `Layout::array::<T>(slice.len())` (as from
    /// [`to_owned_slice`](#method.to_owned_slice) or
    /// [`Allocator::create_array`](../allocator/trait.Allocator.html#method.create_array)).
    /// The array takes ownership; later calls must use the allocator that
    /// allocated it.
    pub unsafe fn from_owned_slice(slice: NonNull<[T]>) -> Self {
        let len = slice.len();
        let mut array = GrowableArray::new();
        if Self::IS_ZST || len == 0 {
            array.len = len;
            return array;
        }
        array.ptr = slice.cast();
        array.len = len;
        array.cap = len;
        array
    }

    /// The number of elements.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The number of elements the array can hold without reallocating.
    pub fn capacity(&self) -> usize {
        self.cap
    }

    pub fn as_ptr(&self) -> *const T {
        self.ptr.as_ptr()
    }

    /// The elements, which remain owned by the array.
    pub fn as_slice(&self) -> &[T] {
        unsafe { slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        unsafe { slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }

    /// Make sure there is room for `additional` more elements.
    ///
    /// When the capacity is too small, it is doubled (starting from 1) until
    /// it is large enough, and the storage is moved with the allocator's
    /// `grow`. A length that exactly fills the capacity does not grow. On
    /// failure the array is unchanged.
    ///
    /// Panics if the required capacity overflows `usize`.
    ///
    /// # Safety
    ///
    /// See [the type-level docs](#safety).
    #[track_caller]
    pub unsafe fn reserve<A>(&mut self, alloc: &A, additional: usize) -> Result<(), AllocError>
    where
        A: Allocator + ?Sized,
    {
        let required = match self.len.checked_add(additional) {
            Some(required) => required,
            None => crate::contract::violation(format_args!(
                "length {} plus {} more elements overflows",
                self.len, additional
            )),
        };
        if required <= self.cap {
            return Ok(());
        }

        let mut new_cap = if self.cap == 0 { 1 } else { self.cap };
        while new_cap < required {
            new_cap = match new_cap.checked_mul(2) {
                Some(doubled) => doubled,
                None => crate::contract::violation(format_args!(
                    "capacity for {} elements overflows",
                    required
                )),
            };
        }
        self.reallocate(alloc, new_cap)
    }

    // Move the storage into a block for exactly `new_cap` elements, where
    // `new_cap` is larger than the current capacity.
    #[track_caller]
    unsafe fn reallocate<A>(&mut self, alloc: &A, new_cap: usize) -> Result<(), AllocError>
    where
        A: Allocator + ?Sized,
    {
        debug_assert!(!Self::IS_ZST && new_cap > self.cap);
        let new_layout = Layout::array::<T>(new_cap);

        let result = if self.cap == 0 {
            alloc.allocate(new_layout).ok_or(AllocError)
        } else {
            let old_layout = Layout::array::<T>(self.cap);
            let block = Block::from_raw_parts(self.ptr.cast(), old_layout.size());
            alloc
                .grow(block, old_layout, new_layout)
                .map_err(|block| {
                    // Still ours, still at `self.ptr`.
                    let _ = block.into_raw_parts();
                    AllocError
                })
        };

        match result {
            Ok(block) => {
                log::debug!("array capacity {} -> {}", self.cap, new_cap);
                self.ptr = block.into_raw_parts().0.cast();
                self.cap = new_cap;
                Ok(())
            }
            Err(err) => {
                log::debug!("array could not grow from {} to {}", self.cap, new_cap);
                Err(err)
            }
        }
    }

    /// Add `value` to the end of the array, growing it if needed.
    ///
    /// Amortized O(1). On failure the array is unchanged and `value` is
    /// dropped.
    ///
    /// # Safety
    ///
    /// See [the type-level docs](#safety).
    pub unsafe fn append<A>(&mut self, alloc: &A, value: T) -> Result<(), AllocError>
    where
        A: Allocator + ?Sized,
    {
        self.reserve(alloc, 1)?;
        self.ptr.as_ptr().add(self.len).write(value);
        self.len += 1;
        Ok(())
    }

    /// Insert `value` at `idx`, shifting the elements from `idx` onwards one
    /// place to the right. Inserting at `len()` is the same as `append`.
    ///
    /// O(n). Panics if `idx > len()`.
    ///
    /// # Safety
    ///
    /// See [the type-level docs](#safety).
    #[track_caller]
    pub unsafe fn insert<A>(&mut self, alloc: &A, idx: usize, value: T) -> Result<(), AllocError>
    where
        A: Allocator + ?Sized,
    {
        contract!(
            idx <= self.len,
            "insert index {} is out of bounds for length {}",
            idx,
            self.len
        );
        if idx == self.len {
            return self.append(alloc, value);
        }

        self.reserve(alloc, 1)?;
        let slot = self.ptr.as_ptr().add(idx);
        ptr::copy(slot, slot.add(1), self.len - idx);
        slot.write(value);
        self.len += 1;
        Ok(())
    }

    /// Remove and return the element at `idx`, shifting the following
    /// elements left. Keeps the order of the remaining elements.
    ///
    /// O(n). Panics if `idx >= len()`.
    #[track_caller]
    pub fn remove(&mut self, idx: usize) -> T {
        contract!(
            idx < self.len,
            "remove index {} is out of bounds for length {}",
            idx,
            self.len
        );
        unsafe {
            let slot = self.ptr.as_ptr().add(idx);
            let value = slot.read();
            ptr::copy(slot.add(1), slot, self.len - idx - 1);
            self.len -= 1;
            value
        }
    }

    /// Remove and return the element at `idx`, moving the last element into
    /// its place.
    ///
    /// O(1), but does not keep the order. Panics if `idx >= len()`.
    #[track_caller]
    pub fn swap_remove(&mut self, idx: usize) -> T {
        contract!(
            idx < self.len,
            "swap_remove index {} is out of bounds for length {}",
            idx,
            self.len
        );
        unsafe {
            let base = self.ptr.as_ptr();
            let value = base.add(idx).read();
            let last = self.len - 1;
            if idx != last {
                ptr::copy_nonoverlapping(base.add(last), base.add(idx), 1);
            }
            self.len = last;
            value
        }
    }

    /// Remove and return the last element, if any.
    pub fn pop(&mut self) -> Option<T> {
        if self.len == 0 {
            return None;
        }
        self.len -= 1;
        Some(unsafe { self.ptr.as_ptr().add(self.len).read() })
    }

    /// Drop every element, keeping the storage.
    pub fn clear(&mut self) {
        let len = self.len;
        self.len = 0;
        unsafe { ptr::drop_in_place(ptr::slice_from_raw_parts_mut(self.ptr.as_ptr(), len)) };
    }

    /// Hand the elements to the caller as an owned slice of exactly `len()`
    /// elements, leaving the array empty with no storage.
    ///
    /// If the array is full this gives away the storage as is; otherwise the
    /// storage is shrunk with the allocator's `shrink`, or freed when the
    /// array is empty. On failure the array is unchanged.
    ///
    /// Afterwards `capacity()` is 0, except for zero-sized `T`: such an array
    /// never holds storage and always reports `usize::MAX`.
    ///
    /// The slice must eventually be freed with the same allocator, for
    /// example with [`Allocator::destroy_array`] after dropping its elements,
    /// or given back to an array with [`from_owned_slice`].
    ///
    /// # Safety
    ///
    /// See [the type-level docs](#safety).
    ///
    /// [`Allocator::destroy_array`]: ../allocator/trait.Allocator.html#method.destroy_array
    /// [`from_owned_slice`]: #method.from_owned_slice
    pub unsafe fn to_owned_slice<A>(&mut self, alloc: &A) -> Result<NonNull<[T]>, AllocError>
    where
        A: Allocator + ?Sized,
    {
        let len = self.len;
        let ptr = if Self::IS_ZST || self.cap == 0 {
            NonNull::dangling()
        } else if len == self.cap {
            self.ptr
        } else if len == 0 {
            self.free_storage(alloc);
            NonNull::dangling()
        } else {
            let old_layout = Layout::array::<T>(self.cap);
            let new_layout = Layout::array::<T>(len);
            let block = Block::from_raw_parts(self.ptr.cast(), old_layout.size());
            match alloc.shrink(block, old_layout, new_layout) {
                Ok(block) => block.into_raw_parts().0.cast(),
                Err(block) => {
                    let _ = block.into_raw_parts();
                    log::debug!("array could not shrink from {} to {}", self.cap, len);
                    return Err(AllocError);
                }
            }
        };

        *self = GrowableArray::new();
        Ok(NonNull::slice_from_raw_parts(ptr, len))
    }

    /// Drop every element and give the storage back to `alloc`, leaving an
    /// empty array with no storage.
    ///
    /// # Safety
    ///
    /// See [the type-level docs](#safety).
    pub unsafe fn deinit<A>(&mut self, alloc: &A)
    where
        A: Allocator + ?Sized,
    {
        self.clear();
        self.free_storage(alloc);
    }

    unsafe fn free_storage<A>(&mut self, alloc: &A)
    where
        A: Allocator + ?Sized,
    {
        if !Self::IS_ZST && self.cap != 0 {
            let layout = Layout::array::<T>(self.cap);
            let block = Block::from_raw_parts(self.ptr.cast(), layout.size());
            alloc.deallocate(block, layout);
        }
        self.ptr = NonNull::dangling();
        self.cap = GrowableArray::<T>::new().cap;
    }
}

impl<T: Clone> GrowableArray<T> {
    /// Add clones of `items` to the end of the array, growing it at most once.
    ///
    /// On allocation failure the array is unchanged.
    ///
    /// # Safety
    ///
    /// See [the type-level docs](#safety).
    pub unsafe fn append_slice<A>(&mut self, alloc: &A, items: &[T]) -> Result<(), AllocError>
    where
        A: Allocator + ?Sized,
    {
        self.reserve(alloc, items.len())?;
        for item in items {
            self.ptr.as_ptr().add(self.len).write(item.clone());
            self.len += 1;
        }
        Ok(())
    }

    /// Insert clones of `items` starting at `idx`, shifting the elements from
    /// `idx` onwards to the right.
    ///
    /// O(n). Panics if `idx > len()`.
    ///
    /// # Safety
    ///
    /// See [the type-level docs](#safety).
    #[track_caller]
    pub unsafe fn insert_slice<A>(
        &mut self,
        alloc: &A,
        idx: usize,
        items: &[T],
    ) -> Result<(), AllocError>
    where
        A: Allocator + ?Sized,
    {
        contract!(
            idx <= self.len,
            "insert_slice index {} is out of bounds for length {}",
            idx,
            self.len
        );
        self.append_slice(alloc, items)?;
        self.as_mut_slice()[idx..].rotate_right(items.len());
        Ok(())
    }

    /// A copy of this array with the same capacity, allocated from `alloc`.
    ///
    /// `alloc` need not be this array's allocator; it becomes the copy's.
    pub fn clone_in<A>(&self, alloc: &A) -> Result<Self, AllocError>
    where
        A: Allocator + ?Sized,
    {
        let mut cloned = GrowableArray::with_capacity(alloc, self.cap)?;
        // The capacity is already there, so nothing is allocated here.
        unsafe { cloned.append_slice(alloc, self.as_slice())? };
        Ok(cloned)
    }
}

impl<T> Default for GrowableArray<T> {
    fn default() -> Self {
        GrowableArray::new()
    }
}

impl<T> Deref for GrowableArray<T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        self.as_slice()
    }
}

impl<T> DerefMut for GrowableArray<T> {
    fn deref_mut(&mut self) -> &mut [T] {
        self.as_mut_slice()
    }
}

impl<T: fmt::Debug> fmt::Debug for GrowableArray<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.as_slice()).finish()
    }
}

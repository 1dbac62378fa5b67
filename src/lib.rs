#![cfg_attr(not(test), no_std)]

//! Explicit, allocator-passing memory management.
//!
//! ## Basic Types
//!
//! ### [`Allocator`](allocator/trait.Allocator.html)
//!
//! The allocation capability. A strategy implements `allocate` and
//! `deallocate`; zeroed allocation, `grow`, `grow_zeroed`, `shrink` and the
//! typed `create`/`create_array` helpers come for free. Allocation hands out a
//! move-only [`Block`](allocator/struct.Block.html), so a block given up to
//! `grow` or `shrink` cannot be touched again.
//!
//! ### [`HeapAllocator`](heap/struct.HeapAllocator.html)
//!
//! General purpose allocation from the process heap, for any alignment up to
//! [`MAX_ALIGNMENT`](layout/constant.MAX_ALIGNMENT.html), freed in any order.
//!
//! ### [`BumpAllocator`](bump/struct.BumpAllocator.html)
//!
//! Allocation from a fixed buffer by advancing a cursor. Only the most recent
//! block can be given back; `reset` recovers everything at once.
//!
//! ### [`GrowableArray`](array/struct.GrowableArray.html)
//!
//! A growable array that never stores an allocator: every call that may
//! allocate takes one.
//!
//! ## Errors
//!
//! Running out of memory is reported as `None` or `Err`, and leaves
//! everything as it was. Breaking a precondition (a bad alignment, an index
//! out of bounds, a size that overflows) is a bug, and panics after logging
//! the violation through the `log` crate.
//!
//! Nothing here is thread-safe.
//!
//! ## Example
//!
//! ```rust
//! use basic_mem::{BumpAllocator, GrowableArray};
//!
//! let mut buf = [0u8; 256];
//! let bump = BumpAllocator::new(&mut buf);
//!
//! let mut array = GrowableArray::new();
//! unsafe {
//!     array.append(&bump, 10).unwrap();
//!     array.append(&bump, 30).unwrap();
//!     array.insert(&bump, 1, 20).unwrap();
//! }
//! assert_eq!(array.as_slice(), &[10, 20, 30]);
//! unsafe { array.deinit(&bump) };
//! ```

#[macro_use]
mod contract;

pub mod allocator;
pub mod array;
pub mod bump;
pub mod heap;
pub mod layout;

pub use allocator::{AllocError, Allocator, Block};
pub use array::GrowableArray;
pub use bump::BumpAllocator;
pub use heap::{CappedHeap, HeapAllocator, HeapSource, LibcHeap};
pub use layout::{Layout, MAX_ALIGNMENT};

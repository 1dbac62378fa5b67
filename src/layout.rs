use core::mem;

use static_assertions::const_assert;

/// The largest alignment a [`Layout`](struct.Layout.html) may request.
pub const MAX_ALIGNMENT: usize = 1 << 16;
const_assert!(MAX_ALIGNMENT.is_power_of_two());

/// Describes a request for memory: a size in bytes and an alignment.
///
/// The alignment is always a power of two, no larger than
/// [`MAX_ALIGNMENT`](constant.MAX_ALIGNMENT.html). Constructing a layout that
/// breaks this is a contract violation.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Layout {
    size: usize,
    align: usize,
}

impl Layout {
    /// Create a layout from a size and an alignment.
    ///
    /// Panics if `align` is not a power of two, or exceeds `MAX_ALIGNMENT`.
    #[track_caller]
    pub fn from_size_align(size: usize, align: usize) -> Layout {
        contract!(
            align.is_power_of_two(),
            "alignment {} must be a power of 2",
            align
        );
        contract!(
            align <= MAX_ALIGNMENT,
            "alignment {} exceeds the maximum of {}",
            align,
            MAX_ALIGNMENT
        );
        Layout { size, align }
    }

    /// A layout suitable for holding a value of type `T`.
    #[track_caller]
    pub fn of<T>() -> Layout {
        Layout::from_size_align(mem::size_of::<T>(), mem::align_of::<T>())
    }

    /// A layout for an array of `len` values of type `T`.
    ///
    /// Panics if the total size overflows `usize`.
    #[track_caller]
    pub fn array<T>(len: usize) -> Layout {
        let size = match mem::size_of::<T>().checked_mul(len) {
            Some(size) => size,
            None => crate::contract::violation(format_args!(
                "array of {} elements of {} bytes overflows",
                len,
                mem::size_of::<T>()
            )),
        };
        Layout::from_size_align(size, mem::align_of::<T>())
    }

    /// A layout suitable for holding `value`.
    #[track_caller]
    pub fn for_value<T>(value: &T) -> Layout {
        Layout::from_size_align(mem::size_of_val(value), mem::align_of::<T>())
    }

    /// A layout suitable for holding the elements of `slice`.
    #[track_caller]
    pub fn for_slice<T>(slice: &[T]) -> Layout {
        Layout::array::<T>(slice.len())
    }

    /// The size in bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    /// The alignment in bytes.
    pub fn align(&self) -> usize {
        self.align
    }

    /// The number of bytes needed to place a block of this layout at an
    /// arbitrary address: the size plus one alignment of padding.
    ///
    /// Returns `None` if that overflows.
    pub(crate) fn padded_size(&self) -> Option<usize> {
        self.size.checked_add(self.align)
    }
}

/// Round `value` up to the nearest multiple of `align`, which must be a power
/// of two. Returns `None` on overflow.
pub(crate) fn align_up(value: usize, align: usize) -> Option<usize> {
    debug_assert!(align.is_power_of_two());
    let mask = align - 1;
    value.checked_add(mask).map(|v| v & !mask)
}

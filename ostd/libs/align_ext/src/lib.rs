// SPDX-License-Identifier: MPL-2.0

#![cfg_attr(not(test), no_std)]

/// An extension trait for unsigned integers that are used as addresses,
/// providing alignment and boundary arithmetic.
///
/// Alignments may be any power of two, including 1.
pub trait AlignExt: Sized {
    /// Returns the smallest number that is greater than or equal to `self`
    /// and is a multiple of `align`, or `None` on overflow.
    ///
    /// # Panics
    ///
    /// Panics if `align` is not a power of two.
    ///
    /// # Examples
    ///
    /// ```
    /// use align_ext::AlignExt;
    /// assert_eq!(12u64.checked_align_up(1), Some(12));
    /// assert_eq!(12u64.checked_align_up(8), Some(16));
    /// assert_eq!(u64::MAX.checked_align_up(8), None);
    /// ```
    fn checked_align_up(self, align: Self) -> Option<Self>;

    /// Returns the greatest number that is smaller than or equal to `self`
    /// and is a multiple of `align`.
    ///
    /// # Panics
    ///
    /// Panics if `align` is not a power of two.
    fn align_down(self, align: Self) -> Self;

    /// Returns whether `self` is a multiple of `align`.
    fn is_aligned_to(self, align: Self) -> bool;

    /// Returns whether the range `[self, self + len)` straddles a multiple of
    /// `boundary`.
    ///
    /// An empty range never straddles, and a range that ends exactly on a
    /// boundary does not straddle it.
    ///
    /// # Examples
    ///
    /// ```
    /// use align_ext::AlignExt;
    /// assert!(!0xff0u64.crosses_boundary(0x10, 0x1000));
    /// assert!(0xff0u64.crosses_boundary(0x11, 0x1000));
    /// ```
    fn crosses_boundary(self, len: Self, boundary: Self) -> bool;
}

macro_rules! impl_align_ext {
    ($( $uint_type:ty ),+,) => {
        $(
            impl AlignExt for $uint_type {
                #[inline]
                fn checked_align_up(self, align: Self) -> Option<Self> {
                    assert!(align.is_power_of_two());
                    Some(self.checked_add(align - 1)? & !(align - 1))
                }

                #[inline]
                fn align_down(self, align: Self) -> Self {
                    assert!(align.is_power_of_two());
                    self & !(align - 1)
                }

                #[inline]
                fn is_aligned_to(self, align: Self) -> bool {
                    assert!(align.is_power_of_two());
                    self & (align - 1) == 0
                }

                #[inline]
                fn crosses_boundary(self, len: Self, boundary: Self) -> bool {
                    if len == 0 {
                        return false;
                    }
                    let last = self.saturating_add(len - 1);
                    self.align_down(boundary) != last.align_down(boundary)
                }
            }
        )*
    }
}

impl_align_ext! {
    u32,
    u64,
    usize,
}

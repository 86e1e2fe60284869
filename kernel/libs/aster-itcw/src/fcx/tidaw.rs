// SPDX-License-Identifier: MPL-2.0

use bitflags::bitflags;
use zerocopy::{
    FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned,
    byteorder::big_endian::{U32, U64},
};

use super::TIDAW_SIZE;
use crate::arena::Daddr;

bitflags! {
    pub struct TidawFlags: u8 {
        /// Last TIDAW of the list.
        const LAST = 1 << (7 - 0);
        /// Skip the data instead of transferring it.
        const SKIP = 1 << (7 - 1);
        /// Request an interrupt once the data has been transferred.
        const DATA_INT = 1 << (7 - 2);
        /// Transfer in channel: continue with the TIDAW list at `addr`.
        const TTIC = 1 << (7 - 3);
        /// Insert count-byte-check padding after the data.
        const INSERT_CBC = 1 << (7 - 4);
    }
}

/// Transport Indirect Data Address Word.
///
/// Describes one contiguous piece of the data of a transfer, or, with
/// [`TidawFlags::TTIC`], where the TIDAW list continues.
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
pub struct Tidaw {
    flags: u8,
    _reserved: [u8; 3],
    count: U32,
    addr: U64,
}

const _: () = assert!(size_of::<Tidaw>() == TIDAW_SIZE);

impl Tidaw {
    pub fn new(flags: TidawFlags, addr: Daddr, count: u32) -> Self {
        Self {
            flags: flags.bits(),
            _reserved: [0; 3],
            count: U32::new(count),
            addr: U64::new(addr),
        }
    }

    pub fn flags(&self) -> TidawFlags {
        TidawFlags::from_bits_truncate(self.flags)
    }

    pub fn set_flags(&mut self, flags: TidawFlags) {
        self.flags = flags.bits();
    }

    pub fn count(&self) -> u32 {
        self.count.get()
    }

    pub fn addr(&self) -> Daddr {
        self.addr.get()
    }

    /// Returns whether this TIDAW redirects the channel to another part of
    /// the list rather than describing data.
    pub fn is_ttic(&self) -> bool {
        self.flags().contains(TidawFlags::TTIC)
    }
}

/// Returns the number of count-byte-check padding bytes the channel inserts
/// while transferring the data described by `tidaws`.
///
/// Padding is applied to the running total of the transferred data. The
/// walk stops at the first TIDAW marked [`TidawFlags::LAST`].
pub(crate) fn cbc_size(tidaws: &[Tidaw]) -> u32 {
    let mut cbc_count: u32 = 0;
    let mut data_count: u64 = 0;
    for tidaw in tidaws {
        let flags = tidaw.flags();
        if flags.contains(TidawFlags::LAST) {
            break;
        }
        data_count += tidaw.count() as u64;
        if flags.contains(TidawFlags::INSERT_CBC) {
            let cbc_data = 4 + data_count.next_multiple_of(4) - data_count;
            cbc_count = cbc_count.wrapping_add(cbc_data as u32);
            data_count += cbc_data;
        }
    }
    cbc_count
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn wire_format() {
        let tidaw = Tidaw::new(TidawFlags::TTIC | TidawFlags::LAST, 0x1122_3344_5566, 0x800);
        assert_eq!(
            tidaw.as_bytes(),
            &[
                0x90, 0, 0, 0, 0, 0, 0x08, 0, 0, 0, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66
            ]
        );
        assert!(tidaw.is_ttic());
    }

    #[test]
    fn cbc_padding_accumulates() {
        let tidaws = [
            Tidaw::new(TidawFlags::INSERT_CBC, 0x1000, 6),
            Tidaw::new(TidawFlags::empty(), 0x2000, 3),
            Tidaw::new(TidawFlags::INSERT_CBC, 0x3000, 1),
            Tidaw::new(TidawFlags::LAST | TidawFlags::INSERT_CBC, 0x4000, 100),
        ];
        // 6 bytes -> 2 + 4 padding (12), +3 +1 = 16 -> 0 + 4 padding.
        assert_eq!(cbc_size(&tidaws), 10);
    }

    #[test]
    fn cbc_without_marks() {
        let tidaws = [Tidaw::new(TidawFlags::empty(), 0x1000, 4096); 3];
        assert_eq!(cbc_size(&tidaws), 0);
        assert_eq!(cbc_size(&[]), 0);
    }
}

// SPDX-License-Identifier: MPL-2.0

use bitflags::bitflags;
use zerocopy::{
    FromBytes, FromZeros, Immutable, IntoBytes, KnownLayout, Unaligned,
    byteorder::big_endian::{U32, U64},
};

use super::{TCW_FORMAT_DEFAULT, TCW_SIZE, TCW_TIDAW_FORMAT_DEFAULT};
use crate::arena::Daddr;

const FORMAT_SHIFT: u32 = 30;
const FLAGS_MASK: u32 = 0x00ff_ffff;
const TIDAW_FORMAT_SHIFT: u32 = 23 - 9;

const TCCBL_SHIFT: u8 = 2;
const TCCBL_MASK: u8 = 0x3f;
const READ_BIT: u8 = 1 << 1;
const WRITE_BIT: u8 = 1 << 0;

bitflags! {
    /// Flags in the 24-bit flags field of a TCW.
    pub struct TcwFlags: u32 {
        /// The input data address points to a TIDAW list.
        const INPUT_TIDA = 1 << (23 - 5);
        /// The TCCB address points to a TIDAW list.
        const TCCB_TIDA = 1 << (23 - 6);
        /// The output data address points to a TIDAW list.
        const OUTPUT_TIDA = 1 << (23 - 7);
        /// The TIDAW format field.
        const TIDAW_FORMAT = 0b11 << TIDAW_FORMAT_SHIFT;
    }
}

impl TcwFlags {
    /// Returns the flags selecting TIDAW format `format`.
    pub const fn tidaw_format(format: u8) -> Self {
        Self::from_bits_truncate(((format & 0b11) as u32) << TIDAW_FORMAT_SHIFT)
    }
}

/// Transport Control Word.
///
/// The root of a transport-mode channel program: it points to the TCCB, the
/// TSB, the data (or its TIDAW list) and optionally an interrogate TCW.
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
pub struct Tcw {
    /// Format (2 bits), reserved (6 bits) and flags (24 bits).
    format_flags: U32,
    _reserved0: u8,
    /// TCCB length (6 bits), read bit and write bit.
    tccbl_rw: u8,
    _reserved1: [u8; 2],
    output: U64,
    input: U64,
    tsb: U64,
    tccb: U64,
    output_count: U32,
    input_count: U32,
    _reserved2: [u8; 12],
    intrg: U32,
}

const _: () = assert!(size_of::<Tcw>() == TCW_SIZE);

impl Tcw {
    /// Resets the TCW for a transfer that reads (`r`), writes (`w`) or
    /// moves no data at all.
    pub fn init(&mut self, r: bool, w: bool) {
        self.zero();
        self.format_flags.set(
            ((TCW_FORMAT_DEFAULT as u32) << FORMAT_SHIFT)
                | TcwFlags::tidaw_format(TCW_TIDAW_FORMAT_DEFAULT).bits(),
        );
        let mut rw = 0;
        if r {
            rw |= READ_BIT;
        }
        if w {
            rw |= WRITE_BIT;
        }
        self.tccbl_rw = rw;
    }

    pub fn format(&self) -> u8 {
        (self.format_flags.get() >> FORMAT_SHIFT) as u8
    }

    pub fn flags(&self) -> TcwFlags {
        TcwFlags::from_bits_truncate(self.format_flags.get())
    }

    fn update_flags(&mut self, f: impl FnOnce(&mut TcwFlags)) {
        let word = self.format_flags.get();
        let mut flags = TcwFlags::from_bits_truncate(word);
        f(&mut flags);
        self.format_flags
            .set((word & !FLAGS_MASK) | (flags.bits() & FLAGS_MASK));
    }

    pub fn is_read(&self) -> bool {
        self.tccbl_rw & READ_BIT != 0
    }

    pub fn is_write(&self) -> bool {
        self.tccbl_rw & WRITE_BIT != 0
    }

    /// Returns the TCCB length field, i.e., `(TCCB size - 20) / 4`.
    pub fn tccbl(&self) -> u8 {
        (self.tccbl_rw >> TCCBL_SHIFT) & TCCBL_MASK
    }

    pub(crate) fn set_tccbl(&mut self, tccbl: u8) {
        self.tccbl_rw =
            (self.tccbl_rw & !(TCCBL_MASK << TCCBL_SHIFT)) | ((tccbl & TCCBL_MASK) << TCCBL_SHIFT);
    }

    pub fn input(&self) -> Daddr {
        self.input.get()
    }

    pub fn output(&self) -> Daddr {
        self.output.get()
    }

    /// Returns the address of the data (or TIDAW list) of the transfer
    /// direction, if the TCW moves data.
    pub fn data(&self) -> Option<Daddr> {
        if self.is_read() {
            Some(self.input())
        } else if self.is_write() {
            Some(self.output())
        } else {
            None
        }
    }

    /// Points the TCW at its data.
    ///
    /// With `use_tidal`, `daddr` is the address of a TIDAW list instead of
    /// the data itself. A TCW that moves no data is left untouched.
    pub fn set_data(&mut self, daddr: Daddr, use_tidal: bool) {
        let (field, flag) = if self.is_read() {
            (&mut self.input, TcwFlags::INPUT_TIDA)
        } else if self.is_write() {
            (&mut self.output, TcwFlags::OUTPUT_TIDA)
        } else {
            return;
        };
        field.set(daddr);
        self.update_flags(|flags| flags.set(flag, use_tidal));
    }

    pub fn tccb(&self) -> Daddr {
        self.tccb.get()
    }

    pub fn set_tccb(&mut self, daddr: Daddr) {
        self.tccb.set(daddr);
    }

    pub fn tsb(&self) -> Daddr {
        self.tsb.get()
    }

    pub fn set_tsb(&mut self, daddr: Daddr) {
        self.tsb.set(daddr);
    }

    /// Returns the address of the interrogate TCW, or zero if none.
    pub fn intrg(&self) -> u32 {
        self.intrg.get()
    }

    /// Links an interrogate TCW, which must lie below 2 GiB.
    pub fn set_intrg(&mut self, daddr: u32) {
        self.intrg.set(daddr);
    }

    pub fn input_count(&self) -> u32 {
        self.input_count.get()
    }

    pub fn output_count(&self) -> u32 {
        self.output_count.get()
    }

    /// Stores the transport count in the count field of the transfer
    /// direction.
    pub(crate) fn set_count(&mut self, count: u32) {
        if self.is_read() {
            self.input_count.set(count);
        } else if self.is_write() {
            self.output_count.set(count);
        }
    }
}

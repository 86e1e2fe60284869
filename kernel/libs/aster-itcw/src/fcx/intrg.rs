// SPDX-License-Identifier: MPL-2.0

use bitflags::bitflags;
use int_to_c_enum::TryFromInt;
use zerocopy::{
    FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned,
    byteorder::big_endian::{U16, U64},
};

use super::DCW_INTRG_DATA_SIZE;

pub const DCW_INTRG_FORMAT_DEFAULT: u8 = 0;

/// Reason for an interrogate request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromInt)]
#[repr(u8)]
pub enum DcwIntrgRc {
    Unspecified = 0,
    Timeout = 1,
}

/// Qualifier of the interrogate reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromInt)]
#[repr(u8)]
pub enum DcwIntrgRcq {
    Unspecified = 0,
    Primary = 1,
    Secondary = 2,
}

bitflags! {
    pub struct DcwIntrgFlags: u8 {
        const MPM = 1 << (7 - 0);
        const PPR = 1 << (7 - 1);
        const CRIT = 1 << (7 - 2);
    }
}

/// Control data of an interrogate DCW.
///
/// Describes the operation that the interrogate request is about.
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
pub struct DcwIntrgData {
    pub format: u8,
    pub rc: u8,
    pub rcq: u8,
    /// Logical path mask.
    pub lpm: u8,
    /// Path available mask.
    pub pam: u8,
    /// Path installed mask.
    pub pim: u8,
    pub timeout: U16,
    pub flags: u8,
    _reserved: [u8; 7],
    pub time: U64,
    pub prog_id: U64,
}

const _: () = assert!(size_of::<DcwIntrgData>() == DCW_INTRG_DATA_SIZE);

impl DcwIntrgData {
    pub fn flags(&self) -> DcwIntrgFlags {
        DcwIntrgFlags::from_bits_truncate(self.flags)
    }

    pub fn set_flags(&mut self, flags: DcwIntrgFlags) {
        self.flags = flags.bits();
    }

    /// Records why the primary operation is being interrogated.
    pub fn set_reason(&mut self, rc: DcwIntrgRc, rcq: DcwIntrgRcq) {
        self.rc = rc as u8;
        self.rcq = rcq as u8;
    }
}

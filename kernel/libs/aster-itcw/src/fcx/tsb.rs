// SPDX-License-Identifier: MPL-2.0

use bitflags::bitflags;
use int_to_c_enum::TryFromInt;
use zerocopy::{
    FromBytes, FromZeros, Immutable, IntoBytes, KnownLayout, Unaligned,
    byteorder::big_endian::{U16, U32},
};

use super::TSB_SIZE;
use crate::error::{FcxError, Result};

/// Size of the transport-status area.
pub(super) const TSA_SIZE: usize = 52;
const FORMAT_MASK: u8 = 0b111;

bitflags! {
    pub struct TsbFlags: u8 {
        const DCW_OFFSET_VALID = 1 << (7 - 0);
        const COUNT_VALID = 1 << (7 - 1);
        const CACHE_MISS = 1 << (7 - 2);
        const TIME_VALID = 1 << (7 - 3);
    }
}

/// The format of the transport-status area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromInt)]
#[repr(u8)]
pub enum TsbFormat {
    None = 0,
    /// I/O status.
    Iostat = 1,
    /// Device-detected program check.
    Ddpc = 2,
    /// Interrogate status.
    Intrg = 3,
}

/// Transport Status Block.
///
/// Filled in by the channel subsystem when the transfer ends.
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
pub struct Tsb {
    length: u8,
    /// Flags (upper 5 bits) and format (lower 3 bits).
    flags: u8,
    dcw_offset: U16,
    count: U32,
    _reserved: [u8; 4],
    tsa: [u8; TSA_SIZE],
}

const _: () = assert!(size_of::<Tsb>() == TSB_SIZE);

impl Tsb {
    pub fn init(&mut self) {
        self.zero();
    }

    pub fn length(&self) -> u8 {
        self.length
    }

    pub fn flags(&self) -> TsbFlags {
        TsbFlags::from_bits_truncate(self.flags)
    }

    pub fn format(&self) -> Result<TsbFormat> {
        Ok(TsbFormat::try_from(self.flags & FORMAT_MASK)?)
    }

    /// Returns the offset of the failing DCW within the TCCB, if valid.
    pub fn dcw_offset(&self) -> Option<u16> {
        self.flags()
            .contains(TsbFlags::DCW_OFFSET_VALID)
            .then(|| self.dcw_offset.get())
    }

    /// Returns the residual count, if valid.
    pub fn count(&self) -> Option<u32> {
        self.flags()
            .contains(TsbFlags::COUNT_VALID)
            .then(|| self.count.get())
    }

    /// Interprets the transport-status area according to the format.
    pub fn tsa(&self) -> Result<Tsa<'_>> {
        let tsa = match self.format()? {
            TsbFormat::None => Tsa::None,
            TsbFormat::Iostat => Tsa::Iostat(prefix(&self.tsa)?),
            TsbFormat::Ddpc => Tsa::Ddpc(prefix(&self.tsa)?),
            TsbFormat::Intrg => Tsa::Intrg(prefix(&self.tsa)?),
        };
        Ok(tsa)
    }
}

fn prefix<T>(bytes: &[u8]) -> Result<&T>
where
    T: FromBytes + KnownLayout + Immutable,
{
    T::ref_from_prefix(bytes)
        .map(|(value, _)| value)
        .map_err(|_| FcxError::InvalidArgs)
}

/// A view of the transport-status area of a [`Tsb`].
#[derive(Debug, Clone, Copy)]
pub enum Tsa<'a> {
    None,
    Iostat(&'a TsaIostat),
    Ddpc(&'a TsaDdpc),
    Intrg(&'a TsaIntrg),
}

#[repr(C, packed)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
pub struct TsaIostat {
    pub dev_time: U32,
    pub def_time: U32,
    pub queue_time: U32,
    pub dev_busy_time: U32,
    pub dev_act_time: U32,
    pub sense: [u8; 32],
}

#[repr(C, packed)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
pub struct TsaDdpc {
    _reserved: [u8; 3],
    /// Reason code.
    pub rc: u8,
    /// Reason-code qualifier.
    pub rcq: [u8; 16],
    pub sense: [u8; 32],
}

bitflags! {
    pub struct TsaIntrgFlags: u8 {
        const CU_STATE_VALID = 1 << (7 - 0);
        const DEV_STATE_VALID = 1 << (7 - 1);
        const OP_STATE_VALID = 1 << (7 - 2);
    }
}

#[repr(C, packed)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
pub struct TsaIntrg {
    pub format: u8,
    pub flags: u8,
    pub cu_state: u8,
    pub dev_state: u8,
    pub op_state: u8,
    _reserved: [u8; 3],
    pub sd_info: [u8; 12],
    pub dl_id: U32,
    pub dd_data: [u8; 28],
}

const _: () = assert!(size_of::<TsaIostat>() == TSA_SIZE);
const _: () = assert!(size_of::<TsaDdpc>() == TSA_SIZE);
const _: () = assert!(size_of::<TsaIntrg>() == TSA_SIZE);

impl TsaIntrg {
    pub fn flags(&self) -> TsaIntrgFlags {
        TsaIntrgFlags::from_bits_truncate(self.flags)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn tsb_from(bytes: &[u8]) -> Tsb {
        let mut tsb = Tsb::new_zeroed();
        tsb.as_mut_bytes()[..bytes.len()].copy_from_slice(bytes);
        tsb
    }

    #[test]
    fn zeroed_tsb() {
        let mut tsb = tsb_from(&[0xff; TSB_SIZE]);
        tsb.init();
        assert_eq!(tsb.format(), Ok(TsbFormat::None));
        assert!(matches!(tsb.tsa(), Ok(Tsa::None)));
        assert_eq!(tsb.count(), None);
        assert_eq!(tsb.dcw_offset(), None);
    }

    #[test]
    fn iostat_status() {
        let mut bytes = [0u8; 32];
        bytes[0] = 0x40;
        bytes[1] = 0x40 | TsbFormat::Iostat as u8;
        bytes[4..8].copy_from_slice(&0x200u32.to_be_bytes());
        bytes[12..16].copy_from_slice(&7u32.to_be_bytes());
        let tsb = tsb_from(&bytes);

        assert_eq!(tsb.length(), 0x40);
        assert_eq!(tsb.count(), Some(0x200));
        assert_eq!(tsb.dcw_offset(), None);
        let Ok(Tsa::Iostat(iostat)) = tsb.tsa() else {
            panic!("unexpected TSA");
        };
        assert_eq!(iostat.dev_time.get(), 7);
    }

    #[test]
    fn intrg_status() {
        let mut bytes = [0u8; 20];
        bytes[1] = 0x80 | TsbFormat::Intrg as u8;
        bytes[2..4].copy_from_slice(&0x18u16.to_be_bytes());
        bytes[13] = 0xc0;
        bytes[14] = 0x5a;
        let tsb = tsb_from(&bytes);

        assert_eq!(tsb.dcw_offset(), Some(0x18));
        let Ok(Tsa::Intrg(intrg)) = tsb.tsa() else {
            panic!("unexpected TSA");
        };
        assert_eq!(
            intrg.flags(),
            TsaIntrgFlags::CU_STATE_VALID | TsaIntrgFlags::DEV_STATE_VALID
        );
        assert_eq!(intrg.cu_state, 0x5a);
    }

    #[test]
    fn intrg_device_data_offsets() {
        assert_eq!(size_of::<Tsb>(), 64);

        let mut bytes = [0u8; TSB_SIZE];
        bytes[1] = TsbFormat::Intrg as u8;
        // The TSA starts at byte 12; `dl_id` at TSA byte 20, `dd_data` at 24.
        bytes[32..36].copy_from_slice(&0xdead_beefu32.to_be_bytes());
        bytes[36] = 0x11;
        bytes[63] = 0x22;
        let tsb = tsb_from(&bytes);

        let Ok(Tsa::Intrg(intrg)) = tsb.tsa() else {
            panic!("unexpected TSA");
        };
        assert_eq!(intrg.dl_id.get(), 0xdead_beef);
        assert_eq!(intrg.dd_data[0], 0x11);
        assert_eq!(intrg.dd_data[27], 0x22);
    }

    #[test]
    fn unknown_format() {
        let tsb = tsb_from(&[0, 0x05]);
        assert_eq!(tsb.format(), Err(FcxError::InvalidArgs));
        assert!(tsb.tsa().is_err());
    }
}

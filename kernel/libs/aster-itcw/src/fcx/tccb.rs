// SPDX-License-Identifier: MPL-2.0

use bitflags::bitflags;
use int_to_c_enum::TryFromInt;
use zerocopy::{
    FromBytes, FromZeros, Immutable, IntoBytes, KnownLayout, Unaligned,
    byteorder::big_endian::{U16, U32},
};

use super::{DCW_SIZE, TCCB_FORMAT_DEFAULT, TCCB_MAX_SIZE, TCCB_TCAH_SIZE, TCCB_TCAT_SIZE};
use crate::error::{FcxError, Result};

/// Size of the transport-command area of a maximum-size TCCB.
const TCA_CAPACITY: usize = TCCB_MAX_SIZE - TCCB_TCAH_SIZE;

/// `tcal` of a TCCB with an empty transport-command area.
///
/// The length counts the area plus the TCAH bytes following the `tcal`
/// field.
const TCAL_EMPTY: u8 = 12;

/// Device command codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromInt)]
#[repr(u8)]
pub enum DcwCmd {
    Write = 0x01,
    Read = 0x02,
    Control = 0x03,
    Sense = 0x04,
    SenseId = 0xe4,
    Intrg = 0x40,
}

bitflags! {
    pub struct DcwFlags: u8 {
        /// Command chaining: the next DCW belongs to the same operation.
        const CC = 1 << (7 - 1);
    }
}

/// Device Command Word.
///
/// A DCW is followed by `cd_count` bytes of control data, padded to a
/// multiple of four bytes.
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
pub struct Dcw {
    cmd: u8,
    flags: u8,
    _reserved: u8,
    cd_count: u8,
    count: U32,
}

const _: () = assert!(size_of::<Dcw>() == DCW_SIZE);

impl Dcw {
    pub fn cmd(&self) -> u8 {
        self.cmd
    }

    pub fn flags(&self) -> DcwFlags {
        DcwFlags::from_bits_truncate(self.flags)
    }

    /// Updates the flags, e.g., to chain a DCW to one appended later.
    pub fn set_flags(&mut self, flags: DcwFlags) {
        self.flags = flags.bits();
    }

    /// Returns the number of control-data bytes following the DCW.
    pub fn cd_count(&self) -> u8 {
        self.cd_count
    }

    pub fn count(&self) -> u32 {
        self.count.get()
    }

    /// Returns the size of the DCW including its padded control data.
    pub fn size(&self) -> usize {
        entry_size(self.cd_count)
    }
}

fn entry_size(cd_count: u8) -> usize {
    (DCW_SIZE + cd_count as usize).next_multiple_of(4)
}

/// Transport-Command-Area Header.
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
pub struct TccbTcah {
    pub format: u8,
    _reserved0: [u8; 6],
    /// Transport-command-area length.
    pub tcal: u8,
    /// Service-action code.
    pub sac: U16,
    _reserved1: u8,
    pub prio: u8,
    _reserved2: [u8; 4],
}

const _: () = assert!(size_of::<TccbTcah>() == TCCB_TCAH_SIZE);

/// Transport-Command-Area Trailer.
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
pub struct TccbTcat {
    _reserved: [u8; 4],
    /// Transport count.
    pub count: U32,
}

const _: () = assert!(size_of::<TccbTcat>() == TCCB_TCAT_SIZE);

/// Transport Control Command Block of the maximum size.
///
/// The transport-command area grows with every DCW; the TCAT is written
/// right behind the last DCW when the TCCB is finalized.
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
pub struct Tccb {
    tcah: TccbTcah,
    tca: [u8; TCA_CAPACITY],
}

const _: () = assert!(size_of::<Tccb>() == TCCB_MAX_SIZE);

impl Tccb {
    /// Resets the TCCB to an empty command area with service-action code
    /// `sac`.
    pub fn init(&mut self, sac: u16) {
        self.zero();
        self.tcah.format = TCCB_FORMAT_DEFAULT;
        self.tcah.sac.set(sac);
        self.tcah.tcal = TCAL_EMPTY;
    }

    pub fn tcah(&self) -> &TccbTcah {
        &self.tcah
    }

    /// Returns the number of bytes used by DCWs.
    pub fn tca_size(&self) -> usize {
        self.tcah.tcal.saturating_sub(TCAL_EMPTY) as usize
    }

    /// Appends a DCW carrying the control data `cd`.
    pub fn add_dcw(
        &mut self,
        cmd: u8,
        flags: DcwFlags,
        cd: &[u8],
        count: u32,
    ) -> Result<&mut Dcw> {
        let cd_count = u8::try_from(cd.len()).map_err(|_| FcxError::InvalidArgs)?;
        self.push_dcw(cmd, flags, Some(cd), cd_count, count)
    }

    /// Appends a DCW followed by `cd_count` zeroed bytes of control data.
    pub fn add_dcw_zeroed(
        &mut self,
        cmd: u8,
        flags: DcwFlags,
        cd_count: u8,
        count: u32,
    ) -> Result<&mut Dcw> {
        self.push_dcw(cmd, flags, None, cd_count, count)
    }

    fn push_dcw(
        &mut self,
        cmd: u8,
        flags: DcwFlags,
        cd: Option<&[u8]>,
        cd_count: u8,
        count: u32,
    ) -> Result<&mut Dcw> {
        let offset = self.tca_size();
        let size = entry_size(cd_count);
        // Room must be left for the TCAT.
        if TCCB_TCAH_SIZE + offset + size + TCCB_TCAT_SIZE > TCCB_MAX_SIZE {
            return Err(FcxError::OutOfSpace);
        }

        self.tcah.tcal += size as u8;
        let entry = &mut self.tca[offset..offset + size];
        entry.fill(0);
        let (dcw, cd_area) = Dcw::mut_from_prefix(entry).map_err(|_| FcxError::OutOfSpace)?;
        *dcw = Dcw {
            cmd,
            flags: flags.bits(),
            _reserved: 0,
            cd_count,
            count: U32::new(count),
        };
        if let Some(cd) = cd {
            cd_area[..cd.len()].copy_from_slice(cd);
        }
        Ok(dcw)
    }

    /// Returns an iterator over the DCWs and their control data.
    pub fn dcws(&self) -> DcwIter<'_> {
        DcwIter {
            tca: &self.tca[..self.tca_size()],
            offset: 0,
        }
    }

    /// Returns a mutable view of the control data of the DCW at `offset`
    /// within the transport-command area.
    pub(crate) fn cd_mut(&mut self, offset: usize) -> Option<&mut [u8]> {
        let tca_size = self.tca_size();
        let (dcw, rest) = Dcw::mut_from_prefix(self.tca.get_mut(offset..tca_size)?).ok()?;
        let cd_count = dcw.cd_count() as usize;
        rest.get_mut(..cd_count)
    }

    /// Returns the number of bytes the command chain transfers.
    ///
    /// The counts of all DCWs are summed up to and including the first DCW
    /// that does not chain to its successor.
    pub fn transport_count(&self) -> u32 {
        let mut count: u32 = 0;
        for (dcw, _) in self.dcws() {
            count = count.wrapping_add(dcw.count());
            if !dcw.flags().contains(DcwFlags::CC) {
                break;
            }
        }
        count
    }

    /// Writes the TCAT behind the last DCW and returns the TCCB length
    /// field for the TCW.
    pub(crate) fn finalize(&mut self, count: u32) -> u8 {
        let offset = self.tca_size();
        if let Ok((tcat, _)) = TccbTcat::mut_from_prefix(&mut self.tca[offset..]) {
            *tcat = TccbTcat {
                _reserved: [0; 4],
                count: U32::new((count.wrapping_add(3) & !3).wrapping_add(4)),
            };
        }
        ((TCCB_TCAH_SIZE + offset + TCCB_TCAT_SIZE - 20) >> 2) as u8
    }

    /// Returns the TCAT, which is only meaningful after finalization.
    pub fn tcat(&self) -> Option<&TccbTcat> {
        let offset = self.tca_size();
        TccbTcat::ref_from_prefix(self.tca.get(offset..)?)
            .ok()
            .map(|(tcat, _)| tcat)
    }
}

/// An iterator over the DCWs of a TCCB.
pub struct DcwIter<'a> {
    tca: &'a [u8],
    offset: usize,
}

impl<'a> Iterator for DcwIter<'a> {
    type Item = (&'a Dcw, &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        let rest = self.tca.get(self.offset..)?;
        let (dcw, tail) = Dcw::ref_from_prefix(rest).ok()?;
        let cd = tail.get(..dcw.cd_count() as usize)?;
        self.offset += dcw.size();
        Some((dcw, cd))
    }
}

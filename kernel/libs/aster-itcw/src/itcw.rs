// SPDX-License-Identifier: MPL-2.0

//! The incremental TCW builder.
//!
//! An [`Itcw`] lays out a complete transport-mode channel program in an
//! [`Arena`]: the TCW, its TCCB, its TSB, the TIDAW list and, optionally, an
//! interrogate TCW with the same set of companions. DCWs and TIDAWs are then
//! appended one by one as the caller discovers the shape of the transfer,
//! and [`Itcw::finalize`] fixes up the lengths and counts.
//!
//! ```
//! use aster_itcw::{Arena, ItcwOp, ItcwOptions, Itcw, fcx::{DcwCmd, DcwFlags, TidawFlags}};
//!
//! let options = ItcwOptions::new(ItcwOp::Read).max_tidaws(2);
//! let mut buf = vec![0u8; options.calc_size()];
//! let mut itcw = Itcw::init(Arena::new(&mut buf, 0x10_0000), &options).unwrap();
//!
//! itcw.add_dcw(DcwCmd::Read as u8, DcwFlags::empty(), &[], 8192).unwrap();
//! itcw.add_tidaw(TidawFlags::empty(), 0x20_0000, 4096).unwrap();
//! itcw.add_tidaw(TidawFlags::empty(), 0x30_0000, 4096).unwrap();
//!
//! let itcw = itcw.finalize();
//! assert_eq!(itcw.tcw().input_count(), 8192);
//! ```

use align_ext::AlignExt;
use int_to_c_enum::TryFromInt;
use log::{debug, trace, warn};
use zerocopy::{
    FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned,
    byteorder::big_endian::{U32, U64},
};

use crate::{
    arena::{Arena, Daddr, HasDaddr},
    error::{FcxError, Result},
    fcx::{
        DCW_INTRG_DATA_SIZE, Dcw, DcwCmd, DcwFlags, DcwIntrgData, PAGE_SIZE, TCCB_ALIGN,
        TCCB_MAX_SIZE, TCCB_SAC_DEFAULT, TCCB_SAC_INTRG, TCW_ALIGN, TCW_SIZE, TIDAW_SIZE,
        TSB_SIZE, Tccb, Tcw, TcwFlags, Tidaw, TidawFlags, Tsb, cbc_size, cross_count,
    },
    layout::{Chunk, ItcwLayout},
};

/// Size of the bookkeeping record at the start of an arena.
pub(crate) const ITCW_HEADER_SIZE: usize = 32;

/// Every address in a TCW chain must stay below 2 GiB.
const ARENA_ADDR_LIMIT: u64 = 1 << 31;

/// The data direction of the primary transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromInt)]
#[repr(u8)]
pub enum ItcwOp {
    Read = 0,
    Write = 1,
    /// The transfer moves no data.
    NoData = 2,
}

impl ItcwOp {
    fn is_read(self) -> bool {
        self == Self::Read
    }

    fn is_write(self) -> bool {
        self == Self::Write
    }
}

/// Options describing the shape of an ITCW.
///
/// The same options must be used to size the arena with
/// [`ItcwOptions::calc_size`] and to build the ITCW with [`Itcw::init`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItcwOptions {
    op: ItcwOp,
    intrg: bool,
    max_tidaws: u32,
    intrg_max_tidaws: u32,
}

impl ItcwOptions {
    /// Creates options for a transfer without TIDAWs or interrogate TCW.
    pub const fn new(op: ItcwOp) -> Self {
        Self {
            op,
            intrg: false,
            max_tidaws: 0,
            intrg_max_tidaws: 0,
        }
    }

    /// Sets the maximum number of data TIDAWs of the primary transfer.
    pub const fn max_tidaws(mut self, max_tidaws: u32) -> Self {
        self.max_tidaws = max_tidaws;
        self
    }

    /// Adds an interrogate TCW whose TIDAW list holds up to
    /// `intrg_max_tidaws` entries.
    pub const fn interrogate(mut self, intrg_max_tidaws: u32) -> Self {
        self.intrg = true;
        self.intrg_max_tidaws = intrg_max_tidaws;
        self
    }

    pub const fn op(&self) -> ItcwOp {
        self.op
    }

    pub const fn has_interrogate(&self) -> bool {
        self.intrg
    }

    pub const fn requested_tidaws(&self) -> u32 {
        self.max_tidaws
    }

    pub const fn requested_intrg_tidaws(&self) -> u32 {
        self.intrg_max_tidaws
    }

    /// Returns the number of TIDAW slots of the primary list, including
    /// the slots reserved for TTIC TIDAWs.
    pub const fn tidal_capacity(&self) -> u32 {
        self.max_tidaws.saturating_add(cross_count(self.max_tidaws))
    }

    pub const fn intrg_tidal_capacity(&self) -> u32 {
        self.intrg_max_tidaws
            .saturating_add(cross_count(self.intrg_max_tidaws))
    }

    /// Returns the arena size needed by an ITCW with these options.
    pub fn calc_size(&self) -> usize {
        calc_size(self.intrg, self.max_tidaws, self.intrg_max_tidaws)
    }
}

/// Returns the arena size needed by an ITCW with an optional interrogate
/// TCW and the given maximum TIDAW counts.
///
/// The size covers the worst-case alignment padding for any placement of
/// the arena, so [`Itcw::init`] never runs out of space with an arena of
/// this size.
pub fn calc_size(intrg: bool, max_tidaws: u32, intrg_max_tidaws: u32) -> usize {
    let group = TCW_SIZE + TCCB_MAX_SIZE + TSB_SIZE;

    let mut len = ITCW_HEADER_SIZE + group + max_tidaws as usize * TIDAW_SIZE;
    if intrg {
        len += group + intrg_max_tidaws as usize * TIDAW_SIZE;
    }
    // Padding in front of the first TCW and the interrogate TCCB.
    len += (TCW_ALIGN - 1) + (TCCB_ALIGN - 1);
    len += cross_count(max_tidaws) as usize * TIDAW_SIZE;
    len += cross_count(intrg_max_tidaws) as usize * TIDAW_SIZE;
    len
}

/// The bookkeeping record at the start of an arena.
#[repr(C, packed)]
#[derive(Debug, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
struct ItcwHeader {
    tcw: U64,
    intrg_tcw: U64,
    num_tidaws: U32,
    max_tidaws: U32,
    /// Reserved. No TIDAWs are appended to the interrogate list, so this
    /// stays zero.
    intrg_num_tidaws: U32,
    intrg_max_tidaws: U32,
}

const _: () = assert!(size_of::<ItcwHeader>() == ITCW_HEADER_SIZE);

/// The control blocks of one transfer.
#[derive(Debug)]
struct Transfer<'a> {
    tcw: &'a mut Tcw,
    tcw_daddr: Daddr,
    tidal: &'a mut [Tidaw],
    tidal_daddr: Option<Daddr>,
    tsb: &'a mut Tsb,
    tsb_daddr: Daddr,
    tccb: &'a mut Tccb,
    tccb_daddr: Daddr,
}

impl Transfer<'_> {
    fn setup(&mut self, r: bool, w: bool, sac: u16) {
        self.tcw.init(r, w);
        if let Some(tidal_daddr) = self.tidal_daddr {
            self.tcw.set_data(tidal_daddr, true);
        }
        self.tsb.init();
        self.tcw.set_tsb(self.tsb_daddr);
        self.tccb.init(sac);
        self.tcw.set_tccb(self.tccb_daddr);
    }

    /// Terminates the TIDAW list and fixes up the counts and lengths of the
    /// TCW and the TCCB.
    fn finalize(&mut self, num_tidaws: usize) {
        let tidaws = &mut self.tidal[..num_tidaws];
        if let Some(last) = tidaws.last_mut() {
            last.set_flags(last.flags() | TidawFlags::LAST);
        }

        let mut count = self.tccb.transport_count();
        if self.tcw.is_write() && self.tcw.flags().contains(TcwFlags::OUTPUT_TIDA) {
            count = count.wrapping_add(cbc_size(tidaws));
        }
        self.tcw.set_count(count);
        let tccbl = self.tccb.finalize(count);
        self.tcw.set_tccbl(tccbl);
    }
}

/// An ITCW under construction.
///
/// The ITCW borrows its arena for its whole lifetime; all control blocks
/// live in the arena.
#[derive(Debug)]
pub struct Itcw<'a> {
    header: &'a mut ItcwHeader,
    primary: Transfer<'a>,
    intrg: Option<Transfer<'a>>,
    num_data_tidaws: u32,
    max_data_tidaws: u32,
    layout: ItcwLayout,
}

impl<'a> Itcw<'a> {
    /// Lays out an ITCW described by `options` in `arena`.
    ///
    /// The whole arena is zeroed first. The arena should be at least
    /// [`ItcwOptions::calc_size`] bytes large.
    pub fn init(mut arena: Arena<'a>, options: &ItcwOptions) -> Result<Self> {
        let daddr = arena.daddr();
        let size = arena.len();
        if daddr
            .checked_add(size as u64)
            .is_none_or(|end| end > ARENA_ADDR_LIMIT)
        {
            warn!(
                "itcw: arena {:#x}+{:#x} is not addressable with 31 bits",
                daddr, size
            );
            return Err(FcxError::InvalidConfiguration);
        }

        arena.zero();
        let layout = ItcwLayout::compute(daddr, size, options)?;

        let mut carver = arena.into_carver();
        let header = carver.record::<ItcwHeader>(layout.header.offset)?;
        let tcw = carver.record::<Tcw>(layout.tcw.offset)?;
        let intrg_tcw = layout
            .intrg_tcw
            .map(|chunk| carver.record::<Tcw>(chunk.offset))
            .transpose()?;
        let tidal = layout
            .tidal
            .map(|chunk| carver.slice::<Tidaw>(chunk.offset, chunk.len / TIDAW_SIZE))
            .transpose()?;
        let intrg_tidal = layout
            .intrg_tidal
            .map(|chunk| carver.slice::<Tidaw>(chunk.offset, chunk.len / TIDAW_SIZE))
            .transpose()?;
        let tsb = carver.record::<Tsb>(layout.tsb.offset)?;
        let intrg_tsb = layout
            .intrg_tsb
            .map(|chunk| carver.record::<Tsb>(chunk.offset))
            .transpose()?;
        let tccb = carver.record::<Tccb>(layout.tccb.offset)?;
        let intrg_tccb = layout
            .intrg_tccb
            .map(|chunk| carver.record::<Tccb>(chunk.offset))
            .transpose()?;

        let mut primary = Transfer {
            tcw,
            tcw_daddr: layout.tcw.daddr,
            tidal: tidal.unwrap_or_default(),
            tidal_daddr: layout.tidal.map(|chunk| chunk.daddr),
            tsb,
            tsb_daddr: layout.tsb.daddr,
            tccb,
            tccb_daddr: layout.tccb.daddr,
        };
        primary.setup(
            options.op().is_read(),
            options.op().is_write(),
            TCCB_SAC_DEFAULT,
        );

        let intrg = match (intrg_tcw, intrg_tsb, intrg_tccb) {
            (Some(tcw), Some(tsb), Some(tccb)) => {
                let mut intrg = Transfer {
                    tcw,
                    tcw_daddr: chunk_daddr(layout.intrg_tcw),
                    tidal: intrg_tidal.unwrap_or_default(),
                    tidal_daddr: layout.intrg_tidal.map(|chunk| chunk.daddr),
                    tsb,
                    tsb_daddr: chunk_daddr(layout.intrg_tsb),
                    tccb,
                    tccb_daddr: chunk_daddr(layout.intrg_tccb),
                };
                // The interrogate TCW only fetches status from the device.
                intrg.setup(true, false, TCCB_SAC_INTRG);
                let intrg_daddr =
                    u32::try_from(intrg.tcw_daddr).map_err(|_| FcxError::InvalidConfiguration)?;
                primary.tcw.set_intrg(intrg_daddr);

                intrg.tccb.add_dcw_zeroed(
                    DcwCmd::Intrg as u8,
                    DcwFlags::empty(),
                    DCW_INTRG_DATA_SIZE as u8,
                    0,
                )?;
                intrg.finalize(0);
                Some(intrg)
            }
            _ => None,
        };

        header.tcw.set(primary.tcw_daddr);
        header
            .intrg_tcw
            .set(intrg.as_ref().map_or(0, |intrg| intrg.tcw_daddr));
        header.max_tidaws.set(primary.tidal.len() as u32);
        header.intrg_num_tidaws.set(0);
        header.intrg_max_tidaws.set(options.intrg_tidal_capacity());

        debug!(
            "itcw: {:?} at {:#x}+{:#x}: tcw {:#x}, tidal {:?} ({} slots), tsb {:#x}, tccb {:#x}, intrg tcw {:?}",
            options.op(),
            daddr,
            size,
            layout.tcw.daddr,
            primary.tidal_daddr,
            primary.tidal.len(),
            layout.tsb.daddr,
            layout.tccb.daddr,
            layout.intrg_tcw.map(|chunk| chunk.daddr),
        );

        Ok(Self {
            header,
            primary,
            intrg,
            num_data_tidaws: 0,
            max_data_tidaws: options.requested_tidaws(),
            layout,
        })
    }

    /// Appends a DCW with the control data `cd` to the primary TCCB.
    ///
    /// The returned DCW may be updated later, e.g., to set
    /// [`DcwFlags::CC`] once another DCW is chained to it.
    pub fn add_dcw(&mut self, cmd: u8, flags: DcwFlags, cd: &[u8], count: u32) -> Result<&mut Dcw> {
        self.primary.tccb.add_dcw(cmd, flags, cd, count)
    }

    /// Appends a DCW with `cd_count` zeroed bytes of control data to the
    /// primary TCCB.
    pub fn add_dcw_zeroed(
        &mut self,
        cmd: u8,
        flags: DcwFlags,
        cd_count: u8,
        count: u32,
    ) -> Result<&mut Dcw> {
        self.primary.tccb.add_dcw_zeroed(cmd, flags, cd_count, count)
    }

    /// Appends a TIDAW describing `count` bytes at `daddr` to the primary
    /// TIDAW list.
    ///
    /// If the slot after the new TIDAW starts a new page, a TTIC TIDAW
    /// linking to it is inserted first, since the channel must not fetch a
    /// TIDAW list across a page boundary. At most
    /// [`ItcwOptions::max_tidaws`] TIDAWs can be added. Lists of more than
    /// 1023 TIDAWs may run out of reserved TTIC slots before that, in which
    /// case [`FcxError::OutOfSpace`] is returned without changing the list.
    pub fn add_tidaw(&mut self, flags: TidawFlags, daddr: Daddr, count: u32) -> Result<&mut Tidaw> {
        let max = self.primary.tidal.len();
        let mut num = self.num_tidaws() as usize;
        if num >= max || self.num_data_tidaws >= self.max_data_tidaws {
            return Err(FcxError::OutOfSpace);
        }

        // The list directly follows a TCW, so its first slot is never the
        // last one of a page.
        let tidal_daddr = self.primary.tidal_daddr.ok_or(FcxError::OutOfSpace)?;
        let following = tidal_daddr + ((num + 1) * TIDAW_SIZE) as u64;
        if num > 0 && following.is_aligned_to(PAGE_SIZE as u64) {
            if num + 1 >= max {
                return Err(FcxError::OutOfSpace);
            }
            self.primary.tidal[num] = Tidaw::new(TidawFlags::TTIC, following, 0);
            trace!("itcw: TTIC in slot {} continues at {:#x}", num, following);
            num += 1;
        }

        self.primary.tidal[num] = Tidaw::new(flags, daddr, count);
        self.header.num_tidaws.set(num as u32 + 1);
        self.num_data_tidaws += 1;
        Ok(&mut self.primary.tidal[num])
    }

    /// Points the primary TCW at its data.
    ///
    /// With `use_tidal`, `daddr` must be [`Itcw::tidal_daddr`], the list that
    /// [`Itcw::add_tidaw`] fills and [`Itcw::finalize`] terminates; any other
    /// address fails with [`FcxError::InvalidArgs`] and leaves the TCW as is.
    /// Without `use_tidal`, `daddr` is the data itself.
    pub fn set_data(&mut self, daddr: Daddr, use_tidal: bool) -> Result<()> {
        if use_tidal && self.primary.tidal_daddr != Some(daddr) {
            return Err(FcxError::InvalidArgs);
        }
        self.primary.tcw.set_data(daddr, use_tidal);
        Ok(())
    }

    /// Completes the primary transfer.
    ///
    /// The last TIDAW is marked as such, the TCAT is written and the
    /// transport count and TCCB length are stored in the TCW.
    pub fn finalize(mut self) -> FinalizedItcw<'a> {
        let num_tidaws = self.num_tidaws() as usize;
        self.primary.finalize(num_tidaws);
        debug!(
            "itcw: finalized tcw {:#x} with {} TIDAWs, {} DCW bytes",
            self.primary.tcw_daddr,
            num_tidaws,
            self.primary.tccb.tca_size(),
        );
        FinalizedItcw { itcw: self }
    }

    pub fn tcw(&self) -> &Tcw {
        self.primary.tcw
    }

    pub fn tcw_daddr(&self) -> Daddr {
        self.primary.tcw_daddr
    }

    pub fn tsb(&self) -> &Tsb {
        self.primary.tsb
    }

    pub fn tccb(&self) -> &Tccb {
        self.primary.tccb
    }

    /// Returns the device address of the primary TIDAW list, if any.
    pub fn tidal_daddr(&self) -> Option<Daddr> {
        self.primary.tidal_daddr
    }

    /// Returns the TIDAWs added so far, including TTIC TIDAWs.
    pub fn tidaws(&self) -> &[Tidaw] {
        &self.primary.tidal[..self.num_tidaws() as usize]
    }

    /// Returns the number of used TIDAW slots, including TTIC TIDAWs.
    pub fn num_tidaws(&self) -> u32 {
        self.header.num_tidaws.get()
    }

    /// Returns the number of TIDAW slots, including the slots reserved for
    /// TTIC TIDAWs.
    pub fn max_tidaws(&self) -> u32 {
        self.header.max_tidaws.get()
    }

    pub fn intrg_max_tidaws(&self) -> u32 {
        self.header.intrg_max_tidaws.get()
    }

    /// Returns the number of TIDAWs added by the caller.
    pub fn num_data_tidaws(&self) -> u32 {
        self.num_data_tidaws
    }

    pub fn intrg_tcw(&self) -> Option<&Tcw> {
        self.intrg.as_ref().map(|intrg| &*intrg.tcw)
    }

    pub fn intrg_tcw_daddr(&self) -> Option<Daddr> {
        self.intrg.as_ref().map(|intrg| intrg.tcw_daddr)
    }

    pub fn intrg_tsb(&self) -> Option<&Tsb> {
        self.intrg.as_ref().map(|intrg| &*intrg.tsb)
    }

    pub fn intrg_tccb(&self) -> Option<&Tccb> {
        self.intrg.as_ref().map(|intrg| &*intrg.tccb)
    }

    /// Returns the control data of the interrogate DCW, which describes the
    /// operation to interrogate.
    pub fn intrg_data_mut(&mut self) -> Option<&mut DcwIntrgData> {
        let cd = self.intrg.as_mut()?.tccb.cd_mut(0)?;
        DcwIntrgData::mut_from_bytes(cd).ok()
    }

    pub fn layout(&self) -> &ItcwLayout {
        &self.layout
    }
}

fn chunk_daddr(chunk: Option<Chunk>) -> Daddr {
    chunk.map_or(0, |chunk| chunk.daddr)
}

/// A completed ITCW, ready to be started by the channel subsystem.
///
/// No DCWs or TIDAWs can be added anymore.
#[derive(Debug)]
pub struct FinalizedItcw<'a> {
    itcw: Itcw<'a>,
}

impl FinalizedItcw<'_> {
    pub fn tcw(&self) -> &Tcw {
        self.itcw.tcw()
    }

    /// Returns the device address to start the channel program at.
    pub fn tcw_daddr(&self) -> Daddr {
        self.itcw.tcw_daddr()
    }

    pub fn tsb(&self) -> &Tsb {
        self.itcw.tsb()
    }

    pub fn tccb(&self) -> &Tccb {
        self.itcw.tccb()
    }

    pub fn tidaws(&self) -> &[Tidaw] {
        self.itcw.tidaws()
    }

    pub fn num_tidaws(&self) -> u32 {
        self.itcw.num_tidaws()
    }

    pub fn intrg_tcw(&self) -> Option<&Tcw> {
        self.itcw.intrg_tcw()
    }

    pub fn intrg_tsb(&self) -> Option<&Tsb> {
        self.itcw.intrg_tsb()
    }

    pub fn intrg_tccb(&self) -> Option<&Tccb> {
        self.itcw.intrg_tccb()
    }

    /// Returns the transport count of the primary transfer.
    pub fn transport_count(&self) -> u32 {
        let tcw = self.itcw.tcw();
        if tcw.is_write() {
            tcw.output_count()
        } else {
            tcw.input_count()
        }
    }

    pub fn layout(&self) -> &ItcwLayout {
        self.itcw.layout()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const ARENA_DADDR: Daddr = 0x10_0000;

    fn with_itcw(options: ItcwOptions, f: impl FnOnce(Itcw<'_>)) {
        let mut buf = vec![0u8; options.calc_size()];
        let itcw = Itcw::init(Arena::new(&mut buf, ARENA_DADDR), &options).unwrap();
        f(itcw);
    }

    #[test]
    fn calc_size_minimal() {
        assert_eq!(calc_size(false, 0, 0), 32 + 64 + 264 + 64 + 70);
        assert_eq!(
            calc_size(true, 0, 0),
            32 + 2 * (64 + 264 + 64) + 70
        );
    }

    #[test]
    fn calc_size_counts_ttic_slots() {
        assert_eq!(calc_size(false, 1, 0) - calc_size(false, 0, 0), 2 * 16);
        assert_eq!(calc_size(false, 256, 0) - calc_size(false, 0, 0), 257 * 16);
        assert_eq!(calc_size(false, 257, 0) - calc_size(false, 0, 0), 259 * 16);
        assert_eq!(calc_size(true, 2, 3) - calc_size(true, 0, 0), (3 + 4) * 16);
    }

    #[test]
    fn options_builder() {
        let options = ItcwOptions::new(ItcwOp::Write).max_tidaws(300).interrogate(4);
        assert_eq!(options.op(), ItcwOp::Write);
        assert!(options.has_interrogate());
        assert_eq!(options.tidal_capacity(), 302);
        assert_eq!(options.intrg_tidal_capacity(), 5);
        assert_eq!(options.calc_size(), calc_size(true, 300, 4));
    }

    #[test]
    fn op_codes() {
        assert_eq!(ItcwOp::try_from(0u8).unwrap(), ItcwOp::Read);
        assert_eq!(ItcwOp::try_from(1u8).unwrap(), ItcwOp::Write);
        assert_eq!(
            ItcwOp::try_from(7u8).map_err(FcxError::from),
            Err(FcxError::InvalidArgs)
        );
    }

    #[test]
    fn init_wires_primary_tcw() {
        with_itcw(ItcwOptions::new(ItcwOp::Read).max_tidaws(4), |itcw| {
            let layout = itcw.layout().clone();
            let tcw = itcw.tcw();
            assert!(tcw.is_read());
            assert_eq!(tcw.input(), layout.tidal.unwrap().daddr);
            assert!(tcw.flags().contains(TcwFlags::INPUT_TIDA));
            assert_eq!(tcw.tsb(), layout.tsb.daddr);
            assert_eq!(tcw.tccb(), layout.tccb.daddr);
            assert_eq!(tcw.intrg(), 0);
            assert_eq!(itcw.tccb().tcah().sac.get(), TCCB_SAC_DEFAULT);
            assert_eq!(itcw.max_tidaws(), 5);
            assert_eq!(itcw.num_tidaws(), 0);
            assert!(itcw.intrg_tcw().is_none());
        });
    }

    #[test]
    fn init_without_data() {
        with_itcw(ItcwOptions::new(ItcwOp::NoData), |mut itcw| {
            assert_eq!(itcw.tcw().data(), None);
            assert_eq!(itcw.tidal_daddr(), None);
            assert_eq!(
                itcw.add_tidaw(TidawFlags::empty(), 0x1000, 1).unwrap_err(),
                FcxError::OutOfSpace
            );
        });
    }

    #[test]
    fn interrogate_tcw_is_prebuilt() {
        let options = ItcwOptions::new(ItcwOp::Write).max_tidaws(2).interrogate(0);
        with_itcw(options, |mut itcw| {
            let intrg_daddr = itcw.intrg_tcw_daddr().unwrap();
            assert_eq!(itcw.tcw().intrg() as u64, intrg_daddr);

            let intrg_tcw = itcw.intrg_tcw().unwrap();
            assert!(intrg_tcw.is_read());
            assert_eq!(intrg_tcw.input_count(), 0);
            assert_eq!(intrg_tcw.tccbl(), 11);

            let intrg_tccb = itcw.intrg_tccb().unwrap();
            assert_eq!(intrg_tccb.tcah().sac.get(), TCCB_SAC_INTRG);
            let dcws: Vec<_> = intrg_tccb.dcws().collect();
            assert_eq!(dcws.len(), 1);
            assert_eq!(dcws[0].0.cmd(), DcwCmd::Intrg as u8);
            assert_eq!(dcws[0].1.len(), DCW_INTRG_DATA_SIZE);
            assert_eq!(intrg_tccb.tcat().map(|tcat| tcat.count.get()), Some(4));

            itcw.intrg_data_mut().unwrap().lpm = 0x80;
            let (_, cd) = itcw.intrg_tccb().unwrap().dcws().next().unwrap();
            assert_eq!(cd[3], 0x80);
        });
    }

    #[test]
    fn finalize_read_counts() {
        with_itcw(ItcwOptions::new(ItcwOp::Read).max_tidaws(2), |mut itcw| {
            itcw.add_dcw(DcwCmd::Read as u8, DcwFlags::CC, &[], 4096)
                .unwrap();
            itcw.add_dcw(DcwCmd::Read as u8, DcwFlags::empty(), &[1, 2], 4096)
                .unwrap();
            itcw.add_tidaw(TidawFlags::empty(), 0x1000, 4096).unwrap();
            itcw.add_tidaw(TidawFlags::empty(), 0x2000, 4096).unwrap();

            let itcw = itcw.finalize();
            assert_eq!(itcw.transport_count(), 8192);
            assert_eq!(itcw.tcw().output_count(), 0);
            // 16 (TCAH) + 8 + 12 (DCWs) + 8 (TCAT) - 20 = 24 bytes.
            assert_eq!(itcw.tcw().tccbl(), 6);
            assert_eq!(itcw.tccb().tcat().unwrap().count.get(), 8196);

            let tidaws = itcw.tidaws();
            assert_eq!(tidaws.len(), 2);
            assert!(!tidaws[0].flags().contains(TidawFlags::LAST));
            assert!(tidaws[1].flags().contains(TidawFlags::LAST));
        });
    }

    #[test]
    fn finalize_write_adds_cbc() {
        with_itcw(ItcwOptions::new(ItcwOp::Write).max_tidaws(3), |mut itcw| {
            itcw.add_dcw(DcwCmd::Write as u8, DcwFlags::empty(), &[], 10)
                .unwrap();
            itcw.add_tidaw(TidawFlags::INSERT_CBC, 0x1000, 6).unwrap();
            itcw.add_tidaw(TidawFlags::empty(), 0x2000, 4).unwrap();

            let itcw = itcw.finalize();
            assert_eq!(itcw.tcw().output_count(), 16);
            assert_eq!(itcw.transport_count(), 16);
        });
    }

    #[test]
    fn flat_data_skips_cbc() {
        with_itcw(ItcwOptions::new(ItcwOp::Write).max_tidaws(3), |mut itcw| {
            itcw.add_dcw(DcwCmd::Write as u8, DcwFlags::empty(), &[], 10)
                .unwrap();
            itcw.add_tidaw(TidawFlags::INSERT_CBC, 0x1000, 6).unwrap();
            itcw.add_tidaw(TidawFlags::empty(), 0x2000, 4).unwrap();
            itcw.set_data(0x8000, false).unwrap();

            let itcw = itcw.finalize();
            assert_eq!(itcw.tcw().output(), 0x8000);
            assert_eq!(itcw.transport_count(), 10);
        });
    }

    #[test]
    fn foreign_tidaw_list_is_rejected() {
        with_itcw(ItcwOptions::new(ItcwOp::Read).max_tidaws(2), |mut itcw| {
            let tidal_daddr = itcw.tidal_daddr().unwrap();
            assert_eq!(
                itcw.set_data(tidal_daddr + 0x1000, true),
                Err(FcxError::InvalidArgs)
            );
            assert_eq!(itcw.tcw().input(), tidal_daddr);
            assert!(itcw.tcw().flags().contains(TcwFlags::INPUT_TIDA));

            itcw.set_data(0x9000, false).unwrap();
            assert!(!itcw.tcw().flags().contains(TcwFlags::INPUT_TIDA));
            itcw.set_data(tidal_daddr, true).unwrap();
            assert_eq!(itcw.tcw().data(), Some(tidal_daddr));
            assert!(itcw.tcw().flags().contains(TcwFlags::INPUT_TIDA));
        });
        with_itcw(ItcwOptions::new(ItcwOp::Read), |mut itcw| {
            assert_eq!(itcw.set_data(0x4000, true), Err(FcxError::InvalidArgs));
        });
    }

    #[test]
    fn header_mirrors_state() {
        let options = ItcwOptions::new(ItcwOp::Read).max_tidaws(3).interrogate(2);
        let mut buf = vec![0u8; options.calc_size()];
        {
            let mut itcw = Itcw::init(Arena::new(&mut buf, ARENA_DADDR), &options).unwrap();
            itcw.add_tidaw(TidawFlags::empty(), 0x4000, 512).unwrap();
        }
        let header = ItcwHeader::ref_from_prefix(&buf).unwrap().0;
        assert_eq!(header.tcw.get(), ARENA_DADDR + 64);
        assert_eq!(header.intrg_tcw.get(), ARENA_DADDR + 128);
        assert_eq!(header.num_tidaws.get(), 1);
        assert_eq!(header.max_tidaws.get(), 4);
        assert_eq!(header.intrg_num_tidaws.get(), 0);
        assert_eq!(header.intrg_max_tidaws.get(), 3);
    }
}

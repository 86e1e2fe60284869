// SPDX-License-Identifier: MPL-2.0

//! Placement of the control blocks inside an arena.

use align_ext::AlignExt;

use crate::{
    arena::Daddr,
    error::{FcxError, Result},
    fcx::{
        PAGE_SIZE, TCCB_ALIGN, TCCB_MAX_SIZE, TCW_ALIGN, TCW_SIZE, TIDAL_ALIGN, TIDAW_SIZE,
        TSB_ALIGN, TSB_SIZE,
    },
    itcw::{ITCW_HEADER_SIZE, ItcwOptions},
};

/// Fits a chunk of `len` bytes aligned to `align` into `[*start, end)`.
///
/// On success, the address of the chunk is returned and `start` is moved
/// past it. If `check_4k` is set, the chunk is moved to the next 4-KiB
/// boundary whenever it would otherwise straddle one. `start` is left
/// untouched on failure.
pub fn fit_chunk(
    start: &mut Daddr,
    end: Daddr,
    len: u64,
    align: u64,
    check_4k: bool,
) -> Result<Daddr> {
    let mut addr = start.checked_align_up(align).ok_or(FcxError::OutOfSpace)?;
    if check_4k && addr.crosses_boundary(len, PAGE_SIZE as u64) {
        addr = addr
            .checked_align_up(PAGE_SIZE as u64)
            .and_then(|addr| addr.checked_align_up(align))
            .ok_or(FcxError::OutOfSpace)?;
    }
    let chunk_end = addr.checked_add(len).ok_or(FcxError::OutOfSpace)?;
    if chunk_end > end {
        return Err(FcxError::OutOfSpace);
    }
    *start = chunk_end;
    Ok(addr)
}

/// A placed chunk of an arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    /// Byte offset from the start of the arena.
    pub offset: usize,
    /// Device address of the first byte.
    pub daddr: Daddr,
    pub len: usize,
}

/// Where every control block of an ITCW lives inside its arena.
///
/// The layout only depends on the device address and size of the arena and
/// on the options, so it can be computed and checked without any memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItcwLayout {
    pub header: Chunk,
    pub tcw: Chunk,
    pub intrg_tcw: Option<Chunk>,
    pub tidal: Option<Chunk>,
    pub intrg_tidal: Option<Chunk>,
    pub tsb: Chunk,
    pub intrg_tsb: Option<Chunk>,
    pub tccb: Chunk,
    pub intrg_tccb: Option<Chunk>,
    /// Number of arena bytes up to the end of the last chunk.
    pub used: usize,
}

impl ItcwLayout {
    /// Lays out the control blocks described by `options` in the arena
    /// `[daddr, daddr + size)`.
    pub fn compute(daddr: Daddr, size: usize, options: &ItcwOptions) -> Result<Self> {
        let end = daddr
            .checked_add(size as u64)
            .ok_or(FcxError::InvalidConfiguration)?;
        let mut cursor = daddr;
        let mut fit = |len: usize, align: usize| -> Result<Chunk> {
            let addr = fit_chunk(&mut cursor, end, len as u64, align as u64, false)?;
            Ok(Chunk {
                offset: (addr - daddr) as usize,
                daddr: addr,
                len,
            })
        };

        let header = fit(ITCW_HEADER_SIZE, 1)?;
        let tcw = fit(TCW_SIZE, TCW_ALIGN)?;
        let intrg_tcw = if options.has_interrogate() {
            Some(fit(TCW_SIZE, TCW_ALIGN)?)
        } else {
            None
        };
        let tidal = if options.requested_tidaws() > 0 {
            let len = options.tidal_capacity() as usize * TIDAW_SIZE;
            Some(fit(len, TIDAL_ALIGN)?)
        } else {
            None
        };
        let intrg_tidal = if options.has_interrogate() && options.requested_intrg_tidaws() > 0 {
            let len = options.intrg_tidal_capacity() as usize * TIDAW_SIZE;
            Some(fit(len, TIDAL_ALIGN)?)
        } else {
            None
        };
        let tsb = fit(TSB_SIZE, TSB_ALIGN)?;
        let intrg_tsb = if options.has_interrogate() {
            Some(fit(TSB_SIZE, TSB_ALIGN)?)
        } else {
            None
        };
        let tccb = fit(TCCB_MAX_SIZE, TCCB_ALIGN)?;
        let intrg_tccb = if options.has_interrogate() {
            Some(fit(TCCB_MAX_SIZE, TCCB_ALIGN)?)
        } else {
            None
        };

        Ok(Self {
            header,
            tcw,
            intrg_tcw,
            tidal,
            intrg_tidal,
            tsb,
            intrg_tsb,
            tccb,
            intrg_tccb,
            used: (cursor - daddr) as usize,
        })
    }

    /// Returns all placed chunks in arena order.
    pub fn chunks(&self) -> impl Iterator<Item = Chunk> + '_ {
        [
            Some(self.header),
            Some(self.tcw),
            self.intrg_tcw,
            self.tidal,
            self.intrg_tidal,
            Some(self.tsb),
            self.intrg_tsb,
            Some(self.tccb),
            self.intrg_tccb,
        ]
        .into_iter()
        .flatten()
    }
}

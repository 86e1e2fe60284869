// SPDX-License-Identifier: MPL-2.0

//! Control blocks of FCX (FICON extension) transport-mode channel programs.
//!
//! Refer to z/Architecture Principles of Operation and the s390 channel I/O
//! definitions:
//! - TCW: Transport Control Word
//! - TCCB: Transport Control Command Block, holding the DCWs
//! - TSB: Transport Status Block
//! - TIDAW: Transport Indirect Data Address Word
//!
//! Every record is a packed sequence of big-endian fields, so it can be
//! placed at any offset of an arena and read back byte-exactly.

mod intrg;
mod tccb;
mod tcw;
mod tidaw;
mod tsb;

pub use self::{
    intrg::{DCW_INTRG_FORMAT_DEFAULT, DcwIntrgData, DcwIntrgFlags, DcwIntrgRc, DcwIntrgRcq},
    tccb::{Dcw, DcwCmd, DcwFlags, DcwIter, Tccb, TccbTcah, TccbTcat},
    tcw::{Tcw, TcwFlags},
    tidaw::{Tidaw, TidawFlags},
    tsb::{Tsa, TsaDdpc, TsaIntrg, TsaIntrgFlags, TsaIostat, Tsb, TsbFlags, TsbFormat},
};
pub(crate) use self::tidaw::cbc_size;

/// The page size assumed by the channel subsystem when walking TIDAW lists.
pub const PAGE_SHIFT: usize = 12;
pub const PAGE_SIZE: usize = 1 << PAGE_SHIFT;

pub const TCW_SIZE: usize = 64;
pub const TCW_ALIGN: usize = 64;

pub const TIDAW_SIZE: usize = 16;
/// Alignment of a TIDAW list.
pub const TIDAL_ALIGN: usize = 16;

pub const TSB_SIZE: usize = 64;
pub const TSB_ALIGN: usize = 8;

pub const DCW_SIZE: usize = 8;
pub const TCCB_TCAH_SIZE: usize = 16;
pub const TCCB_TCAT_SIZE: usize = 8;
/// Maximum number of DCWs without control data in one TCCB.
pub const TCCB_MAX_DCW: usize = 30;
pub const TCCB_MAX_SIZE: usize = TCCB_TCAH_SIZE + TCCB_MAX_DCW * DCW_SIZE + TCCB_TCAT_SIZE;
pub const TCCB_ALIGN: usize = 8;

pub const TCCB_FORMAT_DEFAULT: u8 = 0x7f;
/// Service-action code of a TCCB that carries ordinary commands.
pub const TCCB_SAC_DEFAULT: u16 = 0x1ffe;
/// Service-action code of a TCCB that carries an interrogate command.
pub const TCCB_SAC_INTRG: u16 = 0x1fff;

pub const TCW_FORMAT_DEFAULT: u8 = 0;
pub const TCW_TIDAW_FORMAT_DEFAULT: u8 = 0;

pub const DCW_INTRG_DATA_SIZE: usize = 32;

/// Number of TIDAW slots to reserve, beyond `num_tidaws`, for the TTIC
/// TIDAWs that let a list of `num_tidaws` entries cross page boundaries.
///
/// One slot covers the placement of the list in memory and one more is
/// needed per page boundary that the list may cross due to its own size.
pub const fn cross_count(num_tidaws: u32) -> u32 {
    if num_tidaws == 0 {
        return 0;
    }
    let len = num_tidaws as u64 * TIDAW_SIZE as u64;
    1 + ((len - 1) >> PAGE_SHIFT) as u32
}

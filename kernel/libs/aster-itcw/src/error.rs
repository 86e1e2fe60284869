// SPDX-License-Identifier: MPL-2.0

use core::{fmt, result};

/// The error type of the ITCW builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FcxError {
    /// The arena, a TCCB or a TIDAW list cannot hold the requested item.
    OutOfSpace,
    /// The arena lies beyond the 31-bit address range of the TCW fields.
    InvalidConfiguration,
    /// Invalid arguments.
    InvalidArgs,
}

impl From<int_to_c_enum::TryFromIntError> for FcxError {
    fn from(_e: int_to_c_enum::TryFromIntError) -> Self {
        Self::InvalidArgs
    }
}

impl fmt::Display for FcxError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::OutOfSpace => write!(f, "Not enough space left for the requested structure"),
            Self::InvalidConfiguration => write!(
                f,
                "The arena must be addressable with 31 bits to be referenced by a TCW"
            ),
            Self::InvalidArgs => write!(f, "Invalid arguments"),
        }
    }
}

impl core::error::Error for FcxError {}

pub type Result<T> = result::Result<T, FcxError>;

// SPDX-License-Identifier: MPL-2.0

//! Incremental construction of transport-mode (FCX) channel programs.
//!
//! A transport-mode channel program is started by a single TCW, which
//! points at a TCCB holding the device commands (DCWs), at a TSB receiving
//! the final status and, for data transfers, at either a contiguous buffer
//! or a list of TIDAWs. An optional interrogate TCW, linked from the
//! primary one, asks the device about the state of a stuck operation.
//!
//! This crate lays all of these control blocks out in a caller-provided
//! [`Arena`], honouring the alignment and page-crossing rules of the
//! channel subsystem, and lets a driver append DCWs and TIDAWs one at a time
//! through [`Itcw`]. Use [`ItcwOptions::calc_size`] to size the arena.
//!
//! No memory is allocated by the crate itself.

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_code)]

mod arena;
mod error;
pub mod fcx;
mod itcw;
mod layout;

pub use self::{
    arena::{Arena, Daddr, HasDaddr},
    error::{FcxError, Result},
    itcw::{FinalizedItcw, Itcw, ItcwOp, ItcwOptions, calc_size},
    layout::{Chunk, ItcwLayout, fit_chunk},
};

// SPDX-License-Identifier: MPL-2.0

//! The caller-owned memory that holds a channel program.

use core::mem::{size_of, take};

use zerocopy::{FromBytes, IntoBytes, KnownLayout};

use crate::error::{FcxError, Result};

/// A device address, i.e., the address at which the channel subsystem sees
/// a byte of memory.
pub type Daddr = u64;

/// A type that has a device address.
pub trait HasDaddr {
    /// Returns the device address of the first byte.
    fn daddr(&self) -> Daddr;
}

/// A flat, writable memory region in which a channel program is laid out.
///
/// The arena pairs the bytes with the device address of its first byte.
/// Every address that gets written into a control block is computed from
/// that device address, so the arena may be a plain buffer in tests and a
/// DMA-coherent mapping in a driver.
#[derive(Debug)]
pub struct Arena<'a> {
    bytes: &'a mut [u8],
    daddr: Daddr,
}

impl<'a> Arena<'a> {
    /// Creates an arena over `bytes` that the device sees at `daddr`.
    pub fn new(bytes: &'a mut [u8], daddr: Daddr) -> Self {
        Self { bytes, daddr }
    }

    /// Creates an arena over identity-mapped memory.
    pub fn from_slice(bytes: &'a mut [u8]) -> Self {
        let daddr = bytes.as_ptr() as usize as Daddr;
        Self { bytes, daddr }
    }

    /// Returns the size of the arena in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.bytes
    }

    pub(crate) fn zero(&mut self) {
        self.bytes.fill(0);
    }

    pub(crate) fn into_carver(self) -> Carver<'a> {
        Carver {
            rest: self.bytes,
            pos: 0,
        }
    }
}

impl HasDaddr for Arena<'_> {
    fn daddr(&self) -> Daddr {
        self.daddr
    }
}

/// Splits an arena into disjoint typed views.
///
/// Views must be requested in increasing offset order; the bytes between
/// two views are skipped.
pub(crate) struct Carver<'a> {
    rest: &'a mut [u8],
    pos: usize,
}

impl<'a> Carver<'a> {
    fn take_bytes(&mut self, offset: usize, len: usize) -> Result<&'a mut [u8]> {
        let skip = offset.checked_sub(self.pos).ok_or(FcxError::InvalidArgs)?;
        let rest = take(&mut self.rest);
        if skip.checked_add(len).is_none_or(|needed| needed > rest.len()) {
            return Err(FcxError::OutOfSpace);
        }
        let (chunk, rest) = rest[skip..].split_at_mut(len);
        self.rest = rest;
        self.pos = offset + len;
        Ok(chunk)
    }

    /// Carves one record at `offset`.
    pub(crate) fn record<T>(&mut self, offset: usize) -> Result<&'a mut T>
    where
        T: FromBytes + IntoBytes + KnownLayout,
    {
        let bytes = self.take_bytes(offset, size_of::<T>())?;
        T::mut_from_bytes(bytes).map_err(|_| FcxError::OutOfSpace)
    }

    /// Carves `count` consecutive records at `offset`.
    pub(crate) fn slice<T>(&mut self, offset: usize, count: usize) -> Result<&'a mut [T]>
    where
        T: FromBytes + IntoBytes,
    {
        let len = count
            .checked_mul(size_of::<T>())
            .ok_or(FcxError::OutOfSpace)?;
        let bytes = self.take_bytes(offset, len)?;
        <[T]>::mut_from_bytes(bytes).map_err(|_| FcxError::OutOfSpace)
    }
}

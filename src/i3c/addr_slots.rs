// Licensed under the Apache-2.0 license

//! Per-bus address occupancy table.
//!
//! Each of the 128 seven-bit addresses carries a 2-bit [`AddrStatus`], packed
//! sixteen to a `u32` word.

use crate::i3c::common::{I3C_BCAST_ADDR, I3C_MAX_ADDR};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum AddrStatus {
    Free = 0,
    Reserved = 1,
    I2cDev = 2,
    I3cDev = 3,
}

impl AddrStatus {
    const MASK: u32 = 0b11;

    const fn from_bits(bits: u32) -> Self {
        match bits & Self::MASK {
            0 => AddrStatus::Free,
            1 => AddrStatus::Reserved,
            2 => AddrStatus::I2cDev,
            _ => AddrStatus::I3cDev,
        }
    }
}

const BITS_PER_ADDR: usize = 2;
const ADDRS_PER_WORD: usize = u32::BITS as usize / BITS_PER_ADDR;
const SLOT_WORDS: usize = (I3C_MAX_ADDR as usize + 1) / ADDRS_PER_WORD;

/// Addresses `0..=7` are reserved by the I3C protocol.
const LOW_RESERVED_END: u8 = 7;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AddrSlots {
    words: [u32; SLOT_WORDS],
}

impl Default for AddrSlots {
    fn default() -> Self {
        Self::new()
    }
}

impl AddrSlots {
    /// A table with only the protocol-reserved addresses marked.
    #[must_use]
    pub fn new() -> Self {
        let mut slots = Self {
            words: [0; SLOT_WORDS],
        };
        slots.init();
        slots
    }

    /// Clear the table and reserve `0..=7`, the broadcast address and every
    /// address one bit away from it.
    pub fn init(&mut self) {
        self.words = [0; SLOT_WORDS];
        for addr in 0..=LOW_RESERVED_END {
            self.set_status(addr, AddrStatus::Reserved);
        }
        self.set_status(I3C_BCAST_ADDR, AddrStatus::Reserved);
        for bit in 0..7 {
            self.set_status(I3C_BCAST_ADDR ^ (1 << bit), AddrStatus::Reserved);
        }
    }

    const fn locate(addr: u8) -> (usize, u32) {
        let idx = addr as usize;
        (
            idx / ADDRS_PER_WORD,
            ((idx % ADDRS_PER_WORD) * BITS_PER_ADDR) as u32,
        )
    }

    /// Record `status` for `addr`. Addresses above `0x7f` are ignored.
    pub fn set_status(&mut self, addr: u8, status: AddrStatus) {
        if addr > I3C_MAX_ADDR {
            return;
        }
        let (word, shift) = Self::locate(addr);
        if let Some(w) = self.words.get_mut(word) {
            *w = (*w & !(AddrStatus::MASK << shift)) | ((status as u32) << shift);
        }
    }

    /// Status of `addr`; addresses above `0x7f` read as reserved.
    #[must_use]
    pub fn status(&self, addr: u8) -> AddrStatus {
        if addr > I3C_MAX_ADDR {
            return AddrStatus::Reserved;
        }
        let (word, shift) = Self::locate(addr);
        self.words
            .get(word)
            .map_or(AddrStatus::Reserved, |w| AddrStatus::from_bits(w >> shift))
    }

    #[must_use]
    pub fn is_avail(&self, addr: u8) -> bool {
        self.status(addr) == AddrStatus::Free
    }

    /// Lowest free address at or above `start`, or `0` when none is left.
    ///
    /// Address `0` is always reserved, so `0` never names a free slot.
    #[must_use]
    pub fn get_free(&self, start: u8) -> u8 {
        (start..=I3C_MAX_ADDR)
            .find(|addr| self.is_avail(*addr))
            .unwrap_or(0)
    }
}

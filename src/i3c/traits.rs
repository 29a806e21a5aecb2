// Licensed under the Apache-2.0 license

//! # I3C backend traits
//!
//! ```text
//! I3cPlatform (controller binding, implemented per SoC)
//!     └── I3cBus (address table, DAA bookkeeping, IRQ dispatch)
//!             └── I3cDevice (per-target handle)
//! ```
//!
//! Bus and device bring-up, teardown and the readiness probe are mandatory; the
//! remaining operations report `Error::NotImplemented` unless overridden.

use crate::error::Error;
use crate::i3c::addr_slots::{AddrSlots, AddrStatus};
use crate::i3c::common::{CccInfo, CccTransfer, DaaCandidate, I3cTarget};

pub trait I3cPlatform: Sized {
    /// Backend-specific bus configuration.
    type Config;

    /// Bring up controller `device_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the controller cannot be configured.
    fn init_bus(config: &Self::Config, device_id: u8) -> Result<Self, Error>;

    /// # Errors
    ///
    /// Returns an error if the controller refuses to shut down.
    fn remove_bus(&mut self) -> Result<(), Error>;

    /// Prepare controller state for the target held in descriptor `slot`.
    ///
    /// # Errors
    ///
    /// Returns an error if the controller cannot track the target.
    fn init_device(&mut self, slot: usize, target: &I3cTarget) -> Result<(), Error>;

    /// # Errors
    ///
    /// Returns an error if controller state for the target cannot be released.
    fn remove_device(&mut self, slot: usize, target: &I3cTarget) -> Result<(), Error>;

    /// Probe that the target answers at its address.
    ///
    /// # Errors
    ///
    /// Returns an error if the target does not acknowledge.
    fn is_dev_ready(&mut self, slot: usize, target: &I3cTarget) -> Result<(), Error>;

    /// Run dynamic address assignment, resolving every responding target
    /// through `daa`. `rstdaa` requests a `RSTDAA` before `ENTDAA`.
    ///
    /// # Errors
    ///
    /// Returns an error if the procedure fails or addresses run out.
    fn do_daa(&mut self, _daa: &mut DaaContext<'_>, _rstdaa: bool) -> Result<(), Error> {
        Err(Error::NotImplemented)
    }

    /// # Errors
    ///
    /// Returns an error if the command is not acknowledged.
    fn send_ccc(&mut self, _ccc: &mut CccTransfer<'_>) -> Result<(), Error> {
        Err(Error::NotImplemented)
    }

    /// Private write to `target`.
    ///
    /// # Errors
    ///
    /// Returns an error if the transfer fails.
    fn write(&mut self, _target: &I3cTarget, _data: &[u8]) -> Result<(), Error> {
        Err(Error::NotImplemented)
    }

    /// Private read from `target`.
    ///
    /// # Errors
    ///
    /// Returns an error if the transfer fails.
    fn read(&mut self, _target: &I3cTarget, _data: &mut [u8]) -> Result<(), Error> {
        Err(Error::NotImplemented)
    }

    /// Write then read with a repeated start in between.
    ///
    /// # Errors
    ///
    /// Returns an error if either phase fails.
    fn write_and_read(
        &mut self,
        _target: &I3cTarget,
        _tx: &[u8],
        _rx: &mut [u8],
    ) -> Result<(), Error> {
        Err(Error::NotImplemented)
    }

    /// Enable or disable controller interrupts for the `I3C_IRQ_*` bits in `events`.
    ///
    /// # Errors
    ///
    /// Returns an error if the notifications cannot be (re)configured.
    fn conf_irq(&mut self, _events: u32, _enable: bool) -> Result<(), Error> {
        Err(Error::NotImplemented)
    }

    /// Fetch the event record latched for the pending `events`.
    ///
    /// # Errors
    ///
    /// Returns an error if no record is available.
    fn get_ccc_info(&mut self, _events: u32) -> Result<CccInfo, Error> {
        Err(Error::NotImplemented)
    }
}

/// Bus state a backend consults while running DAA.
///
/// Each target that answers `ENTDAA` is passed to [`DaaContext::assign`], which
/// decides its dynamic address and updates the bus bookkeeping.
pub struct DaaContext<'a> {
    candidates: &'a mut [DaaCandidate],
    slots: &'a mut AddrSlots,
}

impl<'a> DaaContext<'a> {
    pub(crate) fn new(candidates: &'a mut [DaaCandidate], slots: &'a mut AddrSlots) -> Self {
        Self { candidates, slots }
    }

    /// Address for the target with provisioned id `pid`.
    ///
    /// A declared target receives its declared address and is marked attached.
    /// Any other target receives the lowest free address not promised to a
    /// declared target. Either way the address becomes an I3C device address.
    ///
    /// # Errors
    ///
    /// `Error::OutOfMemory` when no address is left for an undeclared target.
    pub fn assign(&mut self, pid: u64, bcr: u8, dcr: u8) -> Result<u8, Error> {
        self.assign_with(pid, bcr, dcr, |_| Ok(()))
    }

    /// As [`DaaContext::assign`], but the address is first handed to `program`,
    /// which gives it to the target. The bookkeeping only changes once `program`
    /// succeeds.
    ///
    /// # Errors
    ///
    /// `Error::OutOfMemory` when no address is left, otherwise the error of
    /// `program`.
    pub fn assign_with(
        &mut self,
        pid: u64,
        bcr: u8,
        dcr: u8,
        program: impl FnOnce(u8) -> Result<(), Error>,
    ) -> Result<u8, Error> {
        let declared = self
            .candidates
            .iter()
            .position(|c| c.is_used() && c.pid == pid);
        let addr = match declared.and_then(|idx| self.candidates.get(idx)) {
            Some(cand) => cand.addr,
            None => self.next_unpromised()?,
        };

        program(addr)?;

        if let Some(cand) = declared.and_then(|idx| self.candidates.get_mut(idx)) {
            cand.is_attached = true;
            cand.bcr = bcr;
            cand.dcr = dcr;
        }
        self.slots.set_status(addr, AddrStatus::I3cDev);
        Ok(addr)
    }

    fn next_unpromised(&self) -> Result<u8, Error> {
        let mut start = 0u8;
        loop {
            let addr = self.slots.get_free(start);
            if addr == 0 {
                return Err(Error::OutOfMemory);
            }
            if !self.candidates.iter().any(|c| c.is_used() && c.addr == addr) {
                return Ok(addr);
            }
            start = addr.saturating_add(1);
        }
    }

    #[must_use]
    pub fn candidates(&self) -> &[DaaCandidate] {
        self.candidates
    }

    /// Declared targets still waiting for their address.
    #[must_use]
    pub fn unattached(&self) -> usize {
        self.candidates
            .iter()
            .filter(|c| c.is_used() && !c.is_attached)
            .count()
    }

    #[must_use]
    pub fn addr_status(&self, addr: u8) -> AddrStatus {
        self.slots.status(addr)
    }
}

// Licensed under the Apache-2.0 license

//! Per-target device handles.
//!
//! An [`I3cDevice`] borrows its bus and owns one descriptor slot on it until
//! [`I3cDevice::remove`] is called or the handle is dropped.

use crate::common::{Logger, NoOpLogger};
use crate::error::Error;
use crate::i3c::bus::{I3cBus, I3cBusRegistry};
use crate::i3c::ccc::{self, Ccc};
use crate::i3c::common::{I3cEventCallback, I3cInitParam, I3cTarget};
use crate::i3c::traits::I3cPlatform;
use core::mem::ManuallyDrop;
use embassy_sync::blocking_mutex::raw::RawMutex;
use embedded_hal::i2c::{Operation, SevenBitAddress};
use zerocopy::byteorder::{BigEndian, U16};
use zerocopy::{FromBytes, Immutable, KnownLayout};

/// `GETPID` response: 48-bit provisioned id, most significant byte first.
#[derive(FromBytes, KnownLayout, Immutable)]
#[repr(C)]
struct PidPayload {
    pid: [u8; 6],
}

impl PidPayload {
    fn value(&self) -> u64 {
        self.pid
            .iter()
            .fold(0u64, |acc, byte| (acc << 8) | u64::from(*byte))
    }
}

pub struct I3cDevice<'b, P, M, L = NoOpLogger>
where
    P: I3cPlatform,
    M: RawMutex,
    L: Logger,
{
    bus: &'b I3cBus<P, M, L>,
    slot: usize,
    target: I3cTarget,
    bcr: u8,
    dcr: u8,
}

impl<'b, P, M, L> I3cDevice<'b, P, M, L>
where
    P: I3cPlatform,
    M: RawMutex,
    L: Logger,
{
    /// Create a descriptor for `param.target`, bringing up its bus first if the
    /// registry does not hold it yet.
    ///
    /// # Errors
    ///
    /// * `Error::InvalidArgument` for a bad bus id.
    /// * `Error::Fault` if a dynamic target was never declared to the bus.
    /// * `Error::PermissionDenied` if it was declared but DAA did not find it.
    /// * `Error::OutOfMemory` if every descriptor slot is taken.
    /// * Otherwise the bus bring-up or backend error.
    pub fn init(
        registry: &'b I3cBusRegistry<P, M, L>,
        param: &I3cInitParam<'_, P::Config>,
    ) -> Result<Self, Error>
    where
        L: Clone,
    {
        let id = param.bus.device_id;
        let bus = match registry.get(id) {
            Some(bus) => bus,
            None => registry.init_bus(param.bus)?,
        };
        Self::attach(bus, &param.target)
    }

    /// Create a descriptor for `target` on an already running bus.
    ///
    /// # Errors
    ///
    /// As [`I3cDevice::init`], minus bus bring-up.
    pub fn attach(bus: &'b I3cBus<P, M, L>, target: &I3cTarget) -> Result<Self, Error> {
        let a = bus.attach(target)?;
        Ok(Self {
            bus,
            slot: a.slot,
            target: a.target,
            bcr: a.bcr,
            dcr: a.dcr,
        })
    }

    /// Release the descriptor slot. The bus stays up.
    ///
    /// Dropping the handle does the same but can only log the backend error.
    ///
    /// # Errors
    ///
    /// Returns the backend error; the slot is released regardless.
    pub fn remove(self) -> Result<(), Error> {
        let this = ManuallyDrop::new(self);
        this.bus.detach(this.slot)
    }

    pub fn bus(&self) -> &'b I3cBus<P, M, L> {
        self.bus
    }

    #[must_use]
    pub const fn slot(&self) -> usize {
        self.slot
    }

    #[must_use]
    pub const fn target(&self) -> &I3cTarget {
        &self.target
    }

    #[must_use]
    pub const fn pid(&self) -> u64 {
        self.target.pid
    }

    /// Address the device answers at: the DAA-assigned one for dynamic targets.
    #[must_use]
    pub const fn addr(&self) -> u8 {
        self.target.addr
    }

    #[must_use]
    pub const fn is_i3c(&self) -> bool {
        self.target.is_i3c
    }

    #[must_use]
    pub const fn is_static(&self) -> bool {
        self.target.is_static
    }

    /// Bus characteristics register captured during DAA.
    #[must_use]
    pub const fn bcr(&self) -> u8 {
        self.bcr
    }

    /// Device characteristics register captured during DAA.
    #[must_use]
    pub const fn dcr(&self) -> u8 {
        self.dcr
    }

    /// Send a direct CCC to this device.
    ///
    /// # Errors
    ///
    /// `Error::InvalidArgument` if `ccc` is a broadcast command, otherwise as
    /// [`I3cBus::send_ccc`].
    pub fn send_direct_ccc(&self, ccc: Ccc, data: &mut [u8]) -> Result<(), Error> {
        if !ccc.is_direct() {
            return Err(Error::InvalidArgument);
        }
        self.bus.send_ccc(self.target.addr, ccc, data)
    }

    /// # Errors
    ///
    /// Returns the backend error.
    pub fn write(&self, data: &[u8]) -> Result<(), Error> {
        self.bus.with_platform(|p| p.write(&self.target, data))
    }

    /// # Errors
    ///
    /// Returns the backend error.
    pub fn read(&self, data: &mut [u8]) -> Result<(), Error> {
        self.bus.with_platform(|p| p.read(&self.target, data))
    }

    /// # Errors
    ///
    /// Returns the backend error.
    pub fn write_and_read(&self, tx: &[u8], rx: &mut [u8]) -> Result<(), Error> {
        self.bus
            .with_platform(|p| p.write_and_read(&self.target, tx, rx))
    }

    /// Route interrupts raised by this device to `callback`.
    ///
    /// # Errors
    ///
    /// `Error::InvalidArgument` if the descriptor slot is gone.
    pub fn attach_callback(&self, callback: I3cEventCallback) -> Result<(), Error> {
        self.bus.set_callback(self.slot, Some(callback))
    }

    /// # Errors
    ///
    /// `Error::InvalidArgument` if the descriptor slot is gone.
    pub fn detach_callback(&self) -> Result<(), Error> {
        self.bus.set_callback(self.slot, None)
    }

    /// Read the provisioned id with `GETPID`.
    ///
    /// # Errors
    ///
    /// Returns the CCC error.
    pub fn get_pid(&self) -> Result<u64, Error> {
        let mut buf = [0u8; 6];
        self.send_direct_ccc(ccc::GETPID, &mut buf)?;
        let payload = PidPayload::read_from_bytes(&buf).map_err(|_| Error::Fault)?;
        Ok(payload.value())
    }

    /// # Errors
    ///
    /// Returns the CCC error.
    pub fn get_bcr(&self) -> Result<u8, Error> {
        self.read_u8(ccc::GETBCR)
    }

    /// # Errors
    ///
    /// Returns the CCC error.
    pub fn get_dcr(&self) -> Result<u8, Error> {
        self.read_u8(ccc::GETDCR)
    }

    /// `GETSTATUS` word.
    ///
    /// # Errors
    ///
    /// Returns the CCC error.
    pub fn get_status(&self) -> Result<u16, Error> {
        self.read_u16(ccc::GETSTATUS)
    }

    /// # Errors
    ///
    /// Returns the CCC error.
    pub fn get_max_write_len(&self) -> Result<u16, Error> {
        self.read_u16(ccc::GETMWL)
    }

    /// # Errors
    ///
    /// Returns the CCC error.
    pub fn get_max_read_len(&self) -> Result<u16, Error> {
        self.read_u16(ccc::GETMRL)
    }

    /// # Errors
    ///
    /// Returns the CCC error.
    pub fn set_max_write_len(&self, len: u16) -> Result<(), Error> {
        self.send_direct_ccc(ccc::SETMWL_DIRECT, &mut len.to_be_bytes())
    }

    /// # Errors
    ///
    /// Returns the CCC error.
    pub fn set_max_read_len(&self, len: u16) -> Result<(), Error> {
        self.send_direct_ccc(ccc::SETMRL_DIRECT, &mut len.to_be_bytes())
    }

    /// Enable target events (`ccc::EVENT_*` bits) with `ENEC`.
    ///
    /// # Errors
    ///
    /// Returns the CCC error.
    pub fn enable_events(&self, events: u8) -> Result<(), Error> {
        self.send_direct_ccc(ccc::ENEC_DIRECT, &mut [events])
    }

    /// # Errors
    ///
    /// Returns the CCC error.
    pub fn disable_events(&self, events: u8) -> Result<(), Error> {
        self.send_direct_ccc(ccc::DISEC_DIRECT, &mut [events])
    }

    fn read_u8(&self, ccc: Ccc) -> Result<u8, Error> {
        let mut buf = [0u8; 1];
        self.send_direct_ccc(ccc, &mut buf)?;
        let [value] = buf;
        Ok(value)
    }

    fn read_u16(&self, ccc: Ccc) -> Result<u16, Error> {
        let mut buf = [0u8; 2];
        self.send_direct_ccc(ccc, &mut buf)?;
        let value = U16::<BigEndian>::read_from_bytes(&buf).map_err(|_| Error::Fault)?;
        Ok(value.get())
    }

    fn check_addr(&self, addr: SevenBitAddress) -> Result<(), Error> {
        if addr == self.target.addr {
            Ok(())
        } else {
            Err(Error::InvalidArgument)
        }
    }
}

impl<P, M, L> Drop for I3cDevice<'_, P, M, L>
where
    P: I3cPlatform,
    M: RawMutex,
    L: Logger,
{
    fn drop(&mut self) {
        // The bus logs the failure.
        let _ = self.bus.detach(self.slot);
    }
}

impl<P, M, L> embedded_hal::i2c::ErrorType for I3cDevice<'_, P, M, L>
where
    P: I3cPlatform,
    M: RawMutex,
    L: Logger,
{
    type Error = Error;
}

/// Private transfers through the `embedded-hal` bus interface. The address must
/// be the device's own.
impl<P, M, L> embedded_hal::i2c::I2c for I3cDevice<'_, P, M, L>
where
    P: I3cPlatform,
    M: RawMutex,
    L: Logger,
{
    fn read(&mut self, addr: SevenBitAddress, buffer: &mut [u8]) -> Result<(), Self::Error> {
        self.check_addr(addr)?;
        I3cDevice::read(self, buffer)
    }

    fn write(&mut self, addr: SevenBitAddress, bytes: &[u8]) -> Result<(), Self::Error> {
        self.check_addr(addr)?;
        I3cDevice::write(self, bytes)
    }

    fn write_read(
        &mut self,
        addr: SevenBitAddress,
        bytes: &[u8],
        buffer: &mut [u8],
    ) -> Result<(), Self::Error> {
        self.check_addr(addr)?;
        I3cDevice::write_and_read(self, bytes, buffer)
    }

    fn transaction(
        &mut self,
        addr: SevenBitAddress,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        self.check_addr(addr)?;
        match operations {
            [Operation::Write(tx), Operation::Read(rx)] => I3cDevice::write_and_read(self, tx, rx),
            ops => ops.iter_mut().try_for_each(|op| match op {
                Operation::Write(tx) => I3cDevice::write(self, tx),
                Operation::Read(rx) => I3cDevice::read(self, rx),
            }),
        }
    }
}

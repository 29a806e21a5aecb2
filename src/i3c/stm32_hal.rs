// Licensed under the Apache-2.0 license

//! Contract between the STM32 I3C backend and the vendor HAL driver.
//!
//! Transfers follow the HAL's interrupt-driven model: a `start_*` call programs
//! the controller and returns, after which the HAL state machine runs until it
//! settles in [`HalState::Ready`] or [`HalState::Error`]. The backend calls
//! [`Stm32I3cHal::service`] while it waits so that FIFO traffic can be moved
//! between the controller and the caller's buffers.

use crate::error::Error;
use crate::i3c::common::CccInfo;
use fugit::HertzU32;

/// Number of device characteristics registers (`DEVRx`) on the controller.
pub const STM32_I3C_DEVR_COUNT: usize = 4;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum HalState {
    Reset,
    Ready,
    Busy,
    BusyTx,
    BusyRx,
    BusyDaa,
    Abort,
    Error,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum HalError {
    Nack,
    Arbitration,
    Overrun,
    Protocol,
    Dma,
    Busy,
}

impl From<HalError> for Error {
    fn from(err: HalError) -> Self {
        match err {
            HalError::Busy => Error::Timeout,
            HalError::Nack
            | HalError::Arbitration
            | HalError::Overrun
            | HalError::Protocol
            | HalError::Dma => Error::Io,
        }
    }
}

/// Frame type of a controller transfer.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum XferKind {
    I3cPrivate,
    I2cPrivate,
    /// CCC with id `id`; broadcast when addressed to `0x7e`.
    Ccc { id: u8, def_byte: bool },
}

/// Clock settings the HAL derives its timing registers from.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct HalTiming {
    pub kernel_clk: HertzU32,
    pub sdr_freq: HertzU32,
    pub i2c_freq: HertzU32,
}

/// One `DEVRx` entry.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct HalTargetEntry {
    pub addr: u8,
    pub ibi_ack: bool,
    pub ibi_payload: bool,
    pub ctrl_role_ack: bool,
}

/// A transfer in flight. `tx` is sent first; `rx` is filled after a repeated
/// start when both are non-empty.
pub struct HalXfer<'a> {
    pub addr: u8,
    pub kind: XferKind,
    pub tx: &'a [u8],
    pub rx: &'a mut [u8],
}

pub trait Stm32I3cHal {
    /// # Errors
    ///
    /// Returns the HAL error if the controller cannot be configured.
    fn init(&mut self, timing: &HalTiming) -> Result<(), HalError>;

    /// # Errors
    ///
    /// Returns the HAL error if the controller cannot be stopped.
    fn deinit(&mut self) -> Result<(), HalError>;

    fn state(&self) -> HalState;

    /// Error that moved the HAL into [`HalState::Error`].
    fn last_error(&self) -> HalError;

    /// Start an interrupt-driven transfer.
    ///
    /// # Errors
    ///
    /// Returns the HAL error if the transfer cannot be queued.
    fn start_xfer_it(&mut self, xfer: &HalXfer<'_>) -> Result<(), HalError>;

    /// Start a transfer whose FIFO traffic is moved by DMA.
    ///
    /// # Errors
    ///
    /// `HalError::Dma` unless the HAL supports DMA requests.
    fn start_xfer_dma(&mut self, _xfer: &HalXfer<'_>) -> Result<(), HalError> {
        Err(HalError::Dma)
    }

    /// Move pending FIFO data for `xfer`.
    fn service(&mut self, xfer: &mut HalXfer<'_>);

    /// # Errors
    ///
    /// Returns the HAL error if no abort can be issued.
    fn abort(&mut self) -> Result<(), HalError>;

    /// Bus address of the transmit data register, for DMA descriptors.
    fn tx_fifo_addr(&self) -> usize;

    /// Bus address of the receive data register, for DMA descriptors.
    fn rx_fifo_addr(&self) -> usize;

    /// Start `ENTDAA`, preceded by `RSTDAA` when `rstdaa` is set.
    ///
    /// # Errors
    ///
    /// Returns the HAL error if the procedure cannot be started.
    fn start_daa(&mut self, rstdaa: bool) -> Result<(), HalError>;

    /// Payload of the target currently asking for a dynamic address: 48-bit
    /// provisioned id (MSB first), BCR, DCR.
    fn daa_request(&mut self) -> Option<[u8; 8]>;

    /// Answer the current address request with `addr`.
    ///
    /// # Errors
    ///
    /// Returns the HAL error if no request is pending.
    fn set_dynamic_addr(&mut self, addr: u8) -> Result<(), HalError>;

    /// # Errors
    ///
    /// Returns the HAL error if `index` is not a valid `DEVRx` slot.
    fn config_target(&mut self, index: usize, entry: &HalTargetEntry) -> Result<(), HalError>;

    /// # Errors
    ///
    /// Returns the HAL error if the probe could not be issued.
    fn is_device_ready(&mut self, addr: u8, is_i3c: bool) -> Result<bool, HalError>;

    /// Enable or disable the notifications behind `I3C_IRQ_*` bits.
    ///
    /// # Errors
    ///
    /// Returns the HAL error if the interrupt enable register cannot be updated.
    fn notifications(&mut self, events: u32, enable: bool) -> Result<(), HalError>;

    /// # Errors
    ///
    /// Returns the HAL error if nothing is latched for `events`.
    fn ccc_info(&mut self, events: u32) -> Result<CccInfo, HalError>;
}

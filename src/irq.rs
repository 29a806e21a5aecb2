// Licensed under the Apache-2.0 license

//! Interrupt controller contract consumed by the DMA engine and the I3C backends.
//!
//! The core never requires an interrupt controller: every caller holds an
//! `Option<&dyn IrqController>` and operates fully polled when it is `None`.

use crate::error::Error;

/// Peripheral class an interrupt callback is registered for.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Peripheral {
    /// Plain memory, used as the originator of memory-to-memory DMA copies.
    Memory,
    Dma,
    I3c,
    Spi,
}

/// Interrupt event class.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum IrqEvent {
    DmaTxComplete,
    DmaRxComplete,
    I3cIbi,
    I3cHotJoin,
}

/// Key identifying one registered interrupt callback: peripheral class, instance
/// handle (DMA channel id, bus id, ...) and event class.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct IrqSource {
    pub peripheral: Peripheral,
    pub handle: usize,
    pub event: IrqEvent,
}

/// Interrupt controller operations.
///
/// Implementations route the hardware vector for `irq` to whichever driver entry
/// point registered `source`; the driver entry points themselves are plain methods
/// (e.g. [`crate::dma::DmaController::on_irq`]).
pub trait IrqController {
    /// Register interest in `source` on interrupt line `irq`.
    ///
    /// # Errors
    ///
    /// Returns an error if the controller cannot record another callback.
    fn register_callback(&self, irq: u32, source: IrqSource) -> Result<(), Error>;

    /// Drop a registration made with [`IrqController::register_callback`].
    ///
    /// # Errors
    ///
    /// Returns an error if `source` was never registered on `irq`.
    fn unregister_callback(&self, irq: u32, source: IrqSource) -> Result<(), Error>;

    /// Unmask interrupt line `irq`.
    ///
    /// # Errors
    ///
    /// Returns an error if `irq` is not a valid line for this controller.
    fn enable(&self, irq: u32) -> Result<(), Error>;

    /// Mask interrupt line `irq`.
    ///
    /// # Errors
    ///
    /// Returns an error if `irq` is not a valid line for this controller.
    fn disable(&self, irq: u32) -> Result<(), Error>;

    /// Set the priority level of line `irq`.
    ///
    /// # Errors
    ///
    /// Returns an error if `irq` or `priority` is out of range.
    fn set_priority(&self, irq: u32, priority: u32) -> Result<(), Error>;
}

// Licensed under the Apache-2.0 license

//! Transfer descriptors and initialisation parameters for the DMA engine.

use crate::dma::traits::DmaEngine;
use crate::error::Error;
use crate::irq::{IrqEvent, Peripheral};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DmaXferType {
    MemToMem,
    MemToDev,
    DevToMem,
    DevToDev,
}

impl DmaXferType {
    /// Interrupt event that signals completion of this kind of transfer.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidArgument` for transfer kinds that have no completion
    /// event class (device-to-device).
    pub const fn irq_event(self) -> Result<IrqEvent, Error> {
        match self {
            DmaXferType::MemToDev | DmaXferType::MemToMem => Ok(IrqEvent::DmaTxComplete),
            DmaXferType::DevToMem => Ok(IrqEvent::DmaRxComplete),
            DmaXferType::DevToDev => Err(Error::InvalidArgument),
        }
    }
}

/// Completion notification: function pointer plus opaque context.
///
/// `func` receives the transfer that just finished and, when the channel has more
/// work queued, the transfer that will run next.
#[derive(Copy, Clone, Debug)]
pub struct DmaCompletion {
    pub func: fn(&DmaXfer, Option<&DmaXfer>, usize),
    pub ctx: usize,
}

/// One entry of a channel's scatter/gather list.
///
/// `src` and `dst` are bus addresses as seen by the DMA engine. Descriptors are
/// copied into the channel list when configured.
#[derive(Copy, Clone, Debug)]
pub struct DmaXfer {
    pub src: usize,
    pub dst: usize,
    pub length: usize,
    pub xfer_type: DmaXferType,
    /// Peripheral the transfer serves; selects the interrupt event class.
    pub periph: Peripheral,
    pub irq_priority: u32,
    pub complete: Option<DmaCompletion>,
}

impl DmaXfer {
    #[must_use]
    pub const fn new(
        src: usize,
        dst: usize,
        length: usize,
        xfer_type: DmaXferType,
        periph: Peripheral,
    ) -> Self {
        Self {
            src,
            dst,
            length,
            xfer_type,
            periph,
            irq_priority: 0,
            complete: None,
        }
    }

    #[must_use]
    pub const fn with_irq_priority(mut self, priority: u32) -> Self {
        self.irq_priority = priority;
        self
    }

    #[must_use]
    pub const fn with_completion(
        mut self,
        func: fn(&DmaXfer, Option<&DmaXfer>, usize),
        ctx: usize,
    ) -> Self {
        self.complete = Some(DmaCompletion { func, ctx });
        self
    }
}

/// Scatter/gather interrupt handler installed on a configured channel.
///
/// Receives the engine that owns the channel and the channel id.
pub type SgHandler = fn(&dyn DmaEngine, usize);

/// Built-in scatter/gather handler: advance the channel list by one entry.
///
/// [`DmaEngine::sg_complete`] logs its own failures and leaves the channel
/// aborted and free, so the result is dropped here.
pub fn default_sg_handler(engine: &dyn DmaEngine, ch: usize) {
    let _ = engine.sg_complete(ch);
}

pub struct DmaInitParam<'a> {
    /// Controller instance id, passed through to the platform.
    pub id: u32,
    /// Number of channels to bring up, at most the controller capacity.
    pub num_ch: usize,
    /// Interrupt line for each channel, indexed by channel id.
    pub irq_nums: &'a [u32],
    /// Replaces [`default_sg_handler`] on every channel when set.
    pub sg_handler: Option<SgHandler>,
}

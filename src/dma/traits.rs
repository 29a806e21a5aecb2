// Licensed under the Apache-2.0 license

//! # DMA abstraction traits
//!
//! ```text
//! DmaPlatform (hardware binding, implemented per SoC)
//!     └── DmaController (generic channel/list management)
//!             └── DmaEngine (object-safe view used by peripheral backends)
//! ```
//!
//! Every `DmaPlatform` method takes `&self`: the platform sits behind the two-tier
//! locking of [`crate::dma::DmaController`] and must be callable from channel
//! context without holding the controller lock.

use crate::dma::common::{DmaInitParam, DmaXfer};
use crate::error::Error;

/// Hardware operations of one DMA engine.
///
/// `init` and `remove` are mandatory. The remaining operations are optional and
/// report `Error::NotImplemented` unless the platform overrides them.
pub trait DmaPlatform {
    /// Bring up the engine for `param.num_ch` channels.
    ///
    /// # Errors
    ///
    /// Returns an error if the hardware cannot be initialised.
    fn init(&self, param: &DmaInitParam<'_>) -> Result<(), Error>;

    /// Shut the engine down.
    ///
    /// # Errors
    ///
    /// Returns an error if the hardware refuses to stop.
    fn remove(&self) -> Result<(), Error>;

    /// Pick a channel among those marked `true` in `eligible`.
    ///
    /// `eligible[id]` is `false` for channels that are busy or manually reserved;
    /// the platform must not return such a channel.
    ///
    /// # Errors
    ///
    /// Returns an error if no eligible channel can serve a transfer.
    fn acquire_channel(&self, _eligible: &[bool]) -> Result<usize, Error> {
        Err(Error::NotImplemented)
    }

    /// # Errors
    ///
    /// Returns an error if the channel cannot be handed back to the hardware pool.
    fn release_channel(&self, _ch: usize) -> Result<(), Error> {
        Err(Error::NotImplemented)
    }

    /// Program `xfer` into the channel registers without starting it.
    ///
    /// # Errors
    ///
    /// Returns an error if the descriptor cannot be expressed by the hardware.
    fn config_xfer(&self, _ch: usize, _xfer: &DmaXfer) -> Result<(), Error> {
        Err(Error::NotImplemented)
    }

    /// # Errors
    ///
    /// Returns an error if the channel cannot be started.
    fn xfer_start(&self, _ch: usize) -> Result<(), Error> {
        Err(Error::NotImplemented)
    }

    /// Stop the channel and discard in-flight hardware state.
    ///
    /// # Errors
    ///
    /// Returns an error if the channel cannot be stopped.
    fn xfer_abort(&self, _ch: usize) -> Result<(), Error> {
        Err(Error::NotImplemented)
    }

    /// Whether the hardware is still moving data on `ch`.
    ///
    /// # Errors
    ///
    /// Returns an error if the channel state cannot be read.
    fn ch_in_progress(&self, _ch: usize) -> Result<bool, Error> {
        Err(Error::NotImplemented)
    }
}

/// Channel-level DMA operations, independent of controller type parameters.
///
/// Peripheral backends hold a `&dyn DmaEngine` so that they do not have to name
/// the platform, mutex and capacity parameters of the controller they drive.
pub trait DmaEngine {
    /// Reserve a free, unlocked channel.
    ///
    /// # Errors
    ///
    /// `Error::OutOfMemory` if no channel is eligible, or the platform error.
    fn acquire_channel(&self) -> Result<usize, Error>;

    /// # Errors
    ///
    /// `Error::InvalidArgument` if `ch` is unknown or still has queued transfers.
    fn release_channel(&self, ch: usize) -> Result<(), Error>;

    /// Append `xfers` to the scatter/gather list of `ch`.
    ///
    /// # Errors
    ///
    /// On any error the list is restored to its previous length.
    fn config_xfer(&self, ch: usize, xfers: &[DmaXfer]) -> Result<(), Error>;

    /// # Errors
    ///
    /// `Error::InvalidArgument` if nothing is queued on `ch`, or the platform error.
    fn xfer_start(&self, ch: usize) -> Result<(), Error>;

    /// # Errors
    ///
    /// Returns the platform error; the list is drained regardless.
    fn xfer_abort(&self, ch: usize) -> Result<(), Error>;

    /// # Errors
    ///
    /// `Error::InvalidArgument` if `ch` is unknown.
    fn is_completed(&self, ch: usize) -> Result<bool, Error>;

    /// # Errors
    ///
    /// `Error::NotImplemented` if the platform cannot report channel activity.
    fn in_progress(&self, ch: usize) -> Result<bool, Error>;

    /// Non-blocking completion check, driving the list forward when polled.
    ///
    /// # Errors
    ///
    /// `nb::Error::WouldBlock` while transfers remain queued.
    fn poll_xfer(&self, ch: usize) -> nb::Result<(), Error>;

    /// One scatter/gather completion step: retire the head transfer and start the
    /// next one, or free the channel when the list runs dry.
    ///
    /// # Errors
    ///
    /// `Error::Fault` if the list was already empty; the channel is aborted. A
    /// failure to start the next entry aborts the list, frees the channel and is
    /// returned as is.
    fn sg_complete(&self, ch: usize) -> Result<(), Error>;
}

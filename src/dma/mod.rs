// Licensed under the Apache-2.0 license

//! DMA transfer engine.
//!
//! Channels carry an ordered scatter/gather list of [`DmaXfer`] descriptors that
//! the engine advances one entry per completion interrupt (or per poll when no
//! interrupt controller is configured).

pub mod common;
pub mod dma_controller;
pub mod traits;

pub use common::{
    default_sg_handler, DmaCompletion, DmaInitParam, DmaXfer, DmaXferType, SgHandler,
};
pub use dma_controller::{DmaChannel, DmaController, DMA_MAX_CHANNELS, DMA_MAX_SG_ENTRIES};
pub use traits::{DmaEngine, DmaPlatform};

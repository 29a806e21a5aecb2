// Licensed under the Apache-2.0 license

// No panicking shortcuts outside of tests.
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::indexing_slicing))]
#![cfg_attr(not(test), warn(clippy::expect_used))]
#![cfg_attr(not(test), no_std)]
pub mod common;
pub mod dma;
pub mod error;
pub mod i3c;
pub mod irq;
#[cfg(test)]
mod tests;

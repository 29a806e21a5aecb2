// Licensed under the Apache-2.0 license

//! I3C bus and device subsystem.
//!
//! [`I3cBusRegistry`] holds up to [`I3C_MAX_BUS_NUMBER`] buses. Each
//! [`I3cBus`] tracks address occupancy and the targets declared to it, runs
//! dynamic address assignment at bring-up and dispatches target interrupts.
//! [`I3cDevice`] is the per-target handle used for CCCs and private transfers.
//! Controller specifics live behind [`I3cPlatform`]; [`stm32_i3c`] binds the
//! STM32 controller.

pub mod addr_slots;
pub mod bus;
pub mod ccc;
pub mod common;
pub mod device;
pub mod stm32_hal;
pub mod stm32_i3c;
pub mod traits;

pub use addr_slots::{AddrSlots, AddrStatus};
pub use bus::{validate_ccc, I3cBus, I3cBusRegistry};
pub use ccc::Ccc;
pub use common::{
    CccInfo, CccTransfer, DaaCandidate, I3cBusInitParam, I3cEventCallback, I3cInitParam,
    I3cIrqEvent, I3cTarget, I3C_BCAST_ADDR, I3C_IRQ_ALL, I3C_IRQ_CONTROLLER_ROLE,
    I3C_IRQ_HOT_JOIN, I3C_IRQ_IBI, I3C_MAX_ADDR, I3C_MAX_BUS_NUMBER, I3C_MAX_DEV_NUMBER,
};
pub use device::I3cDevice;
pub use traits::{DaaContext, I3cPlatform};

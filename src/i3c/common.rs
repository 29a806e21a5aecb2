// Licensed under the Apache-2.0 license

use crate::i3c::ccc::Ccc;

/// Number of bus controllers, addressed by ids `1..=I3C_MAX_BUS_NUMBER`.
pub const I3C_MAX_BUS_NUMBER: usize = 3;
/// Device descriptors and DAA candidates per bus.
pub const I3C_MAX_DEV_NUMBER: usize = 16;
pub const I3C_MAX_ADDR: u8 = 0x7f;
pub const I3C_BCAST_ADDR: u8 = 0x7e;
/// Largest IBI payload captured by [`CccInfo`].
pub const I3C_MAX_IBI_PAYLOAD: usize = 8;

// Pending interrupt event bits.
pub const I3C_IRQ_IBI: u32 = 1 << 0;
pub const I3C_IRQ_HOT_JOIN: u32 = 1 << 1;
pub const I3C_IRQ_CONTROLLER_ROLE: u32 = 1 << 2;
pub const I3C_IRQ_ALL: u32 = I3C_IRQ_IBI | I3C_IRQ_HOT_JOIN | I3C_IRQ_CONTROLLER_ROLE;

/// A target as declared to the bus or to a device descriptor.
///
/// `addr` is the static address for static I3C and I2C targets and the preferred
/// dynamic address for the rest.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct I3cTarget {
    /// 48-bit provisioned id.
    pub pid: u64,
    pub addr: u8,
    pub is_i3c: bool,
    pub is_static: bool,
}

impl I3cTarget {
    /// I3C target that takes its dynamic address through DAA.
    #[must_use]
    pub const fn dynamic(pid: u64, addr: u8) -> Self {
        Self {
            pid,
            addr,
            is_i3c: true,
            is_static: false,
        }
    }

    /// I3C target that adopts its static address on `SETAASA`.
    #[must_use]
    pub const fn static_i3c(pid: u64, addr: u8) -> Self {
        Self {
            pid,
            addr,
            is_i3c: true,
            is_static: true,
        }
    }

    /// Legacy I2C target.
    #[must_use]
    pub const fn i2c(addr: u8) -> Self {
        Self {
            pid: 0,
            addr,
            is_i3c: false,
            is_static: true,
        }
    }

    /// Whether the target only appears on the bus after DAA.
    #[must_use]
    pub const fn needs_daa(&self) -> bool {
        self.is_i3c && !self.is_static
    }
}

/// Bus bring-up parameters.
pub struct I3cBusInitParam<'a, C> {
    /// Bus id, `1..=I3C_MAX_BUS_NUMBER`.
    pub device_id: u8,
    /// Targets expected on the bus.
    pub devs: &'a [I3cTarget],
    /// Backend configuration.
    pub config: C,
}

/// Device descriptor parameters; `bus` is brought up on first use.
pub struct I3cInitParam<'a, C> {
    pub bus: &'a I3cBusInitParam<'a, C>,
    pub target: I3cTarget,
}

/// A declared dynamic-address target awaiting or holding its DAA address.
///
/// A zeroed entry (`addr == 0`) is an unused slot.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct DaaCandidate {
    pub pid: u64,
    pub addr: u8,
    pub is_attached: bool,
    pub bcr: u8,
    pub dcr: u8,
}

impl DaaCandidate {
    #[must_use]
    pub const fn is_used(&self) -> bool {
        self.addr != 0
    }
}

/// Event information the controller latched for the last interrupt.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct CccInfo {
    /// Events the record covers.
    pub events: u32,
    /// Address of the target that raised the in-band interrupt.
    pub ibi_addr: u8,
    pub ibi_payload: [u8; I3C_MAX_IBI_PAYLOAD],
    pub ibi_payload_len: usize,
    /// Dynamic address assigned to a hot-joining target, if any.
    pub hot_join_addr: u8,
}

impl CccInfo {
    /// Captured IBI payload bytes.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        let len = self.ibi_payload_len.min(I3C_MAX_IBI_PAYLOAD);
        self.ibi_payload.get(..len).unwrap_or_default()
    }
}

/// CCC request handed to a bus backend.
pub struct CccTransfer<'a> {
    /// Target address, [`I3C_BCAST_ADDR`] for broadcast commands.
    pub addr: u8,
    pub ccc: Ccc,
    /// Payload, `ccc.payload_len()` bytes long; received into for read CCCs.
    pub data: &'a mut [u8],
}

/// Delivered to a device callback when the device raised an interrupt.
#[derive(Debug)]
pub struct I3cIrqEvent<'a> {
    pub events: u32,
    pub addr: u8,
    pub pid: u64,
    pub payload: &'a [u8],
}

#[derive(Copy, Clone, Debug)]
pub struct I3cEventCallback {
    pub func: fn(&I3cIrqEvent<'_>, usize),
    pub ctx: usize,
}

// Licensed under the Apache-2.0 license

//! Common Command Codes.
//!
//! A [`Ccc`] packs everything the bus manager needs to frame a command into one
//! word:
//!
//! | bits    | meaning                                              |
//! |---------|------------------------------------------------------|
//! | `7:0`   | CCC id; bit 7 set selects direct (addressed) framing |
//! | `15:8`  | payload length in bytes, defining byte included      |
//! | `16`    | read (target to controller) when set                 |
//! | `17`    | first payload byte is a defining byte                |

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Ccc(u32);

impl Ccc {
    pub const DIRECT: u32 = 1 << 7;
    pub const RNW: u32 = 1 << 16;
    pub const DEF_BYTE: u32 = 1 << 17;
    const ID_MASK: u32 = 0xff;
    const LEN_SHIFT: u32 = 8;
    const LEN_MASK: u32 = 0xff << Self::LEN_SHIFT;

    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    const fn pack(id: u8, len: u8, read: bool, def_byte: bool) -> Self {
        let mut bits = id as u32 | ((len as u32) << Self::LEN_SHIFT);
        if read {
            bits |= Self::RNW;
        }
        if def_byte {
            bits |= Self::DEF_BYTE;
        }
        Self(bits)
    }

    const fn write(id: u8, len: u8) -> Self {
        Self::pack(id, len, false, false)
    }

    const fn read(id: u8, len: u8) -> Self {
        Self::pack(id, len, true, false)
    }

    const fn defining(id: u8, len: u8) -> Self {
        Self::pack(id, len, false, true)
    }

    /// CCC id byte as sent on the bus.
    #[must_use]
    pub const fn id(self) -> u8 {
        (self.0 & Self::ID_MASK) as u8
    }

    /// Payload length in bytes.
    #[must_use]
    pub const fn payload_len(self) -> usize {
        ((self.0 & Self::LEN_MASK) >> Self::LEN_SHIFT) as usize
    }

    /// Same command with a different payload length, for variable-length CCCs.
    #[must_use]
    pub const fn with_len(self, len: u8) -> Self {
        Self((self.0 & !Self::LEN_MASK) | ((len as u32) << Self::LEN_SHIFT))
    }

    #[must_use]
    pub const fn is_direct(self) -> bool {
        self.0 & Self::DIRECT != 0
    }

    #[must_use]
    pub const fn is_read(self) -> bool {
        self.0 & Self::RNW != 0
    }

    #[must_use]
    pub const fn has_def_byte(self) -> bool {
        self.0 & Self::DEF_BYTE != 0
    }
}

// Broadcast CCCs.
pub const ENEC_BCAST: Ccc = Ccc::write(0x00, 1);
pub const DISEC_BCAST: Ccc = Ccc::write(0x01, 1);
pub const ENTAS0_BCAST: Ccc = Ccc::write(0x02, 0);
pub const ENTAS1_BCAST: Ccc = Ccc::write(0x03, 0);
pub const ENTAS2_BCAST: Ccc = Ccc::write(0x04, 0);
pub const ENTAS3_BCAST: Ccc = Ccc::write(0x05, 0);
pub const RSTDAA_BCAST: Ccc = Ccc::write(0x06, 0);
pub const ENTDAA: Ccc = Ccc::write(0x07, 0);
pub const DEFTGTS: Ccc = Ccc::write(0x08, 0);
pub const SETMWL_BCAST: Ccc = Ccc::write(0x09, 2);
pub const SETMRL_BCAST: Ccc = Ccc::write(0x0a, 2);
pub const ENTTM: Ccc = Ccc::write(0x0b, 1);
pub const SETBUSCON: Ccc = Ccc::write(0x0c, 1);
pub const ENDXFER_BCAST: Ccc = Ccc::defining(0x12, 1);
pub const SETXTIME_BCAST: Ccc = Ccc::defining(0x28, 1);
pub const SETAASA: Ccc = Ccc::write(0x29, 0);
pub const RSTACT_BCAST: Ccc = Ccc::defining(0x2a, 1);
pub const DEFGRPA: Ccc = Ccc::write(0x2b, 0);
pub const RSTGRPA_BCAST: Ccc = Ccc::write(0x2c, 0);
pub const MLANE_BCAST: Ccc = Ccc::defining(0x2d, 1);

/// `ENTHDRn` for HDR mode `mode` (0..=7).
#[must_use]
pub const fn enthdr(mode: u8) -> Ccc {
    Ccc::write(0x20 | (mode & 0x7), 0)
}

// Direct CCCs.
pub const ENEC_DIRECT: Ccc = Ccc::write(0x80, 1);
pub const DISEC_DIRECT: Ccc = Ccc::write(0x81, 1);
pub const ENTAS0_DIRECT: Ccc = Ccc::write(0x82, 0);
pub const ENTAS1_DIRECT: Ccc = Ccc::write(0x83, 0);
pub const ENTAS2_DIRECT: Ccc = Ccc::write(0x84, 0);
pub const ENTAS3_DIRECT: Ccc = Ccc::write(0x85, 0);
pub const SETDASA: Ccc = Ccc::write(0x87, 1);
pub const SETNEWDA: Ccc = Ccc::write(0x88, 1);
pub const SETMWL_DIRECT: Ccc = Ccc::write(0x89, 2);
pub const SETMRL_DIRECT: Ccc = Ccc::write(0x8a, 2);
pub const GETMWL: Ccc = Ccc::read(0x8b, 2);
pub const GETMRL: Ccc = Ccc::read(0x8c, 2);
pub const GETPID: Ccc = Ccc::read(0x8d, 6);
pub const GETBCR: Ccc = Ccc::read(0x8e, 1);
pub const GETDCR: Ccc = Ccc::read(0x8f, 1);
pub const GETSTATUS: Ccc = Ccc::read(0x90, 2);
pub const GETACCCR: Ccc = Ccc::read(0x91, 1);
pub const ENDXFER_DIRECT: Ccc = Ccc::defining(0x92, 1);
pub const SETBRGTGT: Ccc = Ccc::write(0x93, 0);
pub const GETMXDS: Ccc = Ccc::read(0x94, 2);
pub const GETCAPS: Ccc = Ccc::read(0x95, 2);
pub const SETROUTE: Ccc = Ccc::write(0x96, 0);
pub const D2DXFER: Ccc = Ccc::write(0x97, 0);
pub const SETXTIME_DIRECT: Ccc = Ccc::defining(0x98, 1);
pub const GETXTIME: Ccc = Ccc::read(0x99, 4);
pub const RSTACT_DIRECT: Ccc = Ccc::defining(0x9a, 1);
pub const SETGRPA: Ccc = Ccc::write(0x9b, 1);
pub const RSTGRPA_DIRECT: Ccc = Ccc::write(0x9c, 0);
pub const MLANE_DIRECT: Ccc = Ccc::defining(0x9d, 1);

// RSTACT defining bytes.
pub const RSTACT_NO_RESET: u8 = 0x00;
pub const RSTACT_PERIPHERAL_RESET: u8 = 0x01;
pub const RSTACT_RESET_WHOLE_TARGET: u8 = 0x02;
pub const RSTACT_DEBUG_NETWORK_ADAPTER: u8 = 0x03;
pub const RSTACT_VIRTUAL_TARGET_DETECT: u8 = 0x04;

// ENEC/DISEC event bits.
pub const EVENT_INT: u8 = 1 << 0;
pub const EVENT_CR: u8 = 1 << 1;
pub const EVENT_HJ: u8 = 1 << 3;

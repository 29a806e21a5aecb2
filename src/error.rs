// Licensed under the Apache-2.0 license

//! Error taxonomy shared by the I3C and DMA subsystems.
//!
//! Every public operation in this crate returns `Result<T, Error>`. Each kind has
//! a negative errno equivalent, see [`Error::to_errno`].

use embedded_hal::i2c::{ErrorKind, NoAcknowledgeSource};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Error {
    /// Null, out-of-range or malformed input. Includes CCC framing violations and
    /// duplicate target addresses.
    InvalidArgument,
    /// The platform does not provide the requested operation.
    NotImplemented,
    /// A fixed-capacity table (device slots, DAA candidates, scatter/gather list,
    /// free addresses) is exhausted.
    OutOfMemory,
    /// Protocol-level inconsistency, e.g. a target that DAA never discovered.
    Fault,
    /// The target exists in the protocol model but has not completed attachment.
    PermissionDenied,
    /// A bus wait expired without a satisfying event.
    Timeout,
    /// The hardware reported the transfer as failed (NACK, arbitration, HAL error).
    Io,
}

impl Error {
    /// Negative errno equivalent.
    #[must_use]
    pub const fn to_errno(self) -> i32 {
        match self {
            Error::InvalidArgument => -22,
            Error::NotImplemented => -38,
            Error::OutOfMemory => -12,
            Error::Fault => -14,
            Error::PermissionDenied => -1,
            Error::Timeout => -110,
            Error::Io => -5,
        }
    }
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let msg = match self {
            Error::InvalidArgument => "invalid argument",
            Error::NotImplemented => "operation not implemented by platform",
            Error::OutOfMemory => "fixed capacity exhausted",
            Error::Fault => "protocol fault",
            Error::PermissionDenied => "target not attached",
            Error::Timeout => "timed out",
            Error::Io => "transfer failed",
        };
        f.write_str(msg)
    }
}

impl embedded_hal::i2c::Error for Error {
    fn kind(&self) -> ErrorKind {
        match self {
            Error::Io => ErrorKind::NoAcknowledge(NoAcknowledgeSource::Unknown),
            Error::Timeout => ErrorKind::Bus,
            _ => ErrorKind::Other,
        }
    }
}

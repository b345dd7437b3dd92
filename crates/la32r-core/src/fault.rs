use thiserror::Error;

/// Guest-architectural exception cause codes recorded in `ESTAT.Ecode`.
///
/// These never surface to the host as errors: the controller redirects
/// control flow into the guest exception entry instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[repr(u8)]
pub enum ExceptionCode {
    /// Asynchronous external interrupt.
    Interrupt = 0x00,
    /// Instruction fetch from a misaligned address.
    FetchAddressError = 0x08,
    /// `syscall` trap instruction.
    Syscall = 0x0b,
    /// `break` trap instruction.
    Breakpoint = 0x0c,
    /// Instruction word matched no defined encoding.
    InstructionNotExist = 0x0d,
}

/// Exception sub-cause for a misaligned instruction fetch.
pub const ESUBCODE_ADEF: u8 = 0x0;

impl ExceptionCode {
    /// Converts the cause to its stable `ESTAT.Ecode` value.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Converts a stable `ESTAT.Ecode` value back into a cause.
    #[must_use]
    pub const fn from_u8(code: u8) -> Option<Self> {
        match code {
            0x00 => Some(Self::Interrupt),
            0x08 => Some(Self::FetchAddressError),
            0x0b => Some(Self::Syscall),
            0x0c => Some(Self::Breakpoint),
            0x0d => Some(Self::InstructionNotExist),
            _ => None,
        }
    }

    /// Returns `true` for causes raised synchronously by the current
    /// instruction, as opposed to sampled interrupt lines.
    #[must_use]
    pub const fn is_synchronous(self) -> bool {
        !matches!(self, Self::Interrupt)
    }
}

/// Host-fatal fault taxonomy.
///
/// These indicate a configuration or implementation bug rather than a
/// guest-recoverable condition. They abort the simulation with the
/// diagnostic payload carried here and are never silently masked.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum CoreFault {
    /// Physical access landed outside backing memory and every region.
    #[error(
        "address {addr:#010x} ({width} bytes) is out of bound of pmem \
         [{mem_start:#010x}, {mem_end:#010x}] at pc = {pc:#010x}"
    )]
    OutOfBound {
        /// Faulting physical address.
        addr: u32,
        /// Access width in bytes.
        width: u8,
        /// Program counter of the step performing the access.
        pc: u32,
        /// Inclusive start of the configured backing-memory range.
        mem_start: u32,
        /// Inclusive end of the configured backing-memory range.
        mem_end: u32,
    },
    /// Region access used a width other than the 4-byte MMIO convention.
    #[error(
        "region `{region}` access at {addr:#010x} used width {width} \
         (regions are word-access only)"
    )]
    MmioWidth {
        /// Name of the region that was accessed.
        region: String,
        /// Faulting physical address.
        addr: u32,
        /// Offending access width in bytes.
        width: u8,
    },
    /// Region registration collided with an existing mapping.
    #[error("region `{name}` [{base:#010x}, +{size:#x}) overlaps an existing mapping")]
    RegionOverlap {
        /// Name of the rejected region.
        name: String,
        /// Base address of the rejected region.
        base: u32,
        /// Size in bytes of the rejected region.
        size: u32,
    },
    /// Region registration used a zero or address-wrapping extent.
    #[error("region `{name}` [{base:#010x}, +{size:#x}) is not a valid extent")]
    RegionExtent {
        /// Name of the rejected region.
        name: String,
        /// Base address of the rejected region.
        base: u32,
        /// Size in bytes of the rejected region.
        size: u32,
    },
}

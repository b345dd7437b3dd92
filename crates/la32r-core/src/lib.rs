//! Execution core for an LA32R machine simulator.
//!
//! Pairs the fetch/decode/execute engine and its exception/interrupt
//! controller with the physical-address router every access passes
//! through. Peripheral models, trace formatting and the host front end
//! are external collaborators wired in through the region-handler and
//! interrupt-line contracts.

/// Public host-facing API contract and integration types.
pub mod api;
pub use api::{
    Core, CoreConfig, StepOutcome, DEFAULT_MEM_BASE, DEFAULT_MEM_SIZE, DEFAULT_TIMER_FREQ_MHZ,
};

/// Host time source feeding the guest-visible stable counter.
pub mod clock;
pub use clock::{HostClock, ManualClock, TimeSource};

/// Instruction decode: formats, operand extraction, pattern table.
pub mod decode;
pub use decode::{decode, DecodedInst, InstFormat, Opcode, Operands, Pattern, PATTERN_TABLE};

/// Instruction execution pipeline and the single-step driver.
pub mod exec;
pub use exec::step_one;

/// Fault taxonomy: guest exception causes and host-fatal faults.
pub mod fault;
pub use fault::{CoreFault, ExceptionCode, ESUBCODE_ADEF};

/// Exception/interrupt controller primitives.
pub mod interrupt;
pub use interrupt::{
    enter_exception, interrupt_ready, sample_interrupt_lines, ExceptionLatch, PendingCause,
};

/// Physical memory model: access widths, region table, address router.
pub mod memory;
pub use memory::{AccessWidth, Region, RegionHandler, RegionTable, SystemBus};

/// Architectural CPU state model primitives.
pub mod state;
pub use state::{
    ArchitecturalState, CsrFile, GENERAL_REGISTER_COUNT, INST_BYTES, LINK_REGISTER,
};

#[cfg(test)]
use proptest as _;
#[cfg(test)]
use rstest as _;

//! Exception/interrupt controller: per-step sampling, priority latch,
//! and exception entry/return bookkeeping.

use crate::fault::ExceptionCode;
use crate::state::csr::{
    CRMD_IE, CRMD_MODE_MASK, CSR_BADV, CSR_CRMD, CSR_ECFG, CSR_EENTRY, CSR_ERA, CSR_ESTAT,
    CSR_PRMD, ESTAT_ECODE_MASK, ESTAT_ECODE_SHIFT, ESTAT_ESUBCODE_MASK, ESTAT_ESUBCODE_SHIFT,
    ESTAT_IS_MASK, ESTAT_LINE_MASK,
};
use crate::state::ArchitecturalState;

/// Cause latched for servicing at the end of the current step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingCause {
    /// Architected cause code.
    pub code: ExceptionCode,
    /// Architected sub-cause code.
    pub subcode: u8,
    /// Faulting address for address-error causes.
    pub badv: Option<u32>,
}

/// Per-step exception latch.
///
/// Exactly one exception is serviced per step. Synchronous causes are
/// latched before the interrupt sample runs (misaligned fetch) or while
/// it is impossible for one to be pending (executor causes), so keeping
/// the first latched cause implements the fixed priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExceptionLatch {
    pending: Option<PendingCause>,
}

impl ExceptionLatch {
    /// Latches a synchronous cause; an already-latched cause is kept.
    pub fn raise_sync(&mut self, code: ExceptionCode, subcode: u8, badv: Option<u32>) {
        if self.pending.is_none() {
            self.pending = Some(PendingCause {
                code,
                subcode,
                badv,
            });
        }
    }

    /// Latches the asynchronous interrupt cause unless a synchronous
    /// cause already claimed this step.
    pub fn raise_interrupt(&mut self) {
        if self.pending.is_none() {
            self.pending = Some(PendingCause {
                code: ExceptionCode::Interrupt,
                subcode: 0,
                badv: None,
            });
        }
    }

    /// Returns `true` when this step's executor effect must be skipped.
    #[must_use]
    pub const fn taken(&self) -> bool {
        self.pending.is_some()
    }

    /// The latched cause, if any.
    #[must_use]
    pub const fn pending(&self) -> Option<PendingCause> {
        self.pending
    }
}

/// Samples the external interrupt lines into `ESTAT.IS[12:2]`.
///
/// The line latch replaces the hardware-driven bits wholesale, so a
/// cleared line stops asserting on the very next step. Software bits 1:0
/// are untouched.
pub fn sample_interrupt_lines(state: &mut ArchitecturalState) {
    let lines = state.intr() & ESTAT_LINE_MASK;
    state.csr_mut().write_field(CSR_ESTAT, ESTAT_LINE_MASK, lines);
}

/// Returns `true` when an enabled, unmasked interrupt is asserted.
#[must_use]
pub fn interrupt_ready(state: &ArchitecturalState) -> bool {
    let estat = state.csr().read(CSR_ESTAT);
    let ecfg = state.csr().read(CSR_ECFG);
    let crmd = state.csr().read(CSR_CRMD);
    (estat & ecfg & ESTAT_IS_MASK) != 0 && (crmd & CRMD_IE) != 0
}

/// Performs exception entry and returns the redirection target.
///
/// Saves the current mode bits into `PRMD`, clears the mode field of
/// `CRMD` (privileged mode, interrupts disabled), records the cause and
/// sub-cause into `ESTAT`, saves `epc` into `ERA` (and the faulting
/// address into `BADV` when present), and hands back `EENTRY`.
pub fn enter_exception(state: &mut ArchitecturalState, cause: PendingCause, epc: u32) -> u32 {
    let crmd = state.csr().read(CSR_CRMD);
    state
        .csr_mut()
        .write_field(CSR_PRMD, CRMD_MODE_MASK, crmd & CRMD_MODE_MASK);
    state.csr_mut().write(CSR_CRMD, crmd & !CRMD_MODE_MASK);

    let cause_bits = (u32::from(cause.code.as_u8()) << ESTAT_ECODE_SHIFT)
        | (u32::from(cause.subcode) << ESTAT_ESUBCODE_SHIFT);
    state.csr_mut().write_field(
        CSR_ESTAT,
        ESTAT_ECODE_MASK | ESTAT_ESUBCODE_MASK,
        cause_bits,
    );

    state.csr_mut().write(CSR_ERA, epc);
    if let Some(badv) = cause.badv {
        state.csr_mut().write(CSR_BADV, badv);
    }

    state.csr().read(CSR_EENTRY)
}

//! Architectural CPU state model primitives.

/// Control/status register file and CSR index constants.
pub mod csr;
/// Architectural register file types and storage model.
pub mod registers;

pub use csr::CsrFile;
pub use registers::{ArchitecturalState, GENERAL_REGISTER_COUNT, INST_BYTES, LINK_REGISTER};

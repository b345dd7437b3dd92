//! Public host-facing API for embedding the execution core.

use crate::clock::{HostClock, TimeSource};
use crate::exec::step_one;
use crate::fault::CoreFault;
use crate::memory::{AccessWidth, RegionHandler, SystemBus};
use crate::state::csr::ESTAT_LINE_COUNT;
use crate::state::ArchitecturalState;

/// Default backing-memory base address.
pub const DEFAULT_MEM_BASE: u32 = 0x8000_0000;
/// Default backing-memory size (128 MiB).
pub const DEFAULT_MEM_SIZE: u32 = 0x0800_0000;
/// Default stable-counter frequency in MHz (counter ticks per microsecond).
pub const DEFAULT_TIMER_FREQ_MHZ: u64 = 100;

/// Top-level immutable configuration for a core instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct CoreConfig {
    /// Base physical address of backing memory; also the reset `pc`.
    pub mem_base: u32,
    /// Backing-memory size in bytes.
    pub mem_size: u32,
    /// Stable-counter frequency ratio in ticks per microsecond.
    pub timer_freq_mhz: u64,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            mem_base: DEFAULT_MEM_BASE,
            mem_size: DEFAULT_MEM_SIZE,
            timer_freq_mhz: DEFAULT_TIMER_FREQ_MHZ,
        }
    }
}

/// Outcome of one instruction step.
///
/// Guest-architectural exceptions never appear here: the controller
/// redirects them into the guest and the step reports `Continued`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum StepOutcome {
    /// The step completed; execution may continue at the new `pc`.
    Continued,
    /// The guest executed the end-of-test trap instruction.
    Trapped {
        /// Exit code taken from the trap's register operand.
        code: u32,
    },
    /// A host-fatal fault aborted the step; do not step again.
    Faulted {
        /// Diagnostic describing the configuration or implementation bug.
        fault: CoreFault,
    },
}

/// One simulated execution core: architectural state, physical bus and
/// the stable-counter time source, stepped one instruction at a time.
///
/// The core exclusively owns its state and bus; devices interact only
/// through registered region handlers and the two interrupt-line entry
/// points. A multi-threaded host must serialize all calls through one
/// exclusive-access point.
pub struct Core {
    config: CoreConfig,
    state: ArchitecturalState,
    bus: SystemBus,
    clock: Box<dyn TimeSource>,
}

impl Core {
    /// Creates a core with the wall-clock time source.
    #[must_use]
    pub fn new(config: CoreConfig) -> Self {
        Self::with_time_source(config, Box::new(HostClock::new()))
    }

    /// Creates a core with an explicit time source (deterministic hosts).
    #[must_use]
    pub fn with_time_source(config: CoreConfig, clock: Box<dyn TimeSource>) -> Self {
        Self {
            config,
            state: ArchitecturalState::with_entry(config.mem_base),
            bus: SystemBus::new(config.mem_base, config.mem_size),
            clock,
        }
    }

    /// Executes exactly one instruction step.
    pub fn step(&mut self) -> StepOutcome {
        step_one(
            &mut self.state,
            &mut self.bus,
            self.clock.as_mut(),
            &self.config,
        )
    }

    /// Registers a device region; see the region-handler contract.
    ///
    /// # Errors
    ///
    /// Returns [`CoreFault::RegionExtent`] or [`CoreFault::RegionOverlap`]
    /// for malformed registrations; both are configuration bugs.
    pub fn register_region(
        &mut self,
        name: &str,
        base: u32,
        size: u32,
        handler: Box<dyn RegionHandler>,
    ) -> Result<(), CoreFault> {
        self.bus.register_region(name, base, size, handler)
    }

    /// Asserts external interrupt line `line`. Idempotent and immediate;
    /// only lines 2..=12 are sampled as hardware interrupts.
    pub fn raise_interrupt(&mut self, line: u8) {
        if line < ESTAT_LINE_COUNT {
            let intr = self.state.intr() | (1 << line);
            self.state.set_intr(intr);
        }
    }

    /// Deasserts external interrupt line `line`. Idempotent.
    pub fn clear_interrupt(&mut self, line: u8) {
        if line < ESTAT_LINE_COUNT {
            let intr = self.state.intr() & !(1 << line);
            self.state.set_intr(intr);
        }
    }

    /// Reads physical memory through the same router used by execution.
    ///
    /// # Errors
    ///
    /// Returns [`CoreFault::OutOfBound`] or [`CoreFault::MmioWidth`] as
    /// the router would for a guest access.
    pub fn read_physical(&mut self, addr: u32, width: AccessWidth) -> Result<u32, CoreFault> {
        let pc = self.state.pc();
        self.bus.read(addr, width, pc)
    }

    /// Writes physical memory through the execution router.
    ///
    /// # Errors
    ///
    /// Returns [`CoreFault::OutOfBound`] or [`CoreFault::MmioWidth`] as
    /// the router would for a guest access.
    pub fn write_physical(
        &mut self,
        addr: u32,
        width: AccessWidth,
        value: u32,
    ) -> Result<(), CoreFault> {
        let pc = self.state.pc();
        self.bus.write(addr, width, value, pc)
    }

    /// Copies a guest image into backing memory at `addr`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreFault::OutOfBound`] when the image does not fit.
    pub fn load_image(&mut self, addr: u32, image: &[u8]) -> Result<(), CoreFault> {
        self.bus.load_image(addr, image)
    }

    /// Borrows the architectural state for inspection.
    #[must_use]
    pub const fn state(&self) -> &ArchitecturalState {
        &self.state
    }

    /// Mutably borrows the architectural state (test harness surface).
    pub const fn state_mut(&mut self) -> &mut ArchitecturalState {
        &mut self.state
    }

    /// Borrows the physical bus for inspection.
    #[must_use]
    pub const fn bus(&self) -> &SystemBus {
        &self.bus
    }

    /// The configuration this core was created with.
    #[must_use]
    pub const fn config(&self) -> &CoreConfig {
        &self.config
    }
}

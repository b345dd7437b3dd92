//! Instruction execution pipeline and the single-step driver.
//!
//! One step is an indivisible unit: fetch, interrupt sample, decode,
//! execute, exception entry and counter refresh happen with no
//! suspension points. Exactly one of {normal completion, host-fatal
//! fault, end-of-test trap, redirected-by-exception} describes the
//! outcome of a step.

#![allow(
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss,
    clippy::cast_possible_truncation
)]

use crate::api::{CoreConfig, StepOutcome};
use crate::clock::TimeSource;
use crate::decode::{decode, DecodedInst, Opcode};
use crate::fault::{CoreFault, ExceptionCode, ESUBCODE_ADEF};
use crate::interrupt::{self, ExceptionLatch, PendingCause};
use crate::memory::{AccessWidth, SystemBus};
use crate::state::csr::{CRMD_MODE_MASK, CSR_CRMD, CSR_ERA, CSR_PRMD};
use crate::state::{ArchitecturalState, INST_BYTES, LINK_REGISTER};

/// Per-instruction decode context, discarded after the step.
///
/// `dnpc` starts at the sequential successor (`pc + 4`) and is
/// overwritten by control-transfer instructions.
struct StepContext {
    /// Address of the instruction being executed.
    pc: u32,
    /// Decided successor address.
    dnpc: u32,
}

enum ExecResult {
    Retired,
    Exception(PendingCause),
    EndOfTest { code: u32 },
}

const fn trap_cause(code: ExceptionCode) -> ExecResult {
    ExecResult::Exception(PendingCause {
        code,
        subcode: 0,
        badv: None,
    })
}

fn div_w(lhs: u32, rhs: u32) -> u32 {
    // Divide-by-zero policy: all-ones quotient, no trap (see DESIGN.md).
    if rhs == 0 {
        u32::MAX
    } else {
        (lhs as i32).wrapping_div(rhs as i32) as u32
    }
}

fn mod_w(lhs: u32, rhs: u32) -> u32 {
    if rhs == 0 {
        lhs
    } else {
        (lhs as i32).wrapping_rem(rhs as i32) as u32
    }
}

fn div_wu(lhs: u32, rhs: u32) -> u32 {
    if rhs == 0 {
        u32::MAX
    } else {
        lhs / rhs
    }
}

fn mod_wu(lhs: u32, rhs: u32) -> u32 {
    if rhs == 0 {
        lhs
    } else {
        lhs % rhs
    }
}

#[allow(clippy::too_many_lines)]
fn execute(
    inst: &DecodedInst,
    ctx: &mut StepContext,
    state: &mut ArchitecturalState,
    bus: &mut SystemBus,
) -> Result<ExecResult, CoreFault> {
    let ops = inst.operands;
    let rj_v = state.gpr(ops.rj);
    let rk_v = state.gpr(ops.rk);
    let rd_v = state.gpr(ops.rd);
    let imm = ops.imm;

    match inst.opcode {
        Opcode::AddW => state.set_gpr(ops.rd, rj_v.wrapping_add(rk_v)),
        Opcode::SubW => state.set_gpr(ops.rd, rj_v.wrapping_sub(rk_v)),
        Opcode::Slt => state.set_gpr(ops.rd, u32::from((rj_v as i32) < (rk_v as i32))),
        Opcode::Sltu => state.set_gpr(ops.rd, u32::from(rj_v < rk_v)),
        Opcode::Nor => state.set_gpr(ops.rd, !(rj_v | rk_v)),
        Opcode::And => state.set_gpr(ops.rd, rj_v & rk_v),
        Opcode::Or => state.set_gpr(ops.rd, rj_v | rk_v),
        Opcode::Xor => state.set_gpr(ops.rd, rj_v ^ rk_v),
        Opcode::SllW => state.set_gpr(ops.rd, rj_v << (rk_v & 0x1f)),
        Opcode::SrlW => state.set_gpr(ops.rd, rj_v >> (rk_v & 0x1f)),
        Opcode::SraW => state.set_gpr(ops.rd, ((rj_v as i32) >> (rk_v & 0x1f)) as u32),
        Opcode::MulW => {
            let product = i64::from(rj_v as i32) * i64::from(rk_v as i32);
            state.set_gpr(ops.rd, product as u32);
        }
        Opcode::MulhW => {
            let product = i64::from(rj_v as i32) * i64::from(rk_v as i32);
            state.set_gpr(ops.rd, (product >> 32) as u32);
        }
        Opcode::MulhWu => {
            let product = u64::from(rj_v) * u64::from(rk_v);
            state.set_gpr(ops.rd, (product >> 32) as u32);
        }
        Opcode::DivW => state.set_gpr(ops.rd, div_w(rj_v, rk_v)),
        Opcode::ModW => state.set_gpr(ops.rd, mod_w(rj_v, rk_v)),
        Opcode::DivWu => state.set_gpr(ops.rd, div_wu(rj_v, rk_v)),
        Opcode::ModWu => state.set_gpr(ops.rd, mod_wu(rj_v, rk_v)),

        Opcode::Lu12iW => state.set_gpr(ops.rd, imm),
        Opcode::Pcaddu12i => state.set_gpr(ops.rd, ctx.pc.wrapping_add(imm)),

        Opcode::RdcntvlW => state.set_gpr(ops.rd, state.stable_counter() as u32),
        Opcode::RdcntvhW => state.set_gpr(ops.rd, (state.stable_counter() >> 32) as u32),

        Opcode::SlliW => state.set_gpr(ops.rd, rj_v << (imm & 0x1f)),
        Opcode::SrliW => state.set_gpr(ops.rd, rj_v >> (imm & 0x1f)),
        Opcode::SraiW => state.set_gpr(ops.rd, ((rj_v as i32) >> (imm & 0x1f)) as u32),

        Opcode::Slti => state.set_gpr(ops.rd, u32::from((rj_v as i32) < (imm as i32))),
        Opcode::Sltui => state.set_gpr(ops.rd, u32::from(rj_v < imm)),
        Opcode::AddiW => state.set_gpr(ops.rd, rj_v.wrapping_add(imm)),

        Opcode::LdB => {
            let byte = bus.read(rj_v.wrapping_add(imm), AccessWidth::Byte, ctx.pc)?;
            state.set_gpr(ops.rd, byte as u8 as i8 as i32 as u32);
        }
        Opcode::LdH => {
            let half = bus.read(rj_v.wrapping_add(imm), AccessWidth::Half, ctx.pc)?;
            state.set_gpr(ops.rd, half as u16 as i16 as i32 as u32);
        }
        Opcode::LdW => {
            let word = bus.read(rj_v.wrapping_add(imm), AccessWidth::Word, ctx.pc)?;
            state.set_gpr(ops.rd, word);
        }
        Opcode::LdBu => {
            let byte = bus.read(rj_v.wrapping_add(imm), AccessWidth::Byte, ctx.pc)?;
            state.set_gpr(ops.rd, byte);
        }
        Opcode::LdHu => {
            let half = bus.read(rj_v.wrapping_add(imm), AccessWidth::Half, ctx.pc)?;
            state.set_gpr(ops.rd, half);
        }
        Opcode::StB => {
            bus.write(rj_v.wrapping_add(imm), AccessWidth::Byte, rd_v & 0xff, ctx.pc)?;
        }
        Opcode::StH => {
            bus.write(rj_v.wrapping_add(imm), AccessWidth::Half, rd_v & 0xffff, ctx.pc)?;
        }
        Opcode::StW => {
            bus.write(rj_v.wrapping_add(imm), AccessWidth::Word, rd_v, ctx.pc)?;
        }

        Opcode::Andi => state.set_gpr(ops.rd, rj_v & imm),
        Opcode::Ori => state.set_gpr(ops.rd, rj_v | imm),
        Opcode::Xori => state.set_gpr(ops.rd, rj_v ^ imm),

        Opcode::Jirl => {
            // rj is read before the link write so rd == rj stays coherent.
            let target = rj_v.wrapping_add(imm);
            state.set_gpr(ops.rd, ctx.pc.wrapping_add(INST_BYTES));
            ctx.dnpc = target;
        }
        Opcode::Beq => {
            if rj_v == rd_v {
                ctx.dnpc = ctx.pc.wrapping_add(imm);
            }
        }
        Opcode::Bne => {
            if rj_v != rd_v {
                ctx.dnpc = ctx.pc.wrapping_add(imm);
            }
        }
        Opcode::Blt => {
            if (rj_v as i32) < (rd_v as i32) {
                ctx.dnpc = ctx.pc.wrapping_add(imm);
            }
        }
        Opcode::Bge => {
            if (rj_v as i32) >= (rd_v as i32) {
                ctx.dnpc = ctx.pc.wrapping_add(imm);
            }
        }
        Opcode::Bltu => {
            if rj_v < rd_v {
                ctx.dnpc = ctx.pc.wrapping_add(imm);
            }
        }
        Opcode::Bgeu => {
            if rj_v >= rd_v {
                ctx.dnpc = ctx.pc.wrapping_add(imm);
            }
        }
        Opcode::B => ctx.dnpc = ctx.pc.wrapping_add(imm),
        Opcode::Bl => {
            state.set_gpr(LINK_REGISTER, ctx.pc.wrapping_add(INST_BYTES));
            ctx.dnpc = ctx.pc.wrapping_add(imm);
        }

        Opcode::Csrrd => state.set_gpr(ops.rd, state.csr().read(ops.csr)),
        Opcode::Csrwr => {
            let old = state.csr().read(ops.csr);
            state.csr_mut().write(ops.csr, rd_v);
            state.set_gpr(ops.rd, old);
        }
        Opcode::Csrxchg => {
            // All operands are read up front; rd == rj cannot corrupt
            // the write-masked exchange.
            let old = state.csr().read(ops.csr);
            state
                .csr_mut()
                .write(ops.csr, (rd_v & rj_v) | (old & !rj_v));
            state.set_gpr(ops.rd, old);
        }

        Opcode::Ertn => {
            let crmd = state.csr().read(CSR_CRMD);
            let prmd = state.csr().read(CSR_PRMD);
            state
                .csr_mut()
                .write(CSR_CRMD, (prmd & CRMD_MODE_MASK) | (crmd & !CRMD_MODE_MASK));
            ctx.dnpc = state.csr().read(CSR_ERA);
        }

        Opcode::Break => return Ok(trap_cause(ExceptionCode::Breakpoint)),
        Opcode::Syscall => return Ok(trap_cause(ExceptionCode::Syscall)),
        Opcode::Trap => {
            return Ok(ExecResult::EndOfTest {
                code: state.gpr(ops.rd),
            })
        }
        Opcode::Invalid => return Ok(trap_cause(ExceptionCode::InstructionNotExist)),
    }

    Ok(ExecResult::Retired)
}

/// Executes one instruction step against the architectural state.
///
/// Wraps fetch, decode and execute with the exception controller: a
/// pending interrupt or a synchronous fault skips the executor effect
/// entirely and redirects to the guest exception entry instead. After
/// every path `r0` is forced back to zero and the stable counter is
/// refreshed from the scaled time source.
pub fn step_one(
    state: &mut ArchitecturalState,
    bus: &mut SystemBus,
    clock: &mut dyn TimeSource,
    config: &CoreConfig,
) -> StepOutcome {
    let pc = state.pc();
    let snpc = pc.wrapping_add(INST_BYTES);
    let mut latch = ExceptionLatch::default();

    let mut fetched = None;
    if pc % INST_BYTES == 0 {
        match bus.read(pc, AccessWidth::Word, pc) {
            Ok(word) => fetched = Some(word),
            Err(fault) => return StepOutcome::Faulted { fault },
        }
    } else {
        latch.raise_sync(ExceptionCode::FetchAddressError, ESUBCODE_ADEF, Some(pc));
    }

    interrupt::sample_interrupt_lines(state);
    if interrupt::interrupt_ready(state) {
        latch.raise_interrupt();
    }

    let mut ctx = StepContext { pc, dnpc: snpc };
    let mut outcome = StepOutcome::Continued;

    if !latch.taken() {
        if let Some(word) = fetched {
            let inst = decode(word);
            match execute(&inst, &mut ctx, state, bus) {
                Ok(ExecResult::Retired) => {}
                Ok(ExecResult::Exception(cause)) => {
                    latch.raise_sync(cause.code, cause.subcode, cause.badv);
                }
                Ok(ExecResult::EndOfTest { code }) => outcome = StepOutcome::Trapped { code },
                Err(fault) => return StepOutcome::Faulted { fault },
            }
        }
    }

    state.reset_zero_register();

    if let Some(cause) = latch.pending() {
        ctx.dnpc = interrupt::enter_exception(state, cause, pc);
    }

    state.set_pc(ctx.dnpc);
    state.set_stable_counter(
        clock
            .elapsed_micros()
            .wrapping_mul(config.timer_freq_mhz),
    );

    outcome
}

#[cfg(test)]
mod tests {
    use super::step_one;
    use crate::api::{CoreConfig, StepOutcome};
    use crate::clock::ManualClock;
    use crate::memory::{AccessWidth, SystemBus};
    use crate::state::ArchitecturalState;

    const BASE: u32 = 0x8000_0000;

    fn fixture() -> (ArchitecturalState, SystemBus, ManualClock, CoreConfig) {
        let config = CoreConfig {
            mem_base: BASE,
            mem_size: 0x1000,
            timer_freq_mhz: 100,
        };
        (
            ArchitecturalState::with_entry(BASE),
            SystemBus::new(BASE, 0x1000),
            ManualClock::new(),
            config,
        )
    }

    fn put_word(bus: &mut SystemBus, addr: u32, word: u32) {
        bus.write(addr, AccessWidth::Word, word, 0).expect("in range");
    }

    #[test]
    fn add_wraps_at_the_sign_boundary() {
        let (mut state, mut bus, mut clock, config) = fixture();
        state.set_gpr(4, 0x7fff_ffff);
        state.set_gpr(5, 1);
        // add.w r6, r4, r5
        put_word(&mut bus, BASE, 0x0010_0000 | (5 << 10) | (4 << 5) | 6);

        let outcome = step_one(&mut state, &mut bus, &mut clock, &config);
        assert_eq!(outcome, StepOutcome::Continued);
        assert_eq!(state.gpr(6), 0x8000_0000);
        assert_eq!(state.pc(), BASE + 4);
    }

    #[test]
    fn zero_register_reads_zero_after_a_write_to_it() {
        let (mut state, mut bus, mut clock, config) = fixture();
        state.set_gpr(4, 7);
        // add.w r0, r4, r4
        put_word(&mut bus, BASE, 0x0010_0000 | (4 << 10) | (4 << 5));

        step_one(&mut state, &mut bus, &mut clock, &config);
        assert_eq!(state.gpr(0), 0);
    }

    #[test]
    fn division_by_zero_follows_the_documented_policy() {
        let (mut state, mut bus, mut clock, config) = fixture();
        state.set_gpr(4, 1234);
        // div.w r6, r4, r0 ; mod.w r7, r4, r0
        put_word(&mut bus, BASE, 0x0020_0000 | (4 << 5) | 6);
        put_word(&mut bus, BASE + 4, 0x0020_8000 | (4 << 5) | 7);

        step_one(&mut state, &mut bus, &mut clock, &config);
        step_one(&mut state, &mut bus, &mut clock, &config);
        assert_eq!(state.gpr(6), u32::MAX);
        assert_eq!(state.gpr(7), 1234);
    }

    #[test]
    fn signed_division_overflow_wraps() {
        let (mut state, mut bus, mut clock, config) = fixture();
        state.set_gpr(4, 0x8000_0000);
        state.set_gpr(5, u32::MAX); // -1
        put_word(&mut bus, BASE, 0x0020_0000 | (5 << 10) | (4 << 5) | 6);

        step_one(&mut state, &mut bus, &mut clock, &config);
        assert_eq!(state.gpr(6), 0x8000_0000);
    }

    #[test]
    fn mulh_widens_before_taking_the_high_half() {
        let (mut state, mut bus, mut clock, config) = fixture();
        state.set_gpr(4, 0xffff_ffff);
        state.set_gpr(5, 0xffff_ffff);
        // mulh.wu r6, r4, r5
        put_word(&mut bus, BASE, 0x001d_0000 | (5 << 10) | (4 << 5) | 6);
        // mulh.w r7, r4, r5 (-1 * -1)
        put_word(&mut bus, BASE + 4, 0x001c_8000 | (5 << 10) | (4 << 5) | 7);

        step_one(&mut state, &mut bus, &mut clock, &config);
        step_one(&mut state, &mut bus, &mut clock, &config);
        assert_eq!(state.gpr(6), 0xffff_fffe);
        assert_eq!(state.gpr(7), 0);
    }

    #[test]
    fn counter_refresh_scales_by_configured_frequency() {
        let (mut state, mut bus, mut clock, config) = fixture();
        put_word(&mut bus, BASE, 0x0010_0000); // add.w r0, r0, r0

        clock.advance(10);
        step_one(&mut state, &mut bus, &mut clock, &config);
        assert_eq!(state.stable_counter(), 1000);
    }

    #[test]
    fn counter_read_exposes_low_and_high_halves() {
        let (mut state, mut bus, mut clock, config) = fixture();
        state.set_stable_counter(0x1122_3344_5566_7788);
        // rdcntvl.w r4 ; rdcntvh.w r5
        put_word(&mut bus, BASE, 0x0000_6000 | 4);
        put_word(&mut bus, BASE + 4, 0x0000_6400 | 5);

        step_one(&mut state, &mut bus, &mut clock, &config);
        // second step sees the refreshed (zero-time) counter, so reload
        state.set_stable_counter(0x1122_3344_5566_7788);
        step_one(&mut state, &mut bus, &mut clock, &config);

        assert_eq!(state.gpr(4), 0x5566_7788);
        assert_eq!(state.gpr(5), 0x1122_3344);
    }

    #[test]
    fn out_of_bound_fetch_is_a_host_fatal_fault() {
        let (mut state, mut bus, mut clock, config) = fixture();
        state.set_pc(0x9000_0000);

        let outcome = step_one(&mut state, &mut bus, &mut clock, &config);
        assert!(matches!(outcome, StepOutcome::Faulted { .. }));
    }
}

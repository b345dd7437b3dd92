//! Minimal embedding demo: hand-assembled program, one demo region,
//! stepped until the end-of-test trap.

use std::cell::RefCell;
use std::rc::Rc;

use la32r_core::{AccessWidth, Core, CoreConfig, ManualClock, StepOutcome};
use proptest as _;
use rstest as _;
#[cfg(feature = "serde")]
use serde as _;
use thiserror as _;

const MEM_BASE: u32 = 0x8000_0000;
const LED_BASE: u32 = 0x1fe0_0000;

const fn lu12i_w(rd: u8, si20: u32) -> u32 {
    0x1400_0000 | ((si20 & 0xf_ffff) << 5) | rd as u32
}

const fn addi_w(rd: u8, rj: u8, imm: i32) -> u32 {
    0x0280_0000 | (((imm as u32) & 0xfff) << 10) | ((rj as u32) << 5) | rd as u32
}

const fn st_w(rd: u8, rj: u8, imm: i32) -> u32 {
    0x2980_0000 | (((imm as u32) & 0xfff) << 10) | ((rj as u32) << 5) | rd as u32
}

const fn trap(rd: u8) -> u32 {
    0xf800_0000 | rd as u32
}

fn main() {
    let config = CoreConfig {
        mem_base: MEM_BASE,
        mem_size: 0x1000,
        timer_freq_mhz: 100,
    };
    let mut core = Core::with_time_source(config, Box::new(ManualClock::new()));

    // LED panel stand-in: latches the last word stored to offset 0
    let latched = Rc::new(RefCell::new(0u32));
    let latch = Rc::clone(&latched);
    core.register_region(
        "led",
        LED_BASE,
        0x10,
        Box::new(
            move |space: &mut [u8], offset: u32, _width: AccessWidth, is_write: bool| {
                if is_write && offset == 0 {
                    let mut word = [0u8; 4];
                    word.copy_from_slice(&space[..4]);
                    *latch.borrow_mut() = u32::from_le_bytes(word);
                }
            },
        ),
    )
    .expect("led region registration");

    let program = [
        lu12i_w(4, LED_BASE >> 12), // r4 = LED base
        addi_w(5, 0, 0xff),         // r5 = LED pattern
        st_w(5, 4, 0),              // light the panel
        addi_w(6, 0, 3),            // r6 = exit code
        trap(6),
    ];
    let image: Vec<u8> = program.iter().flat_map(|word| word.to_le_bytes()).collect();
    core.load_image(MEM_BASE, &image).expect("program fits");

    let mut steps = 0u32;
    loop {
        steps += 1;
        match core.step() {
            StepOutcome::Continued => {}
            StepOutcome::Trapped { code } => {
                println!("trapped with exit code {code} after {steps} steps");
                break;
            }
            StepOutcome::Faulted { fault } => {
                eprintln!("host-fatal fault: {fault}");
                break;
            }
        }
    }

    println!("led latch: {:#06x}", *latched.borrow());
}

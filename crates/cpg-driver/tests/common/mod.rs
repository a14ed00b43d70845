//! Compact fixture CPG shared by the integration tests
//!
//! ```text
//! .osc 48 MHz ─ .pll ×25 ─ .pll_div2 ─ DIV (div-dyn {1→1, 2→4, 3→8}) ─┬─ A ─┐ reset R0
//!                                                                     ├─ B ─┘ bus-stop B0
//!                                                                     └─ CRIT (critical)
//! .osc ─ PLLX (programmable)        AUX (input, rate from config)
//! ```

#![allow(dead_code)]

use cpg_driver::{Cpg, CpgConfig, SimulatedPort};
use cpg_soc::{
    BitRef, BusStopDesc, BusStopId, ClkId, CoreClk, Descriptor, DivEntry, Field, ModClk, PllRegs,
    ResetDesc, ResetId,
};

pub const DIV: ClkId = ClkId(0);
pub const A: ClkId = ClkId(1);
pub const B: ClkId = ClkId(2);
pub const CRIT: ClkId = ClkId(3);
pub const AUX: ClkId = ClkId(4);
pub const PLLX: ClkId = ClkId(5);
pub const OSC: ClkId = ClkId(100);
const PLL: ClkId = ClkId(101);
const PLL_DIV2: ClkId = ClkId(102);

pub const R0: ResetId = ResetId(0);
pub const B0: BusStopId = BusStopId(0);

pub const DIV_FIELD: Field = Field::new(0x200, 0, 2);
pub const DIV_BUSY: BitRef = BitRef::new(0x280, 0);
pub const PLLX_CLK1: u32 = 0x10;
pub const PLLX_CLK2: u32 = 0x14;
pub const A_ON: BitRef = BitRef::new(0x500, 0);
pub const A_MON: BitRef = BitRef::new(0x680, 0);
pub const B_ON: BitRef = BitRef::new(0x500, 1);
pub const B_MON: BitRef = BitRef::new(0x680, 1);
pub const CRIT_ON: BitRef = BitRef::new(0x504, 0);
pub const R0_BIT: BitRef = BitRef::new(0x800, 0);
pub const R0_MON: BitRef = BitRef::new(0x980, 0);
pub const B0_BIT: BitRef = BitRef::new(0xb00, 0);

const TABLE: &[DivEntry] = &[DivEntry::new(1, 1), DivEntry::new(2, 4), DivEntry::new(3, 8)];

const CORE: &[CoreClk] = &[
    CoreClk::input(OSC, ".osc", Some(48_000_000)),
    CoreClk::fixed(PLL, ".pll", OSC, 25, 1),
    CoreClk::fixed(PLL_DIV2, ".pll_div2", PLL, 1, 2),
    CoreClk::div_dyn(DIV, "DIV", PLL_DIV2, DIV_FIELD, TABLE, Some(DIV_BUSY)),
    CoreClk::input(AUX, "AUX", None),
    CoreClk::pll(PLLX, "PLLX", OSC, PllRegs { clk1: PLLX_CLK1, clk2: PLLX_CLK2 }),
];

const MODULES: &[ModClk] = &[
    ModClk::new(A, "a", DIV, A_ON).monitor(A_MON).reset(R0).bus_stop(B0),
    ModClk::new(B, "b", DIV, B_ON).monitor(B_MON).reset(R0).bus_stop(B0),
    ModClk::new(CRIT, "crit", DIV, CRIT_ON).critical(),
];

const RESETS: &[ResetDesc] = &[ResetDesc {
    id: R0,
    name: "r0",
    bit: R0_BIT,
    mon: Some(R0_MON),
    dependents: &[A, B],
}];

const BUS_STOPS: &[BusStopDesc] = &[BusStopDesc {
    id: B0,
    name: "b0",
    bit: B0_BIT,
    members: &[A, B],
}];

pub const FIXTURE: Descriptor = Descriptor {
    name: "fixture",
    core: CORE,
    modules: MODULES,
    resets: RESETS,
    bus_stops: BUS_STOPS,
    last_exported: 6,
    window_size: 0x1000,
};

/// DIV latched at value 1 (÷1), PLLX at M=50 P=1 S=1.
pub const BOOT: &[(u32, u32)] = &[(0x200, 1), (PLLX_CLK1, cpg_soc::regs::pll::clk1(50, 0, 1)), (PLLX_CLK2, 1)];

pub fn port() -> SimulatedPort {
    SimulatedPort::for_descriptor(&FIXTURE).with_state(BOOT)
}

pub fn engine() -> Cpg<SimulatedPort> {
    engine_with(port())
}

pub fn engine_with(port: SimulatedPort) -> Cpg<SimulatedPort> {
    Cpg::new(&FIXTURE, port, CpgConfig::immediate(5)).expect("fixture engine")
}

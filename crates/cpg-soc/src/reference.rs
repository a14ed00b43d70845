//! Reference platform clock table.
//!
//! ```text
//! .osc 24 MHz ─┬─ .pll1 ──────────────────────────── I (div-dyn) ── CPU
//!              ├─ .pll2 ─ .pll2_div2 ─ .pll2_div2_8 ─ P0
//!              ├─ .pll3 ─ .pll3_div2 ─┬─ ZT
//!              │                      └─ .pll3_div2_4 ─ P1
//!              ├─ .pll5 ─┬─ .pll5_fout1ph0 ─┐
//!              │         └─ .pll5_fout3 ────┴─ .sel_pll5_4 ─ M3 ── DSI / LCDC pixel
//!              └─ .pll6 ─ .pll6_250 ─ G ── GPU
//! ```
//!
//! Exported ids (`clk`, `rst`, `bus`) are the numbers consumers bind to.
//! Internal nodes sit at 100 and above.

use crate::desc::{
    BitRef, BusStopDesc, ClkId, CoreClk, Descriptor, DivEntry, Field, ModClk, PllRegs,
    ResetDesc, ResetId,
};
use crate::regs::{self, clk_mon, clkstatus, pll, rst as rst_reg};

/// Exported clock ids.
pub mod clk {
    use crate::desc::ClkId;

    /// CPU core clock.
    pub const I: ClkId = ClkId(0);
    /// Peripheral clock 0 (100 MHz class).
    pub const P0: ClkId = ClkId(1);
    /// Peripheral clock 1 (200 MHz class).
    pub const P1: ClkId = ClkId(2);
    /// Trace clock.
    pub const ZT: ClkId = ClkId(3);
    /// GPU core clock.
    pub const G: ClkId = ClkId(4);
    /// SD host source.
    pub const SD0: ClkId = ClkId(5);
    /// SD host source / 4.
    pub const SD0_DIV4: ClkId = ClkId(6);
    /// Display pixel source.
    pub const M3: ClkId = ClkId(7);
    /// Oscillator pass-through.
    pub const OSC: ClkId = ClkId(8);
    /// Oscillator / 1000.
    pub const OSC_DIV1000: ClkId = ClkId(9);
    /// External audio clock, rate supplied by configuration.
    pub const AUDIO_CLK1: ClkId = ClkId(10);

    /// GIC.
    pub const GIC_GICCLK: ClkId = ClkId(11);
    /// IA55.
    pub const IA55_CLK: ClkId = ClkId(12);
    /// DMAC bus clock.
    pub const DMAC_ACLK: ClkId = ClkId(13);
    /// DMAC register clock.
    pub const DMAC_PCLK: ClkId = ClkId(14);
    /// OS timer 0.
    pub const OSTM0_PCLK: ClkId = ClkId(15);
    /// Watchdog 0 register clock.
    pub const WDT0_PCLK: ClkId = ClkId(16);
    /// Watchdog 0 counter clock.
    pub const WDT0_CLK: ClkId = ClkId(17);
    /// SD host 0 card clock.
    pub const SDHI0_IMCLK: ClkId = ClkId(18);
    /// SD host 0 bus clock.
    pub const SDHI0_ACLK: ClkId = ClkId(19);
    /// GPU core gate.
    pub const GPU_CLK: ClkId = ClkId(20);
    /// GPU AXI gate.
    pub const GPU_AXI_CLK: ClkId = ClkId(21);
    /// DSI PLL reference.
    pub const DSI_PLLCLK: ClkId = ClkId(22);
    /// DSI bus clock.
    pub const DSI_ACLK: ClkId = ClkId(23);
    /// LCDC bus clock.
    pub const LCDC_CLK_A: ClkId = ClkId(24);
    /// LCDC pixel clock.
    pub const LCDC_CLK_P: ClkId = ClkId(25);
    /// I2C 0.
    pub const I2C0_PCLK: ClkId = ClkId(26);
    /// SCIF 0.
    pub const SCIF0_CLK_PCK: ClkId = ClkId(27);

    /// First id that is not exported.
    pub const LAST_EXPORTED: u32 = 28;
}

/// Internal clock ids.
mod int {
    use crate::desc::ClkId;

    pub const OSC: ClkId = ClkId(100);
    pub const PLL1: ClkId = ClkId(101);
    pub const PLL2: ClkId = ClkId(102);
    pub const PLL3: ClkId = ClkId(103);
    pub const PLL5: ClkId = ClkId(104);
    pub const PLL6: ClkId = ClkId(105);
    pub const PLL2_DIV2: ClkId = ClkId(106);
    pub const PLL2_DIV2_8: ClkId = ClkId(107);
    pub const PLL3_DIV2: ClkId = ClkId(108);
    pub const PLL3_DIV2_4: ClkId = ClkId(109);
    pub const PLL5_FOUT1PH0: ClkId = ClkId(110);
    pub const PLL5_FOUT3: ClkId = ClkId(111);
    pub const PLL6_250: ClkId = ClkId(112);
    pub const SEL_PLL5_4: ClkId = ClkId(113);
}

/// Reset line ids.
pub mod rst {
    use crate::desc::ResetId;

    /// DMAC.
    pub const DMAC_ARESETN: ResetId = ResetId(0);
    /// OS timer 0.
    pub const OSTM0_PRESETZ: ResetId = ResetId(1);
    /// Watchdog 0.
    pub const WDT0_PRESETN: ResetId = ResetId(2);
    /// SD host 0.
    pub const SDHI0_IXRST: ResetId = ResetId(3);
    /// GPU.
    pub const GPU_RESETN: ResetId = ResetId(4);
    /// MIPI DSI.
    pub const DSI_PRESET_N: ResetId = ResetId(5);
    /// LCD controller.
    pub const LCDC_RESET_N: ResetId = ResetId(6);
    /// I2C 0.
    pub const I2C0_MRST: ResetId = ResetId(7);
    /// SCIF 0.
    pub const SCIF0_RST_SYSTEM_N: ResetId = ResetId(8);
}

/// Bus-stop group ids.
pub mod bus {
    use crate::desc::BusStopId;

    /// SD host 0 master.
    pub const SDHI0: BusStopId = BusStopId(0);
    /// GPU master.
    pub const GPU: BusStopId = BusStopId(1);
    /// LCDC master.
    pub const LCDC: BusStopId = BusStopId(2);
    /// Video register slice shared by LCDC and DSI.
    pub const VIDEO: BusStopId = BusStopId(3);
    /// SCIF 0 register slice.
    pub const SCIF0: BusStopId = BusStopId(4);
}

// ── Divider tables ───────────────────────────────────────────────────────────

const DTABLE_1_8: &[DivEntry] = &[
    DivEntry::new(0, 1),
    DivEntry::new(1, 2),
    DivEntry::new(2, 4),
    DivEntry::new(3, 8),
];

const DTABLE_1_32: &[DivEntry] = &[
    DivEntry::new(0, 1),
    DivEntry::new(1, 2),
    DivEntry::new(2, 4),
    DivEntry::new(3, 8),
    DivEntry::new(4, 32),
];

const DTABLE_PIXEL: &[DivEntry] = &[
    DivEntry::new(0, 1),
    DivEntry::new(1, 2),
    DivEntry::new(2, 4),
    DivEntry::new(3, 8),
    DivEntry::new(4, 16),
];

const SEL_PLL5_4_PARENTS: &[ClkId] = &[int::PLL5_FOUT1PH0, int::PLL5_FOUT3];
const SEL_SDHI0_PARENTS: &[ClkId] = &[int::PLL2_DIV2, int::PLL3_DIV2_4];

const fn status(bit: u8) -> Option<BitRef> {
    Some(BitRef::new(regs::CLKSTATUS, bit))
}

const fn on(reg: u32, bit: u8) -> BitRef {
    BitRef::new(reg, bit)
}

const fn mon(reg: u32, bit: u8) -> BitRef {
    BitRef::new(clk_mon(reg), bit)
}

// ── Core clocks ──────────────────────────────────────────────────────────────

const CORE: &[CoreClk] = &[
    // External inputs
    CoreClk::input(int::OSC, ".osc", Some(24_000_000)),
    CoreClk::input(clk::AUDIO_CLK1, "AUDIO_CLK1", None),
    // PLLs
    CoreClk::pll(int::PLL1, ".pll1", int::OSC, PllRegs { clk1: regs::PLL1_CLK1, clk2: regs::PLL1_CLK2 }),
    CoreClk::fixed(int::PLL2, ".pll2", int::OSC, 200, 3),
    CoreClk::fixed(int::PLL3, ".pll3", int::OSC, 200, 3),
    CoreClk::pll(int::PLL5, ".pll5", int::OSC, PllRegs { clk1: regs::PLL5_CLK1, clk2: regs::PLL5_CLK2 }),
    CoreClk::fixed(int::PLL6, ".pll6", int::OSC, 125, 6),
    // Fixed post-dividers
    CoreClk::fixed(int::PLL2_DIV2, ".pll2_div2", int::PLL2, 1, 2),
    CoreClk::fixed(int::PLL2_DIV2_8, ".pll2_div2_8", int::PLL2_DIV2, 1, 8),
    CoreClk::fixed(int::PLL3_DIV2, ".pll3_div2", int::PLL3, 1, 2),
    CoreClk::fixed(int::PLL3_DIV2_4, ".pll3_div2_4", int::PLL3_DIV2, 1, 4),
    CoreClk::fixed(int::PLL5_FOUT1PH0, ".pll5_fout1ph0", int::PLL5, 1, 2),
    CoreClk::fixed(int::PLL5_FOUT3, ".pll5_fout3", int::PLL5, 1, 6),
    CoreClk::fixed(int::PLL6_250, ".pll6_250", int::PLL6, 1, 2),
    CoreClk::mux(
        int::SEL_PLL5_4,
        ".sel_pll5_4",
        SEL_PLL5_4_PARENTS,
        Field::new(regs::OTHERFUNC1, 0, 1),
        None,
    ),
    // Exported core clocks
    CoreClk::div_dyn(
        clk::I,
        "I",
        int::PLL1,
        Field::new(regs::PL1_DDIV, 0, 2),
        DTABLE_1_8,
        status(clkstatus::DIVPL1),
    ),
    CoreClk::div(clk::P0, "P0", int::PLL2_DIV2_8, Field::new(regs::PL2_DDIV, 8, 3), DTABLE_1_32),
    CoreClk::div(clk::P1, "P1", int::PLL3_DIV2_4, Field::new(regs::PL3A_DDIV, 0, 3), DTABLE_1_32),
    CoreClk::div(clk::ZT, "ZT", int::PLL3_DIV2, Field::new(regs::PL3A_DDIV, 8, 3), DTABLE_1_32),
    CoreClk::div_dyn(
        clk::G,
        "G",
        int::PLL6_250,
        Field::new(regs::PL6_DDIV, 0, 2),
        DTABLE_1_8,
        status(clkstatus::DIVGPU),
    ),
    CoreClk::mux(
        clk::SD0,
        "SD0",
        SEL_SDHI0_PARENTS,
        Field::new(regs::PL2SDHI_DSEL, 0, 1),
        status(clkstatus::SELSDHI0),
    ),
    CoreClk::fixed(clk::SD0_DIV4, "SD0_DIV4", clk::SD0, 1, 4),
    CoreClk::div_dyn(
        clk::M3,
        "M3",
        int::SEL_PLL5_4,
        Field::new(regs::PL5_SDIV, 8, 4),
        DTABLE_PIXEL,
        status(clkstatus::DIVDSIB),
    )
    .gated(BitRef::new(regs::PL5_SDIV, 0)),
    CoreClk::fixed(clk::OSC, "OSC", int::OSC, 1, 1),
    CoreClk::fixed(clk::OSC_DIV1000, "OSC_DIV1000", int::OSC, 1, 1000),
];

// ── Module clocks ────────────────────────────────────────────────────────────

const MODULES: &[ModClk] = &[
    ModClk::new(clk::GIC_GICCLK, "gic_gicclk", clk::P1, on(regs::CLK_ON_GIC, 0))
        .monitor(mon(regs::CLK_ON_GIC, 0))
        .critical(),
    ModClk::new(clk::IA55_CLK, "ia55_clk", clk::P1, on(regs::CLK_ON_IA55, 1))
        .monitor(mon(regs::CLK_ON_IA55, 1))
        .critical(),
    ModClk::new(clk::DMAC_ACLK, "dmac_aclk", clk::P1, on(regs::CLK_ON_DMAC, 0))
        .monitor(mon(regs::CLK_ON_DMAC, 0))
        .reset(rst::DMAC_ARESETN),
    ModClk::new(clk::DMAC_PCLK, "dmac_pclk", clk::P0, on(regs::CLK_ON_DMAC, 1))
        .monitor(mon(regs::CLK_ON_DMAC, 1))
        .reset(rst::DMAC_ARESETN),
    ModClk::new(clk::OSTM0_PCLK, "ostm0_pclk", clk::P0, on(regs::CLK_ON_OSTM, 0))
        .monitor(mon(regs::CLK_ON_OSTM, 0))
        .reset(rst::OSTM0_PRESETZ),
    ModClk::new(clk::WDT0_PCLK, "wdt0_pclk", clk::P0, on(regs::CLK_ON_WDT, 0))
        .monitor(mon(regs::CLK_ON_WDT, 0))
        .reset(rst::WDT0_PRESETN),
    ModClk::new(clk::WDT0_CLK, "wdt0_clk", clk::OSC, on(regs::CLK_ON_WDT, 1))
        .monitor(mon(regs::CLK_ON_WDT, 1))
        .reset(rst::WDT0_PRESETN),
    ModClk::new(clk::SDHI0_IMCLK, "sdhi0_imclk", clk::SD0_DIV4, on(regs::CLK_ON_SDHI, 0))
        .monitor(mon(regs::CLK_ON_SDHI, 0))
        .reset(rst::SDHI0_IXRST)
        .bus_stop(bus::SDHI0),
    ModClk::new(clk::SDHI0_ACLK, "sdhi0_aclk", clk::P1, on(regs::CLK_ON_SDHI, 3))
        .monitor(mon(regs::CLK_ON_SDHI, 3))
        .reset(rst::SDHI0_IXRST)
        .bus_stop(bus::SDHI0),
    ModClk::new(clk::GPU_CLK, "gpu_clk", clk::G, on(regs::CLK_ON_GPU, 0))
        .monitor(mon(regs::CLK_ON_GPU, 0))
        .reset(rst::GPU_RESETN)
        .bus_stop(bus::GPU),
    ModClk::new(clk::GPU_AXI_CLK, "gpu_axi_clk", clk::P1, on(regs::CLK_ON_GPU, 1))
        .monitor(mon(regs::CLK_ON_GPU, 1))
        .reset(rst::GPU_RESETN)
        .bus_stop(bus::GPU),
    ModClk::new(clk::DSI_PLLCLK, "dsi_pll_clk", clk::M3, on(regs::CLK_ON_DSI, 0))
        .monitor(mon(regs::CLK_ON_DSI, 0))
        .reset(rst::DSI_PRESET_N)
        .forward_rate(),
    ModClk::new(clk::DSI_ACLK, "dsi_aclk", clk::P1, on(regs::CLK_ON_DSI, 2))
        .monitor(mon(regs::CLK_ON_DSI, 2))
        .reset(rst::DSI_PRESET_N)
        .bus_stop(bus::VIDEO),
    ModClk::new(clk::LCDC_CLK_A, "lcdc_a", clk::P1, on(regs::CLK_ON_LCDC, 0))
        .monitor(mon(regs::CLK_ON_LCDC, 0))
        .reset(rst::LCDC_RESET_N)
        .bus_stop(bus::LCDC),
    ModClk::new(clk::LCDC_CLK_P, "lcdc_clk_p", clk::M3, on(regs::CLK_ON_LCDC, 1))
        .monitor(mon(regs::CLK_ON_LCDC, 1))
        .reset(rst::LCDC_RESET_N)
        .bus_stop(bus::LCDC)
        .forward_rate(),
    ModClk::new(clk::I2C0_PCLK, "i2c0_pclk", clk::P0, on(regs::CLK_ON_I2C, 0))
        .monitor(mon(regs::CLK_ON_I2C, 0))
        .reset(rst::I2C0_MRST),
    ModClk::new(clk::SCIF0_CLK_PCK, "scif0_clk_pck", clk::P0, on(regs::CLK_ON_SCIF, 0))
        .monitor(mon(regs::CLK_ON_SCIF, 0))
        .reset(rst::SCIF0_RST_SYSTEM_N)
        .bus_stop(bus::SCIF0),
];

// ── Reset lines ──────────────────────────────────────────────────────────────

const fn reset(
    id: ResetId,
    name: &'static str,
    on_reg: u32,
    mon_reg: u32,
    mon_bit: u8,
    dependents: &'static [ClkId],
) -> ResetDesc {
    ResetDesc {
        id,
        name,
        bit: BitRef::new(rst_reg(on_reg), 0),
        mon: Some(BitRef::new(mon_reg, mon_bit)),
        dependents,
    }
}

const RESETS: &[ResetDesc] = &[
    reset(rst::DMAC_ARESETN, "dmac_aresetn", regs::CLK_ON_DMAC, regs::RST_MON_0, 8, &[clk::DMAC_ACLK, clk::DMAC_PCLK]),
    reset(rst::OSTM0_PRESETZ, "ostm0_presetz", regs::CLK_ON_OSTM, regs::RST_MON_0, 10, &[clk::OSTM0_PCLK]),
    reset(rst::WDT0_PRESETN, "wdt0_presetn", regs::CLK_ON_WDT, regs::RST_MON_0, 13, &[clk::WDT0_PCLK, clk::WDT0_CLK]),
    reset(rst::SDHI0_IXRST, "sdhi0_ixrst", regs::CLK_ON_SDHI, regs::RST_MON_0, 19, &[clk::SDHI0_IMCLK, clk::SDHI0_ACLK]),
    reset(rst::GPU_RESETN, "gpu_resetn", regs::CLK_ON_GPU, regs::RST_MON_1, 0, &[clk::GPU_CLK, clk::GPU_AXI_CLK]),
    reset(rst::DSI_PRESET_N, "dsi_preset_n", regs::CLK_ON_DSI, regs::RST_MON_1, 4, &[clk::DSI_PLLCLK, clk::DSI_ACLK]),
    reset(rst::LCDC_RESET_N, "lcdc_reset_n", regs::CLK_ON_LCDC, regs::RST_MON_1, 8, &[clk::LCDC_CLK_A, clk::LCDC_CLK_P]),
    reset(rst::I2C0_MRST, "i2c0_mrst", regs::CLK_ON_I2C, regs::RST_MON_0, 25, &[clk::I2C0_PCLK]),
    reset(rst::SCIF0_RST_SYSTEM_N, "scif0_rst_system_n", regs::CLK_ON_SCIF, regs::RST_MON_0, 27, &[clk::SCIF0_CLK_PCK]),
];

// ── Bus-stop groups ──────────────────────────────────────────────────────────

const BUS_STOPS: &[BusStopDesc] = &[
    BusStopDesc {
        id: bus::SDHI0,
        name: "mstop_sdhi0",
        bit: BitRef::new(regs::BUS_MSTOP_PERI, 0),
        members: &[clk::SDHI0_IMCLK, clk::SDHI0_ACLK],
    },
    BusStopDesc {
        id: bus::GPU,
        name: "mstop_gpu",
        bit: BitRef::new(regs::BUS_MSTOP_MM, 3),
        members: &[clk::GPU_CLK, clk::GPU_AXI_CLK],
    },
    BusStopDesc {
        id: bus::LCDC,
        name: "mstop_lcdc",
        bit: BitRef::new(regs::BUS_MSTOP_MM, 7),
        members: &[clk::LCDC_CLK_A, clk::LCDC_CLK_P],
    },
    BusStopDesc {
        id: bus::VIDEO,
        name: "mstop_video",
        bit: BitRef::new(regs::BUS_MSTOP_REG, 2),
        members: &[clk::LCDC_CLK_A, clk::DSI_ACLK],
    },
    BusStopDesc {
        id: bus::SCIF0,
        name: "mstop_scif0",
        bit: BitRef::new(regs::BUS_MSTOP_REG, 0),
        members: &[clk::SCIF0_CLK_PCK],
    },
];

/// The reference platform descriptor.
pub const REFERENCE: Descriptor = Descriptor {
    name: "reference-cpg",
    core: CORE,
    modules: MODULES,
    resets: RESETS,
    bus_stops: BUS_STOPS,
    last_exported: clk::LAST_EXPORTED,
    window_size: regs::WINDOW_SIZE,
};

/// Register contents left by boot firmware (everything else reads zero).
///
/// PLL1: M=100 P=1 S=1 → 1.2 GHz. PLL5: M=125 P=1 S=2 → 750 MHz.
/// ZT divider latched at /8.
pub const BOOT_STATE: &[(u32, u32)] = &[
    (regs::PLL1_CLK1, pll::clk1(100, 0, 1)),
    (regs::PLL1_CLK2, 1),
    (regs::PLL5_CLK1, pll::clk1(125, 0, 1)),
    (regs::PLL5_CLK2, 2),
    (regs::PL3A_DDIV, 0x0300),
];

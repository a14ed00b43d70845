//! CPG register map of the reference platform.
//!
//! Offsets are relative to the CPG base address. Module registers come in
//! families at fixed strides from their `CLK_ON` register:
//!
//! ```text
//! 0x000 - 0x1ff   PLL control (CLK1 / CLK2 per PLL)
//! 0x200 - 0x2ff   divider / selector fields, CLKSTATUS
//! 0x500 - 0x5ff   CLK_ON   (enable bits)
//! 0x680 - 0x77f   CLK_MON  (running bits)           CLK_ON + 0x180
//! 0x800 - 0x8ff   RST      (1 = released)           CLK_ON + 0x300
//! 0x980 - 0x98f   RST_MON  (1 = in reset)
//! 0xb60 - 0xb8f   BUS_MSTOP (1 = parked)
//! ```

// ── PLL control ──────────────────────────────────────────────────────────────

/// PLL1 (CPU) CLK1: K / M / P.
pub const PLL1_CLK1: u32 = 0x0004;
/// PLL1 (CPU) CLK2: S.
pub const PLL1_CLK2: u32 = 0x0008;
/// PLL5 (display) CLK1.
pub const PLL5_CLK1: u32 = 0x0144;
/// PLL5 (display) CLK2.
pub const PLL5_CLK2: u32 = 0x0148;

/// PLL CLK1 / CLK2 field layout.
pub mod pll {
    /// K: signed fractional part, bits 31:16.
    pub const K_SHIFT: u32 = 16;
    /// M: integer multiplier, bits 15:6.
    pub const M_SHIFT: u32 = 6;
    /// M width.
    pub const M_MASK: u32 = 0x3ff;
    /// P: pre-divider, bits 5:0.
    pub const P_MASK: u32 = 0x3f;
    /// S: post-divider exponent, CLK2 bits 2:0.
    pub const S_MASK: u32 = 0x7;
    /// Denominator of the K fraction.
    pub const K_SCALE: u64 = 1 << 16;

    /// Pack M / K / P into a CLK1 word.
    #[must_use]
    #[allow(clippy::cast_sign_loss)]
    pub const fn clk1(m: u32, k: i16, p: u32) -> u32 {
        ((k as u16 as u32) << K_SHIFT) | ((m & M_MASK) << M_SHIFT) | (p & P_MASK)
    }
}

// ── Dividers and selectors ───────────────────────────────────────────────────

/// CPU divider (DIVPL1 bits 1:0).
pub const PL1_DDIV: u32 = 0x0200;
/// PLL2 dividers (DIVPL2A bits 10:8).
pub const PL2_DDIV: u32 = 0x0204;
/// PLL3 dividers (DIVPL3A bits 2:0, DIVPL3C bits 10:8).
pub const PL3A_DDIV: u32 = 0x0208;
/// GPU divider (DIVGPU bits 1:0).
pub const PL6_DDIV: u32 = 0x0210;
/// SDHI0 source select (bits 1:0).
pub const PL2SDHI_DSEL: u32 = 0x0218;
/// Display pixel divider (DIVDSIB bits 11:8).
pub const PL5_SDIV: u32 = 0x0420;
/// Display source select (bit 0).
pub const OTHERFUNC1: u32 = 0x0be8;

/// Divider/selector update status. A set bit means an update is in flight.
pub const CLKSTATUS: u32 = 0x0280;

/// Bits of [`CLKSTATUS`].
pub mod clkstatus {
    /// CPU divider busy.
    pub const DIVPL1: u8 = 0;
    /// Display pixel divider busy.
    pub const DIVDSIB: u8 = 8;
    /// GPU divider busy.
    pub const DIVGPU: u8 = 20;
    /// SDHI0 selector busy.
    pub const SELSDHI0: u8 = 28;
}

// ── Module clock enable ──────────────────────────────────────────────────────

/// GIC enable.
pub const CLK_ON_GIC: u32 = 0x0514;
/// IA55 interrupt controller enable.
pub const CLK_ON_IA55: u32 = 0x0518;
/// DMA controller enable.
pub const CLK_ON_DMAC: u32 = 0x052c;
/// OS timer enable.
pub const CLK_ON_OSTM: u32 = 0x0534;
/// Watchdog enable.
pub const CLK_ON_WDT: u32 = 0x0548;
/// SD host enable.
pub const CLK_ON_SDHI: u32 = 0x0554;
/// GPU enable.
pub const CLK_ON_GPU: u32 = 0x0558;
/// MIPI DSI enable.
pub const CLK_ON_DSI: u32 = 0x0568;
/// LCD controller enable.
pub const CLK_ON_LCDC: u32 = 0x056c;
/// I2C enable.
pub const CLK_ON_I2C: u32 = 0x0580;
/// Serial (SCIF) enable.
pub const CLK_ON_SCIF: u32 = 0x0584;

/// Offset from a `CLK_ON` register to its `CLK_MON` register.
pub const MON_STRIDE: u32 = 0x0180;
/// Offset from a `CLK_ON` register to its `RST` register.
pub const RST_STRIDE: u32 = 0x0300;

/// `CLK_MON` register paired with `on`.
#[must_use]
pub const fn clk_mon(on: u32) -> u32 {
    on + MON_STRIDE
}

/// `RST` register paired with `on`.
#[must_use]
pub const fn rst(on: u32) -> u32 {
    on + RST_STRIDE
}

// ── Reset monitors ───────────────────────────────────────────────────────────

/// Reset monitor word 0 (system modules).
pub const RST_MON_0: u32 = 0x0980;
/// Reset monitor word 1 (media modules).
pub const RST_MON_1: u32 = 0x0984;

// ── Bus stop ─────────────────────────────────────────────────────────────────

/// Peripheral-bus master stop bits.
pub const BUS_MSTOP_PERI: u32 = 0x0b64;
/// Multimedia-bus master stop bits.
pub const BUS_MSTOP_MM: u32 = 0x0b68;
/// Register-bus stop bits.
pub const BUS_MSTOP_REG: u32 = 0x0b80;

/// Size of the CPG register window.
pub const WINDOW_SIZE: usize = 0x1_0000;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn families_do_not_collide() {
        assert_eq!(clk_mon(CLK_ON_GPU), 0x06d8);
        assert_eq!(rst(CLK_ON_GPU), 0x0858);
        assert!(rst(CLK_ON_SCIF) < RST_MON_0);
        assert!((OTHERFUNC1 as usize) < WINDOW_SIZE);
    }

    #[test]
    fn pll_word_packing() {
        let w = pll::clk1(100, -1, 1);
        assert_eq!(w & pll::P_MASK, 1);
        assert_eq!((w >> pll::M_SHIFT) & pll::M_MASK, 100);
        assert_eq!(w >> pll::K_SHIFT, 0xffff);
    }
}

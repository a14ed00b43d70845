//! Simulated register window
//!
//! Implements [`RegisterPort`] over an in-memory register file so the whole
//! engine runs without hardware: in CI, in the `cpg` tool's dry-run mode, and
//! in every test of this crate.
//!
//! A port built with [`SimulatedPort::for_descriptor`] behaves like a healthy
//! CPG:
//!
//! ```text
//! write CLK_ON bit   → CLK_MON bit follows
//! write RST bit      → RST_MON bit follows, inverted (1 = still in reset)
//! CLKSTATUS          → always idle (reads 0)
//! ```
//!
//! Faults are injected with [`stick`](SimulatedPort::stick): a stuck bit reads
//! back the pinned value no matter what the engine writes.

use crate::mmio::RegisterPort;
use cpg_soc::{BitRef, Descriptor};
use std::collections::HashMap;

/// Copies one bit into another whenever its register is written.
#[derive(Debug, Clone, Copy)]
struct Mirror {
    src: BitRef,
    dst: BitRef,
    invert: bool,
}

/// In-memory CPG register file.
#[derive(Debug, Clone, Default)]
pub struct SimulatedPort {
    regs: HashMap<u32, u32>,
    mirrors: Vec<Mirror>,
    stuck: Vec<(BitRef, bool)>,
    writes: Vec<(u32, u32)>,
}

impl SimulatedPort {
    /// Empty register file with no hardware behaviour.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register file wired like the CPG described by `desc`.
    pub fn for_descriptor(desc: &Descriptor) -> Self {
        let mut port = Self::new();
        for m in desc.modules {
            if let Some(mon) = m.mon {
                port.mirror(m.on, mon, false);
            }
        }
        for r in desc.resets {
            if let Some(mon) = r.mon {
                port.mirror(r.bit, mon, true);
            }
        }
        port.settle();
        port
    }

    /// Preload register values, as boot firmware would leave them.
    ///
    /// Preloads are not recorded in the write log.
    #[must_use]
    pub fn with_state(mut self, values: &[(u32, u32)]) -> Self {
        for &(offset, value) in values {
            self.regs.insert(offset, value);
        }
        self.settle();
        self
    }

    /// Make `dst` follow `src` (optionally inverted) on every write to `src`.
    pub fn mirror(&mut self, src: BitRef, dst: BitRef, invert: bool) {
        self.mirrors.push(Mirror { src, dst, invert });
    }

    /// Pin a bit so it always reads `value`.
    pub fn stick(&mut self, bit: BitRef, value: bool) {
        self.unstick(bit);
        self.stuck.push((bit, value));
    }

    /// Release a pinned bit.
    pub fn unstick(&mut self, bit: BitRef) {
        self.stuck.retain(|(b, _)| *b != bit);
    }

    /// Every `write32` since construction or the last [`clear_writes`](Self::clear_writes).
    pub fn writes(&self) -> &[(u32, u32)] {
        &self.writes
    }

    /// Forget the write log.
    pub fn clear_writes(&mut self) {
        self.writes.clear();
    }

    /// Index in the write log of the first write to `bit.reg` that left `bit` at `value`.
    pub fn first_write_with(&self, bit: BitRef, value: bool) -> Option<usize> {
        self.writes
            .iter()
            .position(|&(reg, word)| reg == bit.reg && (word & bit.mask() != 0) == value)
    }

    /// Number of writes to `offset`.
    pub fn write_count(&self, offset: u32) -> usize {
        self.writes.iter().filter(|&&(reg, _)| reg == offset).count()
    }

    fn settle(&mut self) {
        let sources: Vec<u32> = self.mirrors.iter().map(|m| m.src.reg).collect();
        for reg in sources {
            self.propagate(reg);
        }
    }

    fn propagate(&mut self, offset: u32) {
        let word = self.regs.get(&offset).copied().unwrap_or(0);
        for m in self.mirrors.iter().filter(|m| m.src.reg == offset) {
            let on = (word & m.src.mask() != 0) != m.invert;
            let dst = self.regs.entry(m.dst.reg).or_insert(0);
            if on {
                *dst |= m.dst.mask();
            } else {
                *dst &= !m.dst.mask();
            }
        }
    }
}

impl RegisterPort for SimulatedPort {
    fn read32(&self, offset: u32) -> u32 {
        let mut value = self.regs.get(&offset).copied().unwrap_or(0);
        for (bit, on) in self.stuck.iter().filter(|(b, _)| b.reg == offset) {
            if *on {
                value |= bit.mask();
            } else {
                value &= !bit.mask();
            }
        }
        value
    }

    fn write32(&mut self, offset: u32, value: u32) {
        tracing::trace!("sim write {offset:#06x} <- {value:#010x}");
        self.writes.push((offset, value));
        self.regs.insert(offset, value);
        self.propagate(offset);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cpg_soc::reference::{self, REFERENCE};
    use cpg_soc::regs;

    #[test]
    fn enable_bit_drives_monitor() {
        let mut port = SimulatedPort::for_descriptor(&REFERENCE);
        let on = BitRef::new(regs::CLK_ON_GPU, 0);
        let mon = BitRef::new(regs::clk_mon(regs::CLK_ON_GPU), 0);
        assert!(!port.read_bit(mon));
        port.write_bit(on, true);
        assert!(port.read_bit(mon));
        port.write_bit(on, false);
        assert!(!port.read_bit(mon));
    }

    #[test]
    fn resets_start_asserted() {
        let port = SimulatedPort::for_descriptor(&REFERENCE);
        // GPU_RESETN monitor: RST_MON_1 bit 0, 1 = in reset
        assert!(port.read_bit(BitRef::new(regs::RST_MON_1, 0)));
    }

    #[test]
    fn stuck_bit_ignores_writes() {
        let mut port = SimulatedPort::for_descriptor(&REFERENCE);
        let mon = BitRef::new(regs::RST_MON_1, 0);
        port.stick(mon, true);
        port.write_bit(BitRef::new(regs::rst(regs::CLK_ON_GPU), 0), true);
        assert!(port.read_bit(mon));
        port.unstick(mon);
        assert!(!port.read_bit(mon));
    }

    #[test]
    fn preloads_are_not_logged() {
        let port = SimulatedPort::for_descriptor(&REFERENCE).with_state(reference::BOOT_STATE);
        assert!(port.writes().is_empty());
        assert_eq!(port.read32(regs::PL3A_DDIV), 0x300);
    }

    #[test]
    fn write_log_order() {
        let mut port = SimulatedPort::new();
        let bit = BitRef::new(0x40, 2);
        port.write32(0x40, 0);
        port.write_bit(bit, true);
        assert_eq!(port.first_write_with(bit, true), Some(1));
        assert_eq!(port.write_count(0x40), 2);
    }
}

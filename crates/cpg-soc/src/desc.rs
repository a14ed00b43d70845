//! Descriptor types for a clock tree.
//!
//! A [`Descriptor`] is a `'static` table: core clocks in dependency order,
//! then module clocks, reset lines and bus-stop groups. Every node references
//! its parents by [`ClkId`]; the engine resolves those into arena indices once.
//!
//! ## Register polarity
//!
//! ```text
//! clock enable bit      1 = clock supplied
//! clock monitor bit     1 = clock running
//! reset bit             1 = reset released, 0 = module held in reset
//! reset monitor bit     1 = module still in reset
//! bus-stop bit          1 = bus parked
//! divider/mux status    1 = update in progress
//! ```

/// Names starting with this character are internal-only nodes.
pub const INTERNAL_PREFIX: char = '.';

/// True if `name` marks a node that is never exposed to consumers.
#[must_use]
pub fn is_internal(name: &str) -> bool {
    name.starts_with(INTERNAL_PREFIX)
}

/// Identity of a clock node. Core and module clocks share one id space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClkId(pub u32);

/// Identity of a reset line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResetId(pub u32);

/// Identity of a bus-stop group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BusStopId(pub u32);

impl std::fmt::Display for ClkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "clk#{}", self.0)
    }
}

impl std::fmt::Display for ResetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "rst#{}", self.0)
    }
}

impl std::fmt::Display for BusStopId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "mstop#{}", self.0)
    }
}

/// A single bit in a 32-bit register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BitRef {
    /// Register offset from the CPG base.
    pub reg: u32,
    /// Bit position (0..32).
    pub bit: u8,
}

impl BitRef {
    /// Bit `bit` of register `reg`.
    #[must_use]
    pub const fn new(reg: u32, bit: u8) -> Self {
        Self { reg, bit }
    }

    /// Mask selecting this bit.
    #[must_use]
    pub const fn mask(&self) -> u32 {
        1 << self.bit
    }
}

/// A contiguous field in a 32-bit register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Field {
    /// Register offset from the CPG base.
    pub reg: u32,
    /// Position of the least significant bit.
    pub shift: u8,
    /// Width in bits (1..=32).
    pub width: u8,
}

impl Field {
    /// Field of `width` bits at `shift` in register `reg`.
    #[must_use]
    pub const fn new(reg: u32, shift: u8, width: u8) -> Self {
        Self { reg, shift, width }
    }

    /// Unshifted mask of the field (`width` low bits set).
    #[must_use]
    pub const fn value_mask(&self) -> u32 {
        if self.width >= 32 {
            u32::MAX
        } else {
            (1 << self.width) - 1
        }
    }

    /// Mask of the field in register position.
    #[must_use]
    pub const fn mask(&self) -> u32 {
        self.value_mask() << self.shift
    }

    /// Extract the field value from a register word.
    #[must_use]
    pub const fn extract(&self, word: u32) -> u32 {
        (word >> self.shift) & self.value_mask()
    }

    /// Replace the field in `word` with `value` (truncated to the field width).
    #[must_use]
    pub const fn insert(&self, word: u32, value: u32) -> u32 {
        (word & !self.mask()) | ((value & self.value_mask()) << self.shift)
    }
}

/// One divider table row: register field value → divisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DivEntry {
    /// Value written to the divider field.
    pub val: u32,
    /// Resulting divisor.
    pub div: u32,
}

impl DivEntry {
    /// Row mapping field value `val` to divisor `div`.
    #[must_use]
    pub const fn new(val: u32, div: u32) -> Self {
        Self { val, div }
    }
}

/// Control registers of a programmable PLL.
///
/// `clk1`: K (signed) in bits 31:16, M in bits 15:6, P in bits 5:0.
/// `clk2`: S in bits 2:0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PllRegs {
    /// Offset of the CLK1 register.
    pub clk1: u32,
    /// Offset of the CLK2 register.
    pub clk2: u32,
}

/// How a core clock derives its rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClkKind {
    /// External source. `None` means the rate is supplied by configuration.
    Input {
        /// Fixed rate in Hz, if known at build time.
        rate: Option<u64>,
    },
    /// `parent × mult / div`.
    FixedFactor {
        /// Parent clock.
        parent: ClkId,
        /// Multiplier.
        mult: u32,
        /// Divisor.
        div: u32,
    },
    /// PLL whose output is computed from its control registers.
    Pll {
        /// Reference clock.
        parent: ClkId,
        /// Control register offsets.
        regs: PllRegs,
    },
    /// Divider latched at boot; never rewritten.
    StaticDivider {
        /// Parent clock.
        parent: ClkId,
        /// Divider select field.
        field: Field,
        /// Field value → divisor.
        table: &'static [DivEntry],
    },
    /// Divider that may be reprogrammed at runtime.
    DynamicDivider {
        /// Parent clock.
        parent: ClkId,
        /// Divider select field.
        field: Field,
        /// Field value → divisor.
        table: &'static [DivEntry],
        /// Busy bit polled after a write.
        status: Option<BitRef>,
    },
    /// Selects one of an ordered set of parents; field value = parent index.
    StaticMux {
        /// Candidate parents, indexed by field value.
        parents: &'static [ClkId],
        /// Select field.
        field: Field,
        /// Busy bit polled after a write.
        status: Option<BitRef>,
    },
}

impl ClkKind {
    /// All parents this kind can draw from (empty for inputs).
    #[must_use]
    pub fn parents(&self) -> &[ClkId] {
        match self {
            Self::Input { .. } => &[],
            Self::FixedFactor { parent, .. }
            | Self::Pll { parent, .. }
            | Self::StaticDivider { parent, .. }
            | Self::DynamicDivider { parent, .. } => std::slice::from_ref(parent),
            Self::StaticMux { parents, .. } => parents,
        }
    }

    /// Short label for diagnostics.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Input { .. } => "input",
            Self::FixedFactor { .. } => "fixed",
            Self::Pll { .. } => "pll",
            Self::StaticDivider { .. } => "div",
            Self::DynamicDivider { .. } => "div-dyn",
            Self::StaticMux { .. } => "mux",
        }
    }
}

/// A core clock: any node of the tree that is not a module clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoreClk {
    /// Unique identity.
    pub id: ClkId,
    /// Display name; a leading `.` marks it internal-only.
    pub name: &'static str,
    /// Rate derivation.
    pub kind: ClkKind,
    /// Independent gate, if the node has one.
    pub gate: Option<BitRef>,
}

impl CoreClk {
    /// External input.
    #[must_use]
    pub const fn input(id: ClkId, name: &'static str, rate: Option<u64>) -> Self {
        Self { id, name, kind: ClkKind::Input { rate }, gate: None }
    }

    /// Fixed multiply/divide of `parent`.
    #[must_use]
    pub const fn fixed(id: ClkId, name: &'static str, parent: ClkId, mult: u32, div: u32) -> Self {
        Self { id, name, kind: ClkKind::FixedFactor { parent, mult, div }, gate: None }
    }

    /// Register-programmed PLL.
    #[must_use]
    pub const fn pll(id: ClkId, name: &'static str, parent: ClkId, regs: PllRegs) -> Self {
        Self { id, name, kind: ClkKind::Pll { parent, regs }, gate: None }
    }

    /// Boot-latched divider.
    #[must_use]
    pub const fn div(
        id: ClkId,
        name: &'static str,
        parent: ClkId,
        field: Field,
        table: &'static [DivEntry],
    ) -> Self {
        Self { id, name, kind: ClkKind::StaticDivider { parent, field, table }, gate: None }
    }

    /// Runtime-programmable divider.
    #[must_use]
    pub const fn div_dyn(
        id: ClkId,
        name: &'static str,
        parent: ClkId,
        field: Field,
        table: &'static [DivEntry],
        status: Option<BitRef>,
    ) -> Self {
        Self {
            id,
            name,
            kind: ClkKind::DynamicDivider { parent, field, table, status },
            gate: None,
        }
    }

    /// Parent selector.
    #[must_use]
    pub const fn mux(
        id: ClkId,
        name: &'static str,
        parents: &'static [ClkId],
        field: Field,
        status: Option<BitRef>,
    ) -> Self {
        Self { id, name, kind: ClkKind::StaticMux { parents, field, status }, gate: None }
    }

    /// Give the node an independent gate bit.
    #[must_use]
    pub const fn gated(mut self, gate: BitRef) -> Self {
        self.gate = Some(gate);
        self
    }
}

/// A gated leaf clock feeding one hardware module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModClk {
    /// Unique identity.
    pub id: ClkId,
    /// Display name.
    pub name: &'static str,
    /// Owning parent.
    pub parent: ClkId,
    /// Enable bit.
    pub on: BitRef,
    /// Monitor bit confirming the enable took effect.
    pub mon: Option<BitRef>,
    /// Reset line of the module.
    pub reset: Option<ResetId>,
    /// Bus-stop group of the module.
    pub bus_stop: Option<BusStopId>,
    /// Must never be gated once running.
    pub critical: bool,
    /// Forward rate requests to the parent.
    pub forward_rate: bool,
}

impl ModClk {
    /// Module clock with only an enable bit.
    #[must_use]
    pub const fn new(id: ClkId, name: &'static str, parent: ClkId, on: BitRef) -> Self {
        Self {
            id,
            name,
            parent,
            on,
            mon: None,
            reset: None,
            bus_stop: None,
            critical: false,
            forward_rate: false,
        }
    }

    /// Attach a monitor bit.
    #[must_use]
    pub const fn monitor(mut self, mon: BitRef) -> Self {
        self.mon = Some(mon);
        self
    }

    /// Attach a reset line.
    #[must_use]
    pub const fn reset(mut self, reset: ResetId) -> Self {
        self.reset = Some(reset);
        self
    }

    /// Attach a bus-stop group.
    #[must_use]
    pub const fn bus_stop(mut self, group: BusStopId) -> Self {
        self.bus_stop = Some(group);
        self
    }

    /// Mark as critical.
    #[must_use]
    pub const fn critical(mut self) -> Self {
        self.critical = true;
        self
    }

    /// Forward `set_rate` / `round_rate` to the parent.
    #[must_use]
    pub const fn forward_rate(mut self) -> Self {
        self.forward_rate = true;
        self
    }
}

/// A reset line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResetDesc {
    /// Unique identity.
    pub id: ResetId,
    /// Display name.
    pub name: &'static str,
    /// Release bit (1 = deasserted).
    pub bit: BitRef,
    /// Monitor bit (1 = still in reset).
    pub mon: Option<BitRef>,
    /// Module clocks that must run before release.
    pub dependents: &'static [ClkId],
}

/// A group of module clocks sharing one bus-stop bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusStopDesc {
    /// Unique identity.
    pub id: BusStopId,
    /// Display name.
    pub name: &'static str,
    /// Stop bit (1 = parked).
    pub bit: BitRef,
    /// Member module clocks.
    pub members: &'static [ClkId],
}

/// Complete, immutable description of a CPG instance.
#[derive(Debug, Clone, Copy)]
pub struct Descriptor {
    /// Platform name.
    pub name: &'static str,
    /// Core clocks in dependency order.
    pub core: &'static [CoreClk],
    /// Module clocks; parents are core clocks or earlier module clocks.
    pub modules: &'static [ModClk],
    /// Reset lines.
    pub resets: &'static [ResetDesc],
    /// Bus-stop groups.
    pub bus_stops: &'static [BusStopDesc],
    /// Ids `0..last_exported` are visible to consumers.
    pub last_exported: u32,
    /// Size of the register window in bytes.
    pub window_size: usize,
}

impl Descriptor {
    /// Total number of clock nodes.
    #[must_use]
    pub const fn node_count(&self) -> usize {
        self.core.len() + self.modules.len()
    }

    /// True if `id` lies in the exported range.
    #[must_use]
    pub const fn is_exported(&self, id: ClkId) -> bool {
        id.0 < self.last_exported
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_extract_and_insert() {
        let f = Field::new(0x200, 8, 3);
        assert_eq!(f.mask(), 0x700);
        assert_eq!(f.extract(0xdead_05ff), 0x5);
        assert_eq!(f.insert(0xffff_ffff, 0x2), 0xffff_faff);
        // values wider than the field are truncated
        assert_eq!(f.insert(0, 0xf), 0x700);
    }

    #[test]
    fn full_width_field() {
        let f = Field::new(0, 0, 32);
        assert_eq!(f.mask(), u32::MAX);
        assert_eq!(f.extract(0x1234_5678), 0x1234_5678);
    }

    #[test]
    fn internal_names() {
        assert!(is_internal(".pll1"));
        assert!(!is_internal("I"));
    }

    #[test]
    fn mux_parents_listed() {
        const P: &[ClkId] = &[ClkId(1), ClkId(2)];
        let m = CoreClk::mux(ClkId(3), "m", P, Field::new(0, 0, 1), None);
        assert_eq!(m.kind.parents(), P);
        assert!(CoreClk::input(ClkId(0), "x", None).kind.parents().is_empty());
    }
}

//! Node registry
//!
//! Turns a `'static` [`Descriptor`] into an arena of [`Node`]s addressed by
//! index. Parent references must point at nodes defined earlier in the table,
//! so the arena is acyclic by construction and a node's parents always have
//! lower indices.
//!
//! Validation happens once, here. Everything downstream assumes the graph is
//! consistent and indexes the arena directly.

use crate::busstop::BusStop;
use crate::error::DescriptorError;
use crate::mmio::RegisterPort;
use crate::reset::{ResetLine, ResetState};
use cpg_soc::desc::is_internal;
use cpg_soc::{BitRef, BusStopId, ClkId, ClkKind, Descriptor, DivEntry, Field, PllRegs, ResetId};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Arena index of a clock node.
pub(crate) type NodeIdx = usize;

/// Gate progress of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    /// Not supplied; gate bit clear
    Off,
    /// Gate bit written, monitor has not confirmed yet
    Pending,
    /// Running
    On,
}

/// Rate derivation with parents resolved to arena indices.
#[derive(Debug, Clone)]
pub(crate) enum NodeKind {
    Input {
        rate: Option<u64>,
    },
    FixedFactor {
        parent: NodeIdx,
        mult: u32,
        div: u32,
    },
    Pll {
        parent: NodeIdx,
        regs: PllRegs,
    },
    StaticDivider {
        parent: NodeIdx,
        field: Field,
        table: &'static [DivEntry],
    },
    DynamicDivider {
        parent: NodeIdx,
        field: Field,
        table: &'static [DivEntry],
        status: Option<BitRef>,
    },
    StaticMux {
        parents: Vec<NodeIdx>,
        field: Field,
        status: Option<BitRef>,
    },
    Module {
        parent: NodeIdx,
        forward_rate: bool,
    },
}

impl NodeKind {
    pub(crate) const fn label(&self) -> &'static str {
        match self {
            Self::Input { .. } => "input",
            Self::FixedFactor { .. } => "fixed",
            Self::Pll { .. } => "pll",
            Self::StaticDivider { .. } => "div",
            Self::DynamicDivider { .. } => "div-dyn",
            Self::StaticMux { .. } => "mux",
            Self::Module { .. } => "module",
        }
    }
}

/// One clock node and its runtime state.
#[derive(Debug, Clone)]
pub(crate) struct Node {
    pub(crate) id: ClkId,
    pub(crate) name: &'static str,
    pub(crate) kind: NodeKind,
    pub(crate) gate: Option<BitRef>,
    pub(crate) monitor: Option<BitRef>,
    pub(crate) critical: bool,
    /// Bus-stop groups listing this node
    pub(crate) bus_stops: Vec<usize>,
    /// Divider/mux field value currently in force
    pub(crate) latched: u32,
    /// Last field write timed out; hardware may not hold `latched`
    pub(crate) unconfirmed: bool,
    pub(crate) refcount: u32,
    pub(crate) state: GateState,
    /// Parent this node holds a reference on while not `Off`
    pub(crate) holds_parent: Option<NodeIdx>,
    /// Mux parent kept running because an unconfirmed write may have selected it
    pub(crate) stray_parent: Option<NodeIdx>,
}

impl Node {
    fn new(id: ClkId, name: &'static str, kind: NodeKind) -> Self {
        Self {
            id,
            name,
            kind,
            gate: None,
            monitor: None,
            critical: false,
            bus_stops: Vec::new(),
            latched: 0,
            unconfirmed: false,
            refcount: 0,
            state: GateState::Off,
            holds_parent: None,
            stray_parent: None,
        }
    }

    pub(crate) const fn is_module(&self) -> bool {
        matches!(self.kind, NodeKind::Module { .. })
    }
}

/// Validated clock graph plus reset lines and bus-stop groups.
#[derive(Debug)]
pub struct Graph {
    pub(crate) name: &'static str,
    pub(crate) nodes: Vec<Node>,
    pub(crate) by_id: HashMap<ClkId, NodeIdx>,
    pub(crate) resets: Vec<ResetLine>,
    pub(crate) reset_by_id: HashMap<ResetId, usize>,
    pub(crate) bus_stops: Vec<BusStop>,
    pub(crate) bus_by_id: HashMap<BusStopId, usize>,
    pub(crate) last_exported: u32,
}

/// Build and validate the graph for `desc`.
///
/// # Errors
///
/// Returns the first [`DescriptorError`] found; no partial graph is returned.
pub fn build(desc: &Descriptor) -> Result<Graph, DescriptorError> {
    let mut graph = Graph {
        name: desc.name,
        nodes: Vec::with_capacity(desc.node_count()),
        by_id: HashMap::with_capacity(desc.node_count()),
        resets: Vec::with_capacity(desc.resets.len()),
        reset_by_id: HashMap::new(),
        bus_stops: Vec::with_capacity(desc.bus_stops.len()),
        bus_by_id: HashMap::new(),
        last_exported: desc.last_exported,
    };

    for c in desc.core {
        graph.check_identity(desc, c.id, c.name)?;
        if let Some(gate) = c.gate {
            check_bit(c.name, gate)?;
        }
        let kind = graph.resolve_kind(c.name, &c.kind)?;
        let mut node = Node::new(c.id, c.name, kind);
        node.gate = c.gate;
        graph.push(node);
    }

    for m in desc.modules {
        graph.check_identity(desc, m.id, m.name)?;
        check_bit(m.name, m.on)?;
        if let Some(mon) = m.mon {
            check_bit(m.name, mon)?;
        }
        let parent = graph.resolve(m.name, m.parent)?;
        let mut node = Node::new(
            m.id,
            m.name,
            NodeKind::Module {
                parent,
                forward_rate: m.forward_rate,
            },
        );
        node.gate = Some(m.on);
        node.monitor = m.mon;
        node.critical = m.critical;
        graph.push(node);
    }

    for r in desc.resets {
        if graph.reset_by_id.insert(r.id, graph.resets.len()).is_some() {
            return Err(DescriptorError::DuplicateReset { id: r.id });
        }
        check_bit(r.name, r.bit)?;
        if let Some(mon) = r.mon {
            check_bit(r.name, mon)?;
        }
        let dependents = r
            .dependents
            .iter()
            .map(|&id| graph.module(r.name, id))
            .collect::<Result<Vec<_>, _>>()?;
        graph.resets.push(ResetLine::new(r.id, r.name, r.bit, r.mon, dependents));
    }

    for g in desc.bus_stops {
        if graph.bus_by_id.insert(g.id, graph.bus_stops.len()).is_some() {
            return Err(DescriptorError::DuplicateBusStop { id: g.id });
        }
        check_bit(g.name, g.bit)?;
        let members = g
            .members
            .iter()
            .map(|&id| graph.module(g.name, id))
            .collect::<Result<Vec<_>, _>>()?;
        let group = graph.bus_stops.len();
        for &m in &members {
            graph.nodes[m].bus_stops.push(group);
        }
        graph.bus_stops.push(BusStop::new(g.id, g.name, g.bit, members));
    }

    for m in desc.modules {
        let idx = graph.by_id[&m.id];
        if let Some(reset) = m.reset {
            let listed = graph
                .reset_by_id
                .get(&reset)
                .is_some_and(|&r| graph.resets[r].dependents.contains(&idx));
            if !listed {
                return Err(DescriptorError::MissingReset { node: m.name, reset });
            }
        }
        if let Some(group) = m.bus_stop {
            let listed = graph
                .bus_by_id
                .get(&group)
                .is_some_and(|&g| graph.bus_stops[g].members.contains(&idx));
            if !listed {
                return Err(DescriptorError::MissingBusStop { node: m.name, group });
            }
        }
    }

    debug!(
        "Built {}: {} nodes, {} resets, {} bus-stop groups",
        graph.name,
        graph.nodes.len(),
        graph.resets.len(),
        graph.bus_stops.len()
    );
    Ok(graph)
}

impl Graph {
    /// Platform name.
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Number of clock nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True if the graph holds no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Arena index of `id`, exported or not.
    pub(crate) fn index_of(&self, id: ClkId) -> Option<NodeIdx> {
        self.by_id.get(&id).copied()
    }

    /// Parent the node currently draws from.
    ///
    /// `None` for inputs, and for a mux whose latched selection has no parent.
    pub(crate) fn active_parent(&self, idx: NodeIdx) -> Option<NodeIdx> {
        let node = &self.nodes[idx];
        match &node.kind {
            NodeKind::Input { .. } => None,
            NodeKind::FixedFactor { parent, .. }
            | NodeKind::Pll { parent, .. }
            | NodeKind::StaticDivider { parent, .. }
            | NodeKind::DynamicDivider { parent, .. }
            | NodeKind::Module { parent, .. } => Some(*parent),
            NodeKind::StaticMux { parents, .. } => {
                usize::try_from(node.latched).ok().and_then(|i| parents.get(i).copied())
            }
        }
    }

    /// Give inputs declared without a rate the rate from configuration.
    pub(crate) fn apply_input_rates(&mut self, lookup: impl Fn(&str) -> Option<u64>) {
        for node in &mut self.nodes {
            if let NodeKind::Input { rate } = &mut node.kind {
                if rate.is_none() {
                    *rate = lookup(node.name);
                    if rate.is_none() {
                        warn!("Input {} has no known rate, reporting 0 Hz", node.name);
                    }
                }
            }
        }
    }

    /// Load latched field values, reset line and bus-stop state from hardware.
    pub(crate) fn sync_from_hardware<P: RegisterPort + ?Sized>(&mut self, port: &P) {
        for node in &mut self.nodes {
            match &node.kind {
                NodeKind::StaticDivider { field, .. }
                | NodeKind::DynamicDivider { field, .. }
                | NodeKind::StaticMux { field, .. } => {
                    node.latched = port.read_field(*field);
                    debug!("{}: latched {:#x}", node.name, node.latched);
                }
                _ => {}
            }
        }
        for line in &mut self.resets {
            if port.read_bit(line.bit) {
                line.state = ResetState::Ready;
                debug!("{}: released at boot", line.name);
            }
        }
        for group in &mut self.bus_stops {
            group.stopped = port.read_bit(group.bit);
        }
    }

    fn push(&mut self, node: Node) {
        self.by_id.insert(node.id, self.nodes.len());
        self.nodes.push(node);
    }

    fn check_identity(
        &self,
        desc: &Descriptor,
        id: ClkId,
        name: &'static str,
    ) -> Result<(), DescriptorError> {
        if self.by_id.contains_key(&id) {
            return Err(DescriptorError::DuplicateId { id });
        }
        if is_internal(name) && desc.is_exported(id) {
            return Err(DescriptorError::ExportBoundary { node: name, id });
        }
        Ok(())
    }

    fn resolve(&self, node: &'static str, parent: ClkId) -> Result<NodeIdx, DescriptorError> {
        self.index_of(parent)
            .ok_or(DescriptorError::UndefinedParent { node, parent })
    }

    fn module(&self, owner: &'static str, id: ClkId) -> Result<NodeIdx, DescriptorError> {
        self.index_of(id)
            .filter(|&i| self.nodes[i].is_module())
            .ok_or(DescriptorError::NotAModule { owner, id })
    }

    fn resolve_kind(&self, name: &'static str, kind: &ClkKind) -> Result<NodeKind, DescriptorError> {
        Ok(match *kind {
            ClkKind::Input { rate } => NodeKind::Input { rate },
            ClkKind::FixedFactor { parent, mult, div } => {
                if mult == 0 || div == 0 {
                    return Err(DescriptorError::ZeroFactor { node: name });
                }
                NodeKind::FixedFactor {
                    parent: self.resolve(name, parent)?,
                    mult,
                    div,
                }
            }
            ClkKind::Pll { parent, regs } => NodeKind::Pll {
                parent: self.resolve(name, parent)?,
                regs,
            },
            ClkKind::StaticDivider { parent, field, table } => {
                check_field(name, field)?;
                check_table(name, field, table)?;
                NodeKind::StaticDivider {
                    parent: self.resolve(name, parent)?,
                    field,
                    table,
                }
            }
            ClkKind::DynamicDivider {
                parent,
                field,
                table,
                status,
            } => {
                check_field(name, field)?;
                check_status(name, status)?;
                check_table(name, field, table)?;
                NodeKind::DynamicDivider {
                    parent: self.resolve(name, parent)?,
                    field,
                    table,
                    status,
                }
            }
            ClkKind::StaticMux {
                parents,
                field,
                status,
            } => {
                check_field(name, field)?;
                check_status(name, status)?;
                if parents.is_empty() {
                    return Err(DescriptorError::MalformedMux {
                        node: name,
                        reason: "no parents",
                    });
                }
                if u64::try_from(parents.len()).unwrap_or(u64::MAX) > u64::from(field.value_mask()) + 1 {
                    return Err(DescriptorError::MalformedMux {
                        node: name,
                        reason: "more parents than select values",
                    });
                }
                NodeKind::StaticMux {
                    parents: parents
                        .iter()
                        .map(|&p| self.resolve(name, p))
                        .collect::<Result<_, _>>()?,
                    field,
                    status,
                }
            }
        })
    }
}

fn check_bit(owner: &'static str, bit: BitRef) -> Result<(), DescriptorError> {
    if bit.bit >= 32 {
        return Err(DescriptorError::BitOutOfRange {
            owner,
            reg: bit.reg,
            reason: "bit position above 31",
        });
    }
    Ok(())
}

fn check_status(owner: &'static str, status: Option<BitRef>) -> Result<(), DescriptorError> {
    status.map_or(Ok(()), |bit| check_bit(owner, bit))
}

fn check_field(owner: &'static str, field: Field) -> Result<(), DescriptorError> {
    let reason = if field.width == 0 {
        "zero-width field"
    } else if u32::from(field.shift) + u32::from(field.width) > 32 {
        "field extends past bit 31"
    } else {
        return Ok(());
    };
    Err(DescriptorError::BitOutOfRange {
        owner,
        reg: field.reg,
        reason,
    })
}

fn check_table(node: &'static str, field: Field, table: &[DivEntry]) -> Result<(), DescriptorError> {
    let malformed = |reason| Err(DescriptorError::MalformedTable { node, reason });
    if table.is_empty() {
        return malformed("empty");
    }
    if table.iter().any(|e| e.div == 0) {
        return malformed("zero divisor");
    }
    if table.iter().any(|e| e.val > field.value_mask()) {
        return malformed("value wider than field");
    }
    for pair in table.windows(2) {
        if pair[1].val <= pair[0].val {
            return malformed("field values not strictly increasing");
        }
        if pair[1].div <= pair[0].div {
            return malformed("divisors not strictly increasing");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cpg_soc::reference::{clk, rst, REFERENCE};
    use cpg_soc::{CoreClk, ModClk, ResetDesc};

    const OSC: ClkId = ClkId(10);

    fn desc(core: &'static [CoreClk], modules: &'static [ModClk]) -> Descriptor {
        Descriptor {
            name: "t",
            core,
            modules,
            resets: &[],
            bus_stops: &[],
            last_exported: 10,
            window_size: 0x1000,
        }
    }

    #[test]
    fn reference_builds() {
        let g = build(&REFERENCE).expect("reference descriptor");
        assert_eq!(g.len(), REFERENCE.node_count());
        let lcdc_a = g.index_of(clk::LCDC_CLK_A).expect("lcdc_a");
        // listed by both the LCDC master and the shared video register slice
        assert_eq!(g.nodes[lcdc_a].bus_stops.len(), 2);
        let gpu = g.reset_by_id[&rst::GPU_RESETN];
        assert_eq!(g.resets[gpu].dependents.len(), 2);
    }

    #[test]
    fn parents_precede_children() {
        let g = build(&REFERENCE).expect("reference descriptor");
        for idx in 0..g.len() {
            if let Some(p) = g.active_parent(idx) {
                assert!(p < idx, "{}", g.nodes[idx].name);
            }
        }
    }

    #[test]
    fn duplicate_id() {
        static CORE: &[CoreClk] = &[
            CoreClk::input(OSC, ".osc", Some(1)),
            CoreClk::fixed(OSC, ".dup", OSC, 1, 1),
        ];
        assert_eq!(build(&desc(CORE, &[])).unwrap_err(), DescriptorError::DuplicateId { id: OSC });
    }

    #[test]
    fn forward_parent_reference() {
        static CORE: &[CoreClk] = &[
            CoreClk::fixed(ClkId(0), "A", ClkId(11), 1, 1),
            CoreClk::input(ClkId(11), ".later", Some(1)),
        ];
        assert_eq!(
            build(&desc(CORE, &[])).unwrap_err(),
            DescriptorError::UndefinedParent { node: "A", parent: ClkId(11) }
        );
    }

    #[test]
    fn malformed_tables() {
        static UNSORTED: &[DivEntry] = &[DivEntry::new(1, 2), DivEntry::new(0, 1)];
        static ZERO: &[DivEntry] = &[DivEntry::new(0, 0)];
        static WIDE: &[DivEntry] = &[DivEntry::new(0, 1), DivEntry::new(4, 2)];
        static SHRINKING: &[DivEntry] = &[DivEntry::new(0, 4), DivEntry::new(1, 2)];
        let f = Field::new(0x200, 0, 2);
        for (table, reason) in [
            (&[][..], "empty"),
            (UNSORTED, "field values not strictly increasing"),
            (ZERO, "zero divisor"),
            (WIDE, "value wider than field"),
            (SHRINKING, "divisors not strictly increasing"),
        ] {
            assert_eq!(
                check_table("D", f, table),
                Err(DescriptorError::MalformedTable { node: "D", reason })
            );
        }
    }

    #[test]
    fn empty_mux() {
        static CORE: &[CoreClk] = &[CoreClk::mux(ClkId(0), "M", &[], Field::new(0, 0, 1), None)];
        assert!(matches!(
            build(&desc(CORE, &[])),
            Err(DescriptorError::MalformedMux { node: "M", .. })
        ));
    }

    #[test]
    fn bits_outside_register() {
        static T: &[DivEntry] = &[DivEntry::new(0, 1), DivEntry::new(1, 2)];
        static WIDE_FIELD: &[CoreClk] = &[
            CoreClk::input(OSC, ".osc", Some(1)),
            CoreClk::div_dyn(ClkId(0), "D", OSC, Field::new(0x200, 30, 4), T, None),
        ];
        assert_eq!(
            build(&desc(WIDE_FIELD, &[])).unwrap_err(),
            DescriptorError::BitOutOfRange { owner: "D", reg: 0x200, reason: "field extends past bit 31" }
        );

        static BUSY_BIT: &[CoreClk] = &[
            CoreClk::input(OSC, ".osc", Some(1)),
            CoreClk::div_dyn(ClkId(0), "D", OSC, Field::new(0x200, 0, 2), T, Some(BitRef::new(0x280, 40))),
        ];
        assert!(matches!(
            build(&desc(BUSY_BIT, &[])),
            Err(DescriptorError::BitOutOfRange { owner: "D", reg: 0x280, .. })
        ));

        static CORE: &[CoreClk] = &[CoreClk::input(OSC, ".osc", Some(1))];
        static MODULES: &[ModClk] = &[ModClk::new(ClkId(0), "m", OSC, BitRef::new(0x500, 32))];
        assert_eq!(
            build(&desc(CORE, MODULES)).unwrap_err(),
            DescriptorError::BitOutOfRange { owner: "m", reg: 0x500, reason: "bit position above 31" }
        );
    }

    #[test]
    fn internal_name_in_exported_range() {
        static CORE: &[CoreClk] = &[CoreClk::input(ClkId(3), ".osc", Some(1))];
        assert_eq!(
            build(&desc(CORE, &[])).unwrap_err(),
            DescriptorError::ExportBoundary { node: ".osc", id: ClkId(3) }
        );
    }

    #[test]
    fn reset_dependent_must_be_module() {
        static CORE: &[CoreClk] = &[CoreClk::input(OSC, ".osc", Some(1))];
        static RESETS: &[ResetDesc] = &[ResetDesc {
            id: ResetId(0),
            name: "r",
            bit: BitRef::new(0x800, 0),
            mon: None,
            dependents: &[OSC],
        }];
        let mut d = desc(CORE, &[]);
        d.resets = RESETS;
        assert_eq!(build(&d).unwrap_err(), DescriptorError::NotAModule { owner: "r", id: OSC });
    }

    #[test]
    fn module_reset_must_list_it() {
        static CORE: &[CoreClk] = &[CoreClk::input(OSC, ".osc", Some(1))];
        static MODS: &[ModClk] =
            &[ModClk::new(ClkId(0), "m", OSC, BitRef::new(0x500, 0)).reset(ResetId(4))];
        assert_eq!(
            build(&desc(CORE, MODS)).unwrap_err(),
            DescriptorError::MissingReset { node: "m", reset: ResetId(4) }
        );
    }

    #[test]
    fn sync_latches_fields_and_released_resets() {
        use crate::sim::SimulatedPort;
        use cpg_soc::regs;

        let mut g = build(&REFERENCE).expect("reference descriptor");
        let port = SimulatedPort::for_descriptor(&REFERENCE)
            .with_state(&[(regs::PL3A_DDIV, 0x0300), (regs::rst(regs::CLK_ON_I2C), 1)]);
        g.sync_from_hardware(&port);

        let zt = g.index_of(clk::ZT).expect("ZT");
        assert_eq!(g.nodes[zt].latched, 3);
        let i2c = g.reset_by_id[&rst::I2C0_MRST];
        assert_eq!(g.resets[i2c].state, ResetState::Ready);
        let gpu = g.reset_by_id[&rst::GPU_RESETN];
        assert_eq!(g.resets[gpu].state, ResetState::Asserted);
    }
}

//! Bus-stop coordinator
//!
//! A bus-stop bit parks a module's bus interface. One bit can cover several
//! module clocks, and a module clock can belong to more than one group, so
//! each group counts its inactive members and only parks once all of them
//! are down.

use crate::mmio::RegisterPort;
use crate::registry::{GateState, Graph, NodeIdx};
use cpg_soc::{BitRef, BusStopId};
use tracing::debug;

/// One bus-stop group.
#[derive(Debug, Clone)]
pub(crate) struct BusStop {
    pub(crate) id: BusStopId,
    pub(crate) name: &'static str,
    pub(crate) bit: BitRef,
    pub(crate) members: Vec<NodeIdx>,
    /// Members not currently running
    pub(crate) parked: usize,
    /// Stop bit as last written or read
    pub(crate) stopped: bool,
}

impl BusStop {
    pub(crate) fn new(id: BusStopId, name: &'static str, bit: BitRef, members: Vec<NodeIdx>) -> Self {
        Self {
            id,
            name,
            bit,
            parked: members.len(),
            members,
            stopped: false,
        }
    }
}

impl Graph {
    /// `idx` just reached `On`: release every group it belongs to.
    pub(crate) fn member_active<P: RegisterPort + ?Sized>(&mut self, port: &mut P, idx: NodeIdx) {
        for i in 0..self.nodes[idx].bus_stops.len() {
            let group = &mut self.bus_stops[self.nodes[idx].bus_stops[i]];
            group.parked = group.parked.saturating_sub(1);
            if group.stopped {
                port.write_bit(group.bit, false);
                group.stopped = false;
                debug!("{} ({}): released by {}", group.name, group.id, self.nodes[idx].name);
            }
        }
    }

    /// `idx` is about to leave `On`: park groups with no other running member.
    pub(crate) fn member_inactive<P: RegisterPort + ?Sized>(&mut self, port: &mut P, idx: NodeIdx) {
        for i in 0..self.nodes[idx].bus_stops.len() {
            let g = self.nodes[idx].bus_stops[i];
            let group = &mut self.bus_stops[g];
            group.parked = (group.parked + 1).min(group.members.len());
            if group.parked < group.members.len() || group.stopped {
                continue;
            }
            let busy = group
                .members
                .iter()
                .any(|&m| m != idx && self.nodes[m].state != GateState::Off);
            if busy {
                debug!("{}: member still running, not parking", group.name);
                continue;
            }
            port.write_bit(group.bit, true);
            group.stopped = true;
            debug!("{} ({}): parked after {}", group.name, group.id, self.nodes[idx].name);
        }
    }

    /// Parked state of a group as last written or read.
    pub(crate) fn bus_stopped(&self, group: usize) -> bool {
        self.bus_stops[group].stopped
    }
}

#[cfg(test)]
mod tests {
    use crate::config::CpgConfig;
    use crate::mmio::RegisterPort;
    use crate::registry::{build, Graph};
    use crate::sim::SimulatedPort;
    use cpg_soc::reference::{bus, clk, REFERENCE};
    use cpg_soc::ClkId;

    struct Fixture {
        g: Graph,
        port: SimulatedPort,
        cfg: CpgConfig,
    }

    impl Fixture {
        fn new() -> Self {
            let port = SimulatedPort::for_descriptor(&REFERENCE);
            let mut g = build(&REFERENCE).expect("reference descriptor");
            g.sync_from_hardware(&port);
            Self { g, port, cfg: CpgConfig::immediate(3) }
        }

        fn enable(&mut self, id: ClkId) {
            let idx = self.g.index_of(id).expect("clock");
            self.g.enable(&mut self.port, &self.cfg, idx).expect("enable");
        }

        fn disable(&mut self, id: ClkId) {
            let idx = self.g.index_of(id).expect("clock");
            self.g.disable(&mut self.port, idx).expect("disable");
        }

        fn parked(&self, id: cpg_soc::BusStopId) -> bool {
            let g = self.g.bus_by_id[&id];
            let stopped = self.g.bus_stopped(g);
            assert_eq!(stopped, self.port.read_bit(self.g.bus_stops[g].bit));
            stopped
        }
    }

    #[test]
    fn parks_only_when_every_member_is_down() {
        let mut f = Fixture::new();
        f.enable(clk::GPU_CLK);
        f.enable(clk::GPU_AXI_CLK);
        f.disable(clk::GPU_CLK);
        assert!(!f.parked(bus::GPU));
        f.disable(clk::GPU_AXI_CLK);
        assert!(f.parked(bus::GPU));

        f.enable(clk::GPU_AXI_CLK);
        assert!(!f.parked(bus::GPU));
    }

    #[test]
    fn overlapping_groups() {
        let mut f = Fixture::new();
        f.enable(clk::LCDC_CLK_A);
        f.enable(clk::DSI_ACLK);

        f.disable(clk::LCDC_CLK_A);
        assert!(f.parked(bus::LCDC));
        assert!(!f.parked(bus::VIDEO), "dsi_aclk still uses the video slice");

        f.disable(clk::DSI_ACLK);
        assert!(f.parked(bus::VIDEO));
    }

    #[test]
    fn pending_member_blocks_parking() {
        let mut f = Fixture::new();
        let imclk = f.g.index_of(clk::SDHI0_IMCLK).expect("imclk");
        let mon = f.g.nodes[imclk].monitor.expect("monitor");

        f.enable(clk::SDHI0_ACLK);
        f.port.stick(mon, false);
        assert!(f.g.enable(&mut f.port, &f.cfg, imclk).is_err());

        f.disable(clk::SDHI0_ACLK);
        assert!(!f.parked(bus::SDHI0));
    }
}

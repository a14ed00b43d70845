//! Gate and refcount engine
//!
//! Each node counts its consumers. A node that is not `Off` holds exactly one
//! reference on its active parent, so a parent's count is the number of
//! distinct children drawing from it plus any direct consumers.
//!
//! ```text
//! enable:  refcount += 1 → parent chain up → gate bit → monitor → bus unpark
//! disable: refcount -= 1 → (at 0) bus park → gate bit clear → parent ref dropped
//! ```
//!
//! A monitor timeout leaves the node `Pending` with its refcount and parent
//! reference intact. The next `enable` re-polls instead of rewriting the bit.

use crate::config::CpgConfig;
use crate::error::{CpgError, Result};
use crate::mmio::RegisterPort;
use crate::poll::wait_for_bit;
use crate::registry::{GateState, Graph, NodeIdx, NodeKind};
use tracing::{debug, info, warn};

impl Graph {
    /// Take a reference on `idx`, powering it (and its parents) up if needed.
    pub(crate) fn enable<P: RegisterPort + ?Sized>(
        &mut self,
        port: &mut P,
        cfg: &CpgConfig,
        idx: NodeIdx,
    ) -> Result<()> {
        let node = &mut self.nodes[idx];
        node.refcount += 1;
        debug!("{}: enable, refcount {}", node.name, node.refcount);
        self.power_up(port, cfg, idx)
    }

    /// Drop a reference on `idx`, powering it down when the last one goes.
    pub(crate) fn disable<P: RegisterPort + ?Sized>(
        &mut self,
        port: &mut P,
        idx: NodeIdx,
    ) -> Result<()> {
        let node = &mut self.nodes[idx];
        match node.refcount {
            0 => {
                warn!("{}: disable without matching enable", node.name);
                return Err(CpgError::RefcountUnderflow { clock: node.name });
            }
            1 if node.critical => {
                info!("{}: critical clock stays on", node.name);
                return Ok(());
            }
            _ => {}
        }
        node.refcount -= 1;
        debug!("{}: disable, refcount {}", node.name, node.refcount);
        if node.refcount == 0 {
            self.power_down(port, idx)?;
        }
        Ok(())
    }

    /// True once the node's gate (if any) is confirmed running.
    pub(crate) fn is_enabled(&self, idx: NodeIdx) -> bool {
        self.nodes[idx].state == GateState::On
    }

    /// Bring a node with a non-zero refcount to `On`.
    pub(crate) fn power_up<P: RegisterPort + ?Sized>(
        &mut self,
        port: &mut P,
        cfg: &CpgConfig,
        idx: NodeIdx,
    ) -> Result<()> {
        if self.nodes[idx].state == GateState::On {
            return Ok(());
        }

        match self.nodes[idx].holds_parent {
            Some(parent) => self.power_up(port, cfg, parent)?,
            None => {
                if let Some(parent) = self.active_parent(idx) {
                    self.nodes[idx].holds_parent = Some(parent);
                    self.enable(port, cfg, parent)?;
                } else if !matches!(self.nodes[idx].kind, NodeKind::Input { .. }) {
                    let node = &self.nodes[idx];
                    return Err(CpgError::invalid_divisor(node.name, node.latched));
                }
            }
        }

        let node = &mut self.nodes[idx];
        if let Some(gate) = node.gate {
            if node.state == GateState::Off {
                if port.read_bit(gate) {
                    debug!("{}: gate {:#x}.{} already set", node.name, gate.reg, gate.bit);
                } else {
                    port.write_bit(gate, true);
                    debug!("{}: gate {:#x}.{} set", node.name, gate.reg, gate.bit);
                }
                node.state = GateState::Pending;
            }
            if let Some(mon) = node.monitor {
                match wait_for_bit(&*port, mon, true, &cfg.clock_monitor) {
                    Ok(polls) => debug!("{}: running after {polls} polls", node.name),
                    Err(polls) => {
                        warn!("{}: monitor not set after {polls} polls", node.name);
                        return Err(CpgError::hardware_timeout(node.name, polls));
                    }
                }
            }
        }
        node.state = GateState::On;
        self.member_active(port, idx);
        Ok(())
    }

    fn power_down<P: RegisterPort + ?Sized>(&mut self, port: &mut P, idx: NodeIdx) -> Result<()> {
        if self.nodes[idx].state == GateState::On {
            self.member_inactive(port, idx);
        }

        let node = &mut self.nodes[idx];
        if let Some(gate) = node.gate {
            if node.state != GateState::Off {
                port.write_bit(gate, false);
                debug!("{}: gate {:#x}.{} cleared", node.name, gate.reg, gate.bit);
            }
        }
        node.state = GateState::Off;

        if let Some(parent) = node.holds_parent.take() {
            self.disable(port, parent)?;
        }
        self.release_stray_parent(port, idx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::build;
    use crate::sim::SimulatedPort;
    use cpg_soc::reference::{clk, REFERENCE};
    use cpg_soc::BitRef;

    fn setup() -> (Graph, SimulatedPort, CpgConfig) {
        let port = SimulatedPort::for_descriptor(&REFERENCE);
        let mut graph = build(&REFERENCE).expect("reference descriptor");
        graph.sync_from_hardware(&port);
        (graph, port, CpgConfig::immediate(3))
    }

    #[test]
    fn refcounts_propagate_to_parents() {
        let (mut g, mut port, cfg) = setup();
        let ostm = g.index_of(clk::OSTM0_PCLK).expect("ostm");
        let p0 = g.index_of(clk::P0).expect("P0");

        g.enable(&mut port, &cfg, ostm).expect("enable");
        g.enable(&mut port, &cfg, ostm).expect("enable again");
        assert_eq!(g.nodes[ostm].refcount, 2);
        assert_eq!(g.nodes[p0].refcount, 1);
        assert!(g.is_enabled(p0));

        g.disable(&mut port, ostm).expect("disable");
        assert!(g.is_enabled(ostm));
        g.disable(&mut port, ostm).expect("disable again");
        assert!(!g.is_enabled(ostm));
        assert_eq!(g.nodes[p0].refcount, 0);
        assert!(!g.is_enabled(p0));
    }

    #[test]
    fn underflow() {
        let (mut g, mut port, _) = setup();
        let i2c = g.index_of(clk::I2C0_PCLK).expect("i2c");
        assert!(matches!(
            g.disable(&mut port, i2c),
            Err(CpgError::RefcountUnderflow { clock: "i2c0_pclk" })
        ));
    }

    #[test]
    fn monitor_timeout_is_retry_safe() {
        let (mut g, mut port, cfg) = setup();
        let scif = g.index_of(clk::SCIF0_CLK_PCK).expect("scif");
        let mon = g.nodes[scif].monitor.expect("monitor");
        port.stick(mon, false);

        let err = g.enable(&mut port, &cfg, scif).unwrap_err();
        assert!(err.is_recoverable());
        assert_eq!(g.nodes[scif].state, GateState::Pending);
        assert_eq!(g.nodes[scif].refcount, 1);

        port.unstick(mon);
        port.clear_writes();
        g.power_up(&mut port, &cfg, scif).expect("retry");
        assert_eq!(g.nodes[scif].state, GateState::On);
        // gate bit is not rewritten on retry
        let on = g.nodes[scif].gate.expect("gate");
        assert_eq!(port.write_count(on.reg), 0);
    }

    #[test]
    fn critical_clock_keeps_its_bit() {
        let (mut g, mut port, cfg) = setup();
        let gic = g.index_of(clk::GIC_GICCLK).expect("gic");
        g.enable(&mut port, &cfg, gic).expect("enable");
        g.disable(&mut port, gic).expect("disable");
        g.disable(&mut port, gic).expect("extra disable");
        assert!(g.is_enabled(gic));
        assert!(port.read_bit(g.nodes[gic].gate.expect("gate")));
    }

    #[test]
    fn gated_core_clock() {
        let (mut g, mut port, cfg) = setup();
        let m3 = g.index_of(clk::M3).expect("M3");
        g.enable(&mut port, &cfg, m3).expect("enable");
        assert!(port.read_bit(BitRef::new(cpg_soc::regs::PL5_SDIV, 0)));
        g.disable(&mut port, m3).expect("disable");
        assert!(!port.read_bit(BitRef::new(cpg_soc::regs::PL5_SDIV, 0)));
    }
}

//! Rate engine
//!
//! Rates are computed bottom-up on every query from the latched field values
//! and, for PLLs, the live control registers. Nothing is cached.
//!
//! Only runtime dividers and muxes accept `set_rate`. Module clocks flagged
//! `forward_rate` pass the request to their parent.

use crate::config::CpgConfig;
use crate::error::{CpgError, Result};
use crate::mmio::RegisterPort;
use crate::poll::wait_for_bit;
use crate::registry::{Graph, NodeIdx, NodeKind};
use cpg_soc::regs::pll;
use cpg_soc::{BitRef, DivEntry, Field};
use tracing::{debug, warn};

/// Table row whose output is closest to `requested`, ties to the lower field value.
pub(crate) fn best_divider(parent_rate: u64, table: &[DivEntry], requested: u64) -> Option<DivEntry> {
    table
        .iter()
        .copied()
        .min_by_key(|e| ((parent_rate / u64::from(e.div)).abs_diff(requested), e.val))
}

/// `Fout = Fin × (M + K/65536) / (P × 2^S)`
///
/// # Errors
///
/// `InvalidDivisor` if P is zero.
#[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
pub(crate) fn pll_rate(name: &'static str, fin: u64, clk1: u32, clk2: u32) -> Result<u64> {
    let k = i128::from((clk1 >> pll::K_SHIFT) as u16 as i16);
    let m = i128::from((clk1 >> pll::M_SHIFT) & pll::M_MASK);
    let p = clk1 & pll::P_MASK;
    let s = clk2 & pll::S_MASK;
    if p == 0 {
        return Err(CpgError::invalid_divisor(name, clk1));
    }
    let scale = i128::from(pll::K_SCALE);
    let num = i128::from(fin) * (m * scale + k);
    let den = (i128::from(p) * scale) << s;
    Ok(u64::try_from((num / den).max(0)).unwrap_or(u64::MAX))
}

fn fixed_factor(rate: u64, mult: u32, div: u32) -> u64 {
    let out = u128::from(rate) * u128::from(mult) / u128::from(div);
    u64::try_from(out).unwrap_or(u64::MAX)
}

fn divisor(table: &[DivEntry], val: u32) -> Option<u32> {
    table.iter().find(|e| e.val == val).map(|e| e.div)
}

impl Graph {
    /// Current output rate of `idx` in Hz.
    pub(crate) fn rate<P: RegisterPort + ?Sized>(&self, port: &P, idx: NodeIdx) -> Result<u64> {
        let node = &self.nodes[idx];
        match &node.kind {
            NodeKind::Input { rate } => Ok(rate.unwrap_or(0)),
            NodeKind::FixedFactor { parent, mult, div } => {
                Ok(fixed_factor(self.rate(port, *parent)?, *mult, *div))
            }
            NodeKind::Pll { parent, regs } => {
                let fin = self.rate(port, *parent)?;
                pll_rate(node.name, fin, port.read32(regs.clk1), port.read32(regs.clk2))
            }
            NodeKind::StaticDivider { parent, table, .. }
            | NodeKind::DynamicDivider { parent, table, .. } => {
                let div = divisor(table, node.latched)
                    .ok_or_else(|| CpgError::invalid_divisor(node.name, node.latched))?;
                Ok(self.rate(port, *parent)? / u64::from(div))
            }
            NodeKind::StaticMux { .. } => {
                let parent = self
                    .active_parent(idx)
                    .ok_or_else(|| CpgError::invalid_divisor(node.name, node.latched))?;
                self.rate(port, parent)
            }
            NodeKind::Module { parent, .. } => self.rate(port, *parent),
        }
    }

    /// Rate `set_rate(idx, requested)` would produce, without touching hardware.
    pub(crate) fn round_rate<P: RegisterPort + ?Sized>(
        &self,
        port: &P,
        idx: NodeIdx,
        requested: u64,
    ) -> Result<u64> {
        match &self.nodes[idx].kind {
            NodeKind::DynamicDivider { parent, table, .. } => {
                let parent_rate = self.rate(port, *parent)?;
                Ok(best_divider(parent_rate, table, requested)
                    .map_or(parent_rate, |e| parent_rate / u64::from(e.div)))
            }
            NodeKind::StaticMux { parents, .. } => {
                let (_, rate) = self.best_parent(port, parents, requested)?;
                Ok(rate)
            }
            NodeKind::Module {
                parent,
                forward_rate: true,
            } => self.round_rate(port, *parent, requested),
            _ => self.rate(port, idx),
        }
    }

    /// Program `idx` as close to `requested` as it can get. Returns the new rate.
    pub(crate) fn set_rate<P: RegisterPort + ?Sized>(
        &mut self,
        port: &mut P,
        cfg: &CpgConfig,
        idx: NodeIdx,
        requested: u64,
    ) -> Result<u64> {
        let node = &self.nodes[idx];
        match &node.kind {
            NodeKind::DynamicDivider {
                parent,
                field,
                table,
                status,
            } => {
                let (field, status) = (*field, *status);
                let parent_rate = self.rate(&*port, *parent)?;
                let entry = best_divider(parent_rate, table, requested)
                    .ok_or_else(|| CpgError::unsupported(node.name, "set_rate"))?;
                debug!(
                    "{}: {requested} Hz requested, divisor {} (value {})",
                    node.name, entry.div, entry.val
                );
                self.program(port, cfg, idx, field, status, entry.val)?;
                Ok(parent_rate / u64::from(entry.div))
            }
            NodeKind::StaticMux {
                parents,
                field,
                status,
            } => {
                let (field, status) = (*field, *status);
                let (sel, rate) = self.best_parent(&*port, parents, requested)?;
                let new_parent = parents[sel];
                let sel = u32::try_from(sel).map_err(|_| CpgError::unsupported(node.name, "set_rate"))?;
                self.reparent(port, cfg, idx, new_parent, sel, field, status)?;
                Ok(rate)
            }
            NodeKind::Module {
                parent,
                forward_rate: true,
            } => {
                let parent = *parent;
                self.set_rate(port, cfg, parent, requested)
            }
            _ => Err(CpgError::unsupported(node.name, "set_rate")),
        }
    }

    fn best_parent<P: RegisterPort + ?Sized>(
        &self,
        port: &P,
        parents: &[NodeIdx],
        requested: u64,
    ) -> Result<(usize, u64)> {
        let mut best: Option<(usize, u64)> = None;
        for (i, &p) in parents.iter().enumerate() {
            let rate = self.rate(port, p)?;
            if best.is_none_or(|(_, r)| rate.abs_diff(requested) < r.abs_diff(requested)) {
                best = Some((i, rate));
            }
        }
        // registry rejects muxes without parents
        best.ok_or(CpgError::UnsupportedOperation {
            clock: "mux",
            op: "set_rate",
        })
    }

    /// Write a divider/mux field and wait for the busy bit to drop.
    ///
    /// The latched value only changes once the hardware confirms. A timed-out
    /// write marks the node unconfirmed, and the next request rewrites the
    /// field even if it asks for the latched value.
    fn program<P: RegisterPort + ?Sized>(
        &mut self,
        port: &mut P,
        cfg: &CpgConfig,
        idx: NodeIdx,
        field: Field,
        status: Option<BitRef>,
        val: u32,
    ) -> Result<()> {
        let node = &mut self.nodes[idx];
        if node.latched == val && !node.unconfirmed {
            debug!("{}: value {val:#x} already latched", node.name);
            return Ok(());
        }
        port.write_field(field, val);
        if let Some(busy) = status {
            if let Err(polls) = wait_for_bit(&*port, busy, false, &cfg.status) {
                node.unconfirmed = true;
                warn!("{}: update to {val:#x} still busy after {polls} polls", node.name);
                return Err(CpgError::hardware_timeout(node.name, polls));
            }
        }
        debug!("{}: latched {:#x} -> {val:#x}", node.name, node.latched);
        node.latched = val;
        node.unconfirmed = false;
        Ok(())
    }

    /// Switch a mux to `new_parent`, moving the held reference if it is running.
    ///
    /// If the write is not confirmed, the mux keeps its reference on the
    /// old parent and also keeps one on `new_parent` as `stray_parent`. The
    /// hardware may be running from either. The next confirmed write drops
    /// the stray reference.
    #[allow(clippy::too_many_arguments)]
    fn reparent<P: RegisterPort + ?Sized>(
        &mut self,
        port: &mut P,
        cfg: &CpgConfig,
        idx: NodeIdx,
        new_parent: NodeIdx,
        sel: u32,
        field: Field,
        status: Option<BitRef>,
    ) -> Result<()> {
        let node = &self.nodes[idx];
        if node.latched == sel && !node.unconfirmed {
            return Ok(());
        }
        let old = node.holds_parent;
        let takes_ref = old.is_some_and(|o| o != new_parent);

        if takes_ref {
            if let Err(e) = self.enable(port, cfg, new_parent) {
                self.disable(port, new_parent)?;
                return Err(e);
            }
        }
        if let Err(e) = self.program(port, cfg, idx, field, status, sel) {
            if takes_ref {
                if let Some(prev) = self.nodes[idx].stray_parent.replace(new_parent) {
                    self.disable(port, prev)?;
                }
            }
            return Err(e);
        }
        if let Some(old) = old.filter(|_| takes_ref) {
            self.nodes[idx].holds_parent = Some(new_parent);
            self.disable(port, old)?;
            debug!(
                "{}: reparented {} -> {}",
                self.nodes[idx].name, self.nodes[old].name, self.nodes[new_parent].name
            );
        }
        self.release_stray_parent(port, idx)
    }

    /// Drop the reference an unconfirmed mux write left behind.
    pub(crate) fn release_stray_parent<P: RegisterPort + ?Sized>(
        &mut self,
        port: &mut P,
        idx: NodeIdx,
    ) -> Result<()> {
        match self.nodes[idx].stray_parent.take() {
            Some(stray) => {
                debug!("{}: releasing {}", self.nodes[idx].name, self.nodes[stray].name);
                self.disable(port, stray)
            }
            None => Ok(()),
        }
    }
}

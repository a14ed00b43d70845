//! Engine facade
//!
//! [`Cpg`] owns the validated graph and the register port behind one
//! `parking_lot::Mutex`. Every operation takes the lock for its whole
//! duration, hardware polls included, so callers are fully serialized.
//!
//! Consumers never see arena indices. They resolve an exported id once with
//! [`Cpg::lookup`] or [`Cpg::reset`] and keep the returned handle.

use crate::config::CpgConfig;
use crate::error::{CpgError, Result};
use crate::mmio::RegisterPort;
use crate::registry::{build, GateState, Graph, NodeIdx};
use crate::reset::ResetState;
use cpg_soc::desc::is_internal;
use cpg_soc::{BusStopId, ClkId, Descriptor, ResetId};
use parking_lot::Mutex;
use tracing::info;

struct Inner<P> {
    graph: Graph,
    port: P,
}

/// Clock pulse generator engine.
pub struct Cpg<P: RegisterPort> {
    inner: Mutex<Inner<P>>,
    config: CpgConfig,
}

impl<P: RegisterPort> std::fmt::Debug for Cpg<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cpg")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// One row of [`Cpg::summary`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClockSummary {
    /// Node id
    pub id: ClkId,
    /// Node name
    pub name: &'static str,
    /// Node kind (`input`, `pll`, `div-dyn`, `module`, ...)
    pub kind: &'static str,
    /// Active parent name
    pub parent: Option<&'static str>,
    /// Current rate, `None` if it cannot be computed
    pub rate: Option<u64>,
    /// Consumer references
    pub refcount: u32,
    /// Gate progress
    pub state: GateState,
    /// Never gated once running
    pub critical: bool,
}

/// One row of [`Cpg::reset_summary`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResetSummary {
    /// Line id
    pub id: ResetId,
    /// Line name
    pub name: &'static str,
    /// Current state
    pub state: ResetState,
    /// Names of the clocks that must run before release
    pub dependents: Vec<&'static str>,
}

impl<P: RegisterPort> Cpg<P> {
    /// Build the engine for `desc` on top of `port`.
    ///
    /// Latched divider/mux values and released reset lines are read back from
    /// the hardware, and critical module clocks are switched on and pinned.
    /// A line released by firmware holds its module clocks from the start.
    ///
    /// # Errors
    ///
    /// `Descriptor` if the descriptor is inconsistent; `HardwareTimeout` if a
    /// critical clock or a clock of a released line does not come up.
    pub fn new(desc: &Descriptor, port: P, config: CpgConfig) -> Result<Self> {
        let mut graph = build(desc)?;
        let mut port = port;

        graph.apply_input_rates(|name| config.input_rate(name));
        graph.sync_from_hardware(&port);

        let critical: Vec<NodeIdx> = (0..graph.len()).filter(|&i| graph.nodes[i].critical).collect();
        for &idx in &critical {
            graph.enable(&mut port, &config, idx)?;
        }
        let adopted = graph.adopt_released(&mut port, &config)?;

        info!(
            "{}: {} clocks, {} resets ({} released at boot), {} bus-stop groups, {} critical clocks pinned",
            desc.name,
            graph.len(),
            graph.resets.len(),
            adopted,
            graph.bus_stops.len(),
            critical.len()
        );

        Ok(Self {
            inner: Mutex::new(Inner { graph, port }),
            config,
        })
    }

    /// Active configuration.
    pub const fn config(&self) -> &CpgConfig {
        &self.config
    }

    /// Platform name.
    pub fn name(&self) -> &'static str {
        self.inner.lock().graph.name()
    }

    /// Resolve an exported clock id.
    ///
    /// # Errors
    ///
    /// `NotExported` for ids outside the exported range, undefined ids and
    /// internal nodes.
    pub fn lookup(&self, id: ClkId) -> Result<ClockHandle<'_, P>> {
        let inner = self.inner.lock();
        let g = &inner.graph;
        let idx = g
            .index_of(id)
            .filter(|&i| id.0 < g.last_exported && !is_internal(g.nodes[i].name))
            .ok_or(CpgError::NotExported { id })?;
        Ok(ClockHandle {
            cpg: self,
            idx,
            id,
            name: g.nodes[idx].name,
        })
    }

    /// Resolve a reset line.
    ///
    /// # Errors
    ///
    /// `UnknownReset` if no line has this id.
    pub fn reset(&self, id: ResetId) -> Result<ResetHandle<'_, P>> {
        let inner = self.inner.lock();
        let line = *inner
            .graph
            .reset_by_id
            .get(&id)
            .ok_or(CpgError::UnknownReset { id })?;
        Ok(ResetHandle {
            cpg: self,
            line,
            id,
            name: inner.graph.resets[line].name,
        })
    }

    /// Whether a bus-stop group is currently parked.
    ///
    /// # Errors
    ///
    /// `UnknownBusStop` if no group has this id.
    pub fn bus_stop_parked(&self, id: BusStopId) -> Result<bool> {
        let inner = self.inner.lock();
        let group = *inner
            .graph
            .bus_by_id
            .get(&id)
            .ok_or(CpgError::UnknownBusStop { id })?;
        Ok(inner.graph.bus_stopped(group))
    }

    /// Every clock node, in arena order.
    pub fn summary(&self) -> Vec<ClockSummary> {
        let inner = self.inner.lock();
        let g = &inner.graph;
        g.nodes
            .iter()
            .enumerate()
            .map(|(idx, n)| ClockSummary {
                id: n.id,
                name: n.name,
                kind: n.kind.label(),
                parent: g.active_parent(idx).map(|p| g.nodes[p].name),
                rate: g.rate(&inner.port, idx).ok(),
                refcount: n.refcount,
                state: n.state,
                critical: n.critical,
            })
            .collect()
    }

    /// Every reset line, in descriptor order.
    pub fn reset_summary(&self) -> Vec<ResetSummary> {
        let inner = self.inner.lock();
        let g = &inner.graph;
        g.resets
            .iter()
            .map(|l| ResetSummary {
                id: l.id,
                name: l.name,
                state: l.state,
                dependents: l.dependents.iter().map(|&d| g.nodes[d].name).collect(),
            })
            .collect()
    }

    /// Run `f` with exclusive access to the register port.
    pub fn with_port<R>(&self, f: impl FnOnce(&mut P) -> R) -> R {
        f(&mut self.inner.lock().port)
    }

    /// Tear down the engine and hand back the port.
    pub fn into_port(self) -> P {
        self.inner.into_inner().port
    }

    fn locked<R>(&self, f: impl FnOnce(&mut Graph, &mut P, &CpgConfig) -> R) -> R {
        let mut inner = self.inner.lock();
        let Inner { graph, port } = &mut *inner;
        f(graph, port, &self.config)
    }
}

/// Consumer handle on one exported clock.
#[derive(Debug)]
pub struct ClockHandle<'a, P: RegisterPort> {
    cpg: &'a Cpg<P>,
    idx: NodeIdx,
    id: ClkId,
    name: &'static str,
}

impl<P: RegisterPort> ClockHandle<'_, P> {
    /// Clock id.
    pub const fn id(&self) -> ClkId {
        self.id
    }

    /// Clock name.
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Take a reference and make sure the clock runs.
    ///
    /// Every call, successful or not, must be balanced by one [`disable`](Self::disable).
    ///
    /// # Errors
    ///
    /// `HardwareTimeout` if a monitor bit never confirms. The reference is
    /// kept and the gate stays written; calling `enable` again re-polls.
    pub fn enable(&self) -> Result<()> {
        self.cpg
            .locked(|g, port, cfg| g.enable(port, cfg, self.idx))
    }

    /// Drop a reference, gating the clock once none remain.
    ///
    /// # Errors
    ///
    /// `RefcountUnderflow` without a matching `enable`.
    pub fn disable(&self) -> Result<()> {
        self.cpg.locked(|g, port, _| g.disable(port, self.idx))
    }

    /// Whether the clock is confirmed running.
    pub fn is_enabled(&self) -> bool {
        self.cpg.inner.lock().graph.is_enabled(self.idx)
    }

    /// Consumer references currently held.
    pub fn refcount(&self) -> u32 {
        self.cpg.inner.lock().graph.nodes[self.idx].refcount
    }

    /// Current rate in Hz.
    ///
    /// # Errors
    ///
    /// `InvalidDivisor` if a latched register value on the path has no meaning.
    pub fn get_rate(&self) -> Result<u64> {
        let inner = self.cpg.inner.lock();
        inner.graph.rate(&inner.port, self.idx)
    }

    /// Reprogram the clock as close to `hz` as possible. Returns the new rate.
    ///
    /// # Errors
    ///
    /// `UnsupportedOperation` for fixed nodes; `HardwareTimeout` if the busy bit
    /// never clears. The engine then keeps reporting the previous rate, and the
    /// next `set_rate` rewrites the field even if it asks for that same rate.
    pub fn set_rate(&self, hz: u64) -> Result<u64> {
        self.cpg
            .locked(|g, port, cfg| g.set_rate(port, cfg, self.idx, hz))
    }

    /// Rate [`set_rate`](Self::set_rate) would produce, without writing anything.
    ///
    /// # Errors
    ///
    /// `InvalidDivisor` if the current configuration has no rate.
    pub fn round_rate(&self, hz: u64) -> Result<u64> {
        let inner = self.cpg.inner.lock();
        inner.graph.round_rate(&inner.port, self.idx, hz)
    }

    /// Name of the parent this clock currently draws from.
    pub fn parent(&self) -> Option<&'static str> {
        let inner = self.cpg.inner.lock();
        let g = &inner.graph;
        g.active_parent(self.idx).map(|p| g.nodes[p].name)
    }
}

/// Consumer handle on one reset line.
#[derive(Debug)]
pub struct ResetHandle<'a, P: RegisterPort> {
    cpg: &'a Cpg<P>,
    line: usize,
    id: ResetId,
    name: &'static str,
}

impl<P: RegisterPort> ResetHandle<'_, P> {
    /// Line id.
    pub const fn id(&self) -> ResetId {
        self.id
    }

    /// Line name.
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Hold the module in reset.
    ///
    /// # Errors
    ///
    /// Only if dropping the clock references taken by `deassert` fails.
    pub fn assert(&self) -> Result<()> {
        self.cpg
            .locked(|g, port, _| g.assert_reset(port, self.line))
    }

    /// Start the module's clocks, then release it.
    ///
    /// # Errors
    ///
    /// `HardwareTimeout` if a dependent clock does not come up, `ResetTimeout`
    /// if the monitor still reports reset. Either way the line is `Asserted`.
    /// After `ResetTimeout` the release bit stays set in hardware; call
    /// [`assert`](Self::assert) to clear it.
    pub fn deassert(&self) -> Result<()> {
        self.cpg
            .locked(|g, port, cfg| g.deassert_reset(port, cfg, self.line))
    }

    /// Assert, then deassert.
    ///
    /// # Errors
    ///
    /// As [`deassert`](Self::deassert).
    pub fn pulse(&self) -> Result<()> {
        self.cpg
            .locked(|g, port, cfg| g.pulse_reset(port, cfg, self.line))
    }

    /// Current state.
    pub fn status(&self) -> ResetState {
        self.cpg.inner.lock().graph.resets[self.line].state
    }
}

//! Reset coordinator
//!
//! A reset line may only be released once every module clock it lists is
//! running. `deassert` takes one reference on each dependent clock and keeps
//! it until the next `assert`.
//!
//! ```text
//!             deassert ok
//! Asserted ──────────────→ Ready
//!    ↑  ╲                   │
//!    │   ╲ (Deasserting)    │ assert
//!    │    ╲ clock/monitor   │
//!    │     ╲ timeout        │
//!    └──────┴───────────────┘
//! ```

use crate::config::CpgConfig;
use crate::error::{CpgError, Result};
use crate::mmio::RegisterPort;
use crate::poll::wait_for_bit;
use crate::registry::{Graph, NodeIdx};
use cpg_soc::{BitRef, ResetId};
use tracing::{debug, info, warn};

/// Reset line state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetState {
    /// Module held in reset
    Asserted,
    /// Release in progress (only observable from inside `deassert`)
    Deasserting,
    /// Module out of reset
    Ready,
}

/// Runtime view of one reset line.
#[derive(Debug, Clone)]
pub(crate) struct ResetLine {
    pub(crate) id: ResetId,
    pub(crate) name: &'static str,
    pub(crate) bit: BitRef,
    pub(crate) mon: Option<BitRef>,
    pub(crate) dependents: Vec<NodeIdx>,
    /// Dependents this line holds a clock reference on
    pub(crate) held: Vec<bool>,
    pub(crate) state: ResetState,
}

impl ResetLine {
    pub(crate) fn new(
        id: ResetId,
        name: &'static str,
        bit: BitRef,
        mon: Option<BitRef>,
        dependents: Vec<NodeIdx>,
    ) -> Self {
        Self {
            id,
            name,
            bit,
            mon,
            held: vec![false; dependents.len()],
            dependents,
            state: ResetState::Asserted,
        }
    }
}

impl Graph {
    /// Hold the module in reset and drop the clock references `deassert` took.
    pub(crate) fn assert_reset<P: RegisterPort + ?Sized>(
        &mut self,
        port: &mut P,
        line: usize,
    ) -> Result<()> {
        let l = &mut self.resets[line];
        port.write_bit(l.bit, false);
        l.state = ResetState::Asserted;
        debug!("{}: asserted", l.name);

        for i in 0..self.resets[line].dependents.len() {
            if std::mem::take(&mut self.resets[line].held[i]) {
                let dep = self.resets[line].dependents[i];
                self.disable(port, dep)?;
            }
        }
        Ok(())
    }

    /// Start every dependent clock, release the line and wait for the monitor.
    pub(crate) fn deassert_reset<P: RegisterPort + ?Sized>(
        &mut self,
        port: &mut P,
        cfg: &CpgConfig,
        line: usize,
    ) -> Result<()> {
        if self.resets[line].state == ResetState::Ready {
            return Ok(());
        }
        self.resets[line].state = ResetState::Deasserting;

        if let Err(e) = self.start_dependents(port, cfg, line) {
            let l = &mut self.resets[line];
            l.state = ResetState::Asserted;
            warn!("{}: dependent clock failed, staying in reset: {e}", l.name);
            return Err(e);
        }

        let l = &mut self.resets[line];
        port.write_bit(l.bit, true);
        if let Some(mon) = l.mon {
            if let Err(polls) = wait_for_bit(&*port, mon, false, &cfg.reset_monitor) {
                l.state = ResetState::Asserted;
                warn!("{}: still in reset after {polls} polls", l.name);
                return Err(CpgError::ResetTimeout {
                    line: l.name,
                    polls,
                });
            }
        }
        l.state = ResetState::Ready;
        info!("{}: released", l.name);
        Ok(())
    }

    /// Assert then deassert.
    pub(crate) fn pulse_reset<P: RegisterPort + ?Sized>(
        &mut self,
        port: &mut P,
        cfg: &CpgConfig,
        line: usize,
    ) -> Result<()> {
        self.assert_reset(port, line)?;
        self.deassert_reset(port, cfg, line)
    }

    /// Take the clock references of every line that starts out released.
    ///
    /// Firmware may hand over a module that is already out of reset. Its
    /// clocks must keep running until the line is asserted, so the line holds
    /// them exactly as if `deassert` had released it.
    pub(crate) fn adopt_released<P: RegisterPort + ?Sized>(
        &mut self,
        port: &mut P,
        cfg: &CpgConfig,
    ) -> Result<usize> {
        let mut adopted = 0;
        for line in 0..self.resets.len() {
            if self.resets[line].state != ResetState::Ready {
                continue;
            }
            self.start_dependents(port, cfg, line)?;
            debug!("{}: holding clocks of a line released at boot", self.resets[line].name);
            adopted += 1;
        }
        Ok(adopted)
    }

    fn start_dependents<P: RegisterPort + ?Sized>(
        &mut self,
        port: &mut P,
        cfg: &CpgConfig,
        line: usize,
    ) -> Result<()> {
        for i in 0..self.resets[line].dependents.len() {
            let dep = self.resets[line].dependents[i];
            if self.resets[line].held[i] {
                self.power_up(port, cfg, dep)?;
            } else {
                self.resets[line].held[i] = true;
                self.enable(port, cfg, dep)?;
            }
        }
        Ok(())
    }
}

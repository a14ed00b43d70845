//! Clock-tree, reset and bus-stop coordination engine for a clock pulse
//! generator (CPG).
//!
//! The engine turns a static [`cpg_soc::Descriptor`] into a validated graph
//! and serves clock, reset and bus-stop requests against a memory-mapped
//! register window.
//!
//! # Layers
//!
//! ```text
//! Cpg / ClockHandle / ResetHandle      one coarse lock, exported ids only
//!   ├── rate engine                    get_rate / set_rate / round_rate
//!   ├── gate engine                    refcounts, parent chain, monitors
//!   ├── reset coordinator              clocks first, then release + back-off poll
//!   └── bus-stop coordinator           park once every member is down
//! RegisterPort
//!   ├── MappedRegion                   /dev/mem window (real hardware)
//!   └── SimulatedPort                  in-memory register file
//! ```
//!
//! # Quick start
//!
//! ```no_run
//! use cpg_driver::{Cpg, CpgConfig, SimulatedPort};
//! use cpg_soc::reference::{clk, rst, REFERENCE};
//!
//! # fn main() -> cpg_driver::Result<()> {
//! let port = SimulatedPort::for_descriptor(&REFERENCE);
//! let cpg = Cpg::new(&REFERENCE, port, CpgConfig::from_env())?;
//!
//! let gpu = cpg.reset(rst::GPU_RESETN)?;
//! gpu.deassert()?;
//!
//! let g = cpg.lookup(clk::G)?;
//! println!("{} runs at {} Hz", g.name(), g.set_rate(125_000_000)?);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::doc_markdown)]

mod busstop;
mod config;
mod cpg;
mod error;
mod gate;
pub mod mmio;
mod poll;
mod rate;
mod registry;
mod reset;
mod sim;

pub use config::{CpgConfig, PollConfig};
pub use cpg::{ClockHandle, ClockSummary, Cpg, ResetHandle, ResetSummary};
pub use error::{CpgError, DescriptorError, Result};
pub use mmio::{MappedRegion, RegisterPort};
pub use registry::{build, GateState, Graph};
pub use reset::ResetState;
pub use sim::SimulatedPort;

/// Commonly used types.
pub mod prelude {
    pub use crate::{
        ClockHandle, Cpg, CpgConfig, CpgError, MappedRegion, RegisterPort, ResetHandle,
        ResetState, Result, SimulatedPort,
    };
}

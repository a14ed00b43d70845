//! Silicon model of the clock pulse generator (CPG).
//!
//! This crate has **no dependencies** and **no hardware access**. It is a
//! pure model of the silicon: the CPG register map, the descriptor types a
//! clock tree is declared with, and the compiled-in reference table for the
//! platform.
//!
//! # Crate organisation
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`desc`] | Descriptor types: clock kinds, module clocks, reset lines, bus-stop groups |
//! | [`regs`] | CPG register map: offsets and bit positions |
//! | [`reference`] | The reference platform's descriptor table and exported ids |
//!
//! The engine that consumes a [`desc::Descriptor`] lives in `cpg-driver`.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod desc;
pub mod reference;
pub mod regs;

pub use desc::{
    BitRef, BusStopDesc, BusStopId, ClkId, ClkKind, CoreClk, Descriptor, DivEntry, Field, ModClk,
    PllRegs, ResetDesc, ResetId,
};

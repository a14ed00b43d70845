//! `cpg`: diagnostics for the clock pulse generator engine.
//!
//! ```text
//! USAGE:
//!   cpg check                       Validate the reference descriptor
//!   cpg tree                        Every clock: kind, parent, rate, refcount
//!   cpg rate <clock>                Current rate of one exported clock
//!   cpg set-rate <clock> <hz>       Reprogram a divider or mux
//!   cpg enable <clock>              Enable a clock and show the result
//!   cpg resets                      Every reset line and its state
//!   cpg deassert <line>             Start a line's clocks and release it
//! ```
//!
//! Runs against a simulated register file unless `--mem-base` points at the
//! physical CPG window (root only).

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use cpg_driver::{build, Cpg, CpgConfig, MappedRegion, RegisterPort, SimulatedPort};
use cpg_soc::reference::{BOOT_STATE, REFERENCE};
use cpg_soc::{ClkId, ResetId};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "cpg", about = "Clock pulse generator diagnostics", version)]
struct Cli {
    /// Physical base address of the CPG window (e.g. 0x11010000).
    /// Without it the tool runs on a simulated register file.
    #[arg(long, value_parser = parse_addr, global = true)]
    mem_base: Option<u64>,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Build and validate the reference descriptor.
    Check,
    /// Print every clock node.
    Tree,
    /// Print the rate of one exported clock.
    Rate {
        /// Clock id or name (e.g. 7 or M3).
        clock: String,
    },
    /// Reprogram a dynamic divider or mux.
    SetRate {
        /// Clock id or name.
        clock: String,
        /// Requested rate in Hz.
        hz: u64,
    },
    /// Enable a clock and report its state.
    Enable {
        /// Clock id or name.
        clock: String,
    },
    /// Print every reset line.
    Resets,
    /// Release a reset line.
    Deassert {
        /// Reset line id or name (e.g. 4 or gpu_resetn).
        line: String,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .init();

    let cli = Cli::parse();

    if let Cmd::Check = cli.command {
        return cmd_check();
    }

    let config = CpgConfig::from_env();
    match cli.mem_base {
        Some(base) => {
            tracing::debug!("using physical window at {base:#x}");
            let port = MappedRegion::open(base, REFERENCE.window_size)
                .with_context(|| format!("mapping CPG window at {base:#x}"))?;
            run(&Cpg::new(&REFERENCE, port, config)?, cli.command)
        }
        None => {
            tracing::debug!("no --mem-base, using simulated registers");
            let port = SimulatedPort::for_descriptor(&REFERENCE).with_state(BOOT_STATE);
            run(&Cpg::new(&REFERENCE, port, config)?, cli.command)
        }
    }
}

fn run<P: RegisterPort>(cpg: &Cpg<P>, cmd: Cmd) -> Result<()> {
    match cmd {
        Cmd::Check => cmd_check()?,
        Cmd::Tree => cmd_tree(cpg),
        Cmd::Rate { clock } => {
            let clk = cpg.lookup(clock_id(cpg, &clock)?)?;
            println!("{}  {}", clk.name(), fmt_hz(clk.get_rate()?));
        }
        Cmd::SetRate { clock, hz } => {
            let clk = cpg.lookup(clock_id(cpg, &clock)?)?;
            let before = clk.get_rate()?;
            let after = clk.set_rate(hz)?;
            println!(
                "{}  {} -> {}  (requested {})",
                clk.name(),
                fmt_hz(before),
                fmt_hz(after),
                fmt_hz(hz)
            );
        }
        Cmd::Enable { clock } => {
            let clk = cpg.lookup(clock_id(cpg, &clock)?)?;
            clk.enable()?;
            println!(
                "{}  enabled={}  refcount={}  parent={}",
                clk.name(),
                clk.is_enabled(),
                clk.refcount(),
                clk.parent().unwrap_or("-")
            );
        }
        Cmd::Resets => cmd_resets(cpg),
        Cmd::Deassert { line } => {
            let id = reset_id(cpg, &line)?;
            let handle = cpg.reset(id)?;
            handle.deassert()?;
            println!("{}  {:?}", handle.name(), handle.status());
        }
    }
    Ok(())
}

fn cmd_check() -> Result<()> {
    let graph = build(&REFERENCE)?;
    println!(
        "{}: {} clocks ({} core, {} module), {} resets, {} bus-stop groups: OK",
        graph.name(),
        graph.len(),
        REFERENCE.core.len(),
        REFERENCE.modules.len(),
        REFERENCE.resets.len(),
        REFERENCE.bus_stops.len()
    );
    Ok(())
}

fn cmd_tree<P: RegisterPort>(cpg: &Cpg<P>) {
    println!(
        "{:>5}  {:<16} {:<8} {:<16} {:>14} {:>4}  state",
        "id", "name", "kind", "parent", "rate", "refs"
    );
    for row in cpg.summary() {
        let rate = row.rate.map_or_else(|| "?".to_string(), fmt_hz);
        println!(
            "{:>5}  {:<16} {:<8} {:<16} {:>14} {:>4}  {:?}{}",
            row.id.0,
            row.name,
            row.kind,
            row.parent.unwrap_or("-"),
            rate,
            row.refcount,
            row.state,
            if row.critical { " (critical)" } else { "" }
        );
    }
}

fn cmd_resets<P: RegisterPort>(cpg: &Cpg<P>) {
    for line in cpg.reset_summary() {
        println!(
            "{:>3}  {:<20} {:<11} {}",
            line.id.0,
            line.name,
            format!("{:?}", line.state),
            line.dependents.join(", ")
        );
    }
}

/// Accept a numeric id or an exported clock name.
fn clock_id<P: RegisterPort>(cpg: &Cpg<P>, arg: &str) -> Result<ClkId> {
    if let Ok(n) = arg.parse::<u32>() {
        return Ok(ClkId(n));
    }
    cpg.summary()
        .iter()
        .find(|row| row.name.eq_ignore_ascii_case(arg))
        .map(|row| row.id)
        .ok_or_else(|| anyhow!("no clock named {arg:?}"))
}

/// Accept a numeric id or a reset line name.
fn reset_id<P: RegisterPort>(cpg: &Cpg<P>, arg: &str) -> Result<ResetId> {
    if let Ok(n) = arg.parse::<u32>() {
        return Ok(ResetId(n));
    }
    cpg.reset_summary()
        .iter()
        .find(|line| line.name.eq_ignore_ascii_case(arg))
        .map(|line| line.id)
        .ok_or_else(|| anyhow!("no reset line named {arg:?}"))
}

fn parse_addr(s: &str) -> std::result::Result<u64, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(&hex.replace('_', ""), 16),
        None => s.replace('_', "").parse(),
    };
    parsed.map_err(|e| format!("invalid address {s:?}: {e}"))
}

fn fmt_hz(hz: u64) -> String {
    match hz {
        h if h >= 1_000_000 => format!("{:.3} MHz", h as f64 / 1e6),
        h if h >= 1_000 => format!("{:.3} kHz", h as f64 / 1e3),
        h => format!("{h} Hz"),
    }
}

//! Reset sequencing integration tests
//!
//! Clock-before-release ordering, monitor time-outs and retry behaviour,
//! checked through the simulated port's write log.

mod common;

use common::*;
use cpg_driver::{Cpg, CpgConfig, CpgError, PollConfig, RegisterPort, ResetState, SimulatedPort};
use cpg_soc::reference::{clk, BOOT_STATE, REFERENCE};
use std::time::Duration;

#[test]
fn test_clock_enabled_before_release() {
    let cpg = engine();
    let r0 = cpg.reset(R0).unwrap();
    assert_eq!(r0.status(), ResetState::Asserted);
    cpg.with_port(SimulatedPort::clear_writes);

    r0.deassert().unwrap();
    assert_eq!(r0.status(), ResetState::Ready);

    let (a_on, b_on, release) = cpg.with_port(|p| {
        (
            p.first_write_with(A_ON, true).expect("a enabled"),
            p.first_write_with(B_ON, true).expect("b enabled"),
            p.first_write_with(R0_BIT, true).expect("r0 released"),
        )
    });
    assert!(a_on < release);
    assert!(b_on < release);
}

#[test]
fn test_stuck_monitor_times_out() {
    let cpg = engine();
    let r0 = cpg.reset(R0).unwrap();
    cpg.with_port(|p| p.stick(R0_MON, true));

    let err = r0.deassert().unwrap_err();
    assert!(matches!(err, CpgError::ResetTimeout { line: "r0", polls: 5 }));
    assert!(err.is_recoverable());
    assert_eq!(r0.status(), ResetState::Asserted);

    // the release bit is not rolled back; an explicit assert clears it
    assert!(cpg.with_port(|p| p.read_bit(R0_BIT)));
    r0.assert().unwrap();
    assert!(!cpg.with_port(|p| p.read_bit(R0_BIT)));
    assert_eq!(cpg.lookup(A).unwrap().refcount(), 0);
}

#[test]
fn test_retry_after_timeout_takes_no_extra_reference() {
    let cpg = engine();
    let r0 = cpg.reset(R0).unwrap();
    let a = cpg.lookup(A).unwrap();
    cpg.with_port(|p| p.stick(R0_MON, true));
    assert!(r0.deassert().is_err());
    assert_eq!(a.refcount(), 1);

    cpg.with_port(|p| p.unstick(R0_MON));
    r0.deassert().unwrap();
    assert_eq!(r0.status(), ResetState::Ready);
    assert_eq!(a.refcount(), 1);
}

#[test]
fn test_backoff_bound_is_configurable() {
    let mut config = CpgConfig::immediate(5);
    config.reset_monitor =
        PollConfig::backoff(3, Duration::from_micros(1), Duration::from_micros(4));
    let mut port = port();
    port.stick(R0_MON, true);
    let cpg = Cpg::new(&FIXTURE, port, config).unwrap();

    let err = cpg.reset(R0).unwrap().deassert().unwrap_err();
    assert!(matches!(err, CpgError::ResetTimeout { polls: 3, .. }));
}

#[test]
fn test_dependent_clock_failure_blocks_release() {
    let cpg = engine();
    let r0 = cpg.reset(R0).unwrap();
    cpg.with_port(|p| p.stick(B_MON, false));

    let err = r0.deassert().unwrap_err();
    assert!(matches!(err, CpgError::HardwareTimeout { clock: "b", .. }));
    assert_eq!(r0.status(), ResetState::Asserted);
    assert_eq!(cpg.with_port(|p| p.first_write_with(R0_BIT, true)), None);

    cpg.with_port(|p| p.unstick(B_MON));
    r0.deassert().unwrap();
    assert_eq!(cpg.lookup(B).unwrap().refcount(), 1);
}

#[test]
fn test_assert_drops_clock_references() {
    let cpg = engine();
    let r0 = cpg.reset(R0).unwrap();
    let (a, b) = (cpg.lookup(A).unwrap(), cpg.lookup(B).unwrap());
    b.enable().unwrap();

    r0.deassert().unwrap();
    assert_eq!((a.refcount(), b.refcount()), (1, 2));

    r0.assert().unwrap();
    assert_eq!(r0.status(), ResetState::Asserted);
    assert!(!cpg.with_port(|p| p.read_bit(R0_BIT)));
    assert!(!a.is_enabled());
    assert!(b.is_enabled(), "consumer reference survives the assert");
    assert!(!cpg.bus_stop_parked(B0).unwrap());

    b.disable().unwrap();
    assert!(cpg.bus_stop_parked(B0).unwrap());
}

#[test]
fn test_assert_is_unconditional() {
    let cpg = engine();
    let r0 = cpg.reset(R0).unwrap();
    r0.assert().unwrap();
    r0.assert().unwrap();
    assert_eq!(cpg.with_port(|p| p.write_count(R0_BIT.reg)), 2);
    assert_eq!(cpg.lookup(A).unwrap().refcount(), 0);
}

#[test]
fn test_pulse_orders_assert_before_release() {
    let cpg = engine();
    let r0 = cpg.reset(R0).unwrap();
    r0.deassert().unwrap();
    cpg.with_port(SimulatedPort::clear_writes);

    r0.pulse().unwrap();
    assert_eq!(r0.status(), ResetState::Ready);
    let (low, high) = cpg.with_port(|p| {
        (
            p.first_write_with(R0_BIT, false).expect("assert"),
            p.first_write_with(R0_BIT, true).expect("release"),
        )
    });
    assert!(low < high);
    assert!(cpg.lookup(A).unwrap().is_enabled());
}

#[test]
fn test_released_at_boot_is_ready() {
    // firmware released r0 and left both of its clocks running
    let cpg = engine_with(port().with_state(&[
        (R0_BIT.reg, R0_BIT.mask()),
        (A_ON.reg, A_ON.mask() | B_ON.mask()),
    ]));
    let r0 = cpg.reset(R0).unwrap();
    let (a, b) = (cpg.lookup(A).unwrap(), cpg.lookup(B).unwrap());
    assert_eq!(r0.status(), ResetState::Ready);
    assert_eq!((a.refcount(), b.refcount()), (1, 1));
    assert!(a.is_enabled() && b.is_enabled());
    assert_eq!(cpg.with_port(|p| p.write_count(A_ON.reg)), 0);

    cpg.with_port(SimulatedPort::clear_writes);
    r0.deassert().unwrap();
    assert!(cpg.with_port(|p| p.writes().is_empty()));

    // a balanced consumer must not gate a module that is out of reset
    a.enable().unwrap();
    a.disable().unwrap();
    assert!(a.is_enabled());
    assert!(cpg.with_port(|p| p.read_bit(A_ON)));

    r0.assert().unwrap();
    assert!(!a.is_enabled());
    assert!(!cpg.with_port(|p| p.read_bit(A_ON)));
}

#[test]
fn test_released_at_boot_starts_stopped_clocks() {
    let cpg = engine_with(port().with_state(&[(R0_BIT.reg, R0_BIT.mask())]));
    assert!(cpg.with_port(|p| p.read_bit(A_ON) && p.read_bit(B_ON)));
    assert_eq!(cpg.lookup(B).unwrap().refcount(), 1);
}

#[test]
fn test_reference_bring_up() {
    let port = SimulatedPort::for_descriptor(&REFERENCE).with_state(BOOT_STATE);
    let cpg = Cpg::new(&REFERENCE, port, CpgConfig::immediate(5)).unwrap();

    for line in cpg.reset_summary() {
        cpg.reset(line.id).unwrap().deassert().unwrap();
    }
    assert!(cpg
        .reset_summary()
        .iter()
        .all(|l| l.state == ResetState::Ready));

    for id in [clk::GPU_CLK, clk::SDHI0_IMCLK, clk::LCDC_CLK_P, clk::SCIF0_CLK_PCK] {
        assert!(cpg.lookup(id).unwrap().is_enabled(), "{id}");
    }
    assert!(!cpg.bus_stop_parked(cpg_soc::reference::bus::VIDEO).unwrap());
}

//! Bounded bit polling

use crate::config::PollConfig;
use crate::mmio::RegisterPort;
use cpg_soc::BitRef;
use std::time::Duration;

/// Poll `bit` until it reads `want`.
///
/// Returns `Ok(reads)` on success, `Err(reads)` once the budget is spent.
/// At least one read is always made, so a zero budget still samples the bit.
pub(crate) fn wait_for_bit<P: RegisterPort + ?Sized>(
    port: &P,
    bit: BitRef,
    want: bool,
    cfg: &PollConfig,
) -> std::result::Result<u32, u32> {
    let budget = cfg.max_polls.max(1);
    let mut delay = cfg.delay;
    for i in 0..budget {
        if port.read_bit(bit) == want {
            return Ok(i + 1);
        }
        if i + 1 == budget {
            break;
        }
        pause(delay);
        delay = (delay * 2).min(cfg.max_delay);
    }
    Err(budget)
}

fn pause(delay: Duration) {
    if delay.is_zero() {
        std::thread::yield_now();
    } else {
        std::thread::sleep(delay);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimulatedPort;

    #[test]
    fn returns_read_count() {
        let mut port = SimulatedPort::new();
        let bit = BitRef::new(0x10, 3);
        port.write_bit(bit, true);
        assert_eq!(wait_for_bit(&port, bit, true, &PollConfig::immediate(5)), Ok(1));
    }

    #[test]
    fn exhausts_budget() {
        let port = SimulatedPort::new();
        let bit = BitRef::new(0x10, 3);
        assert_eq!(wait_for_bit(&port, bit, true, &PollConfig::immediate(4)), Err(4));
    }

    #[test]
    fn zero_budget_still_reads() {
        let port = SimulatedPort::new();
        let bit = BitRef::new(0x10, 3);
        assert_eq!(wait_for_bit(&port, bit, false, &PollConfig::immediate(0)), Ok(1));
        assert_eq!(wait_for_bit(&port, bit, true, &PollConfig::immediate(0)), Err(1));
    }

    #[test]
    fn backoff_is_capped() {
        let port = SimulatedPort::new();
        let cfg = PollConfig::backoff(4, Duration::from_micros(1), Duration::from_micros(2));
        let start = std::time::Instant::now();
        assert_eq!(wait_for_bit(&port, BitRef::new(0, 0), true, &cfg), Err(4));
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}

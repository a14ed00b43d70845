//! Engine configuration
//!
//! Poll budgets for the three kinds of hardware wait, plus rates for external
//! inputs whose frequency the descriptor leaves open. [`CpgConfig::default`]
//! matches the values the reference platform was brought up with;
//! [`CpgConfig::from_env`] overlays environment overrides on top.
//!
//! | Variable | Meaning |
//! |----------|---------|
//! | `CPG_CLOCK_POLLS` | clock monitor poll budget |
//! | `CPG_RESET_POLLS` | reset monitor poll budget |
//! | `CPG_RESET_BACKOFF_US` | first reset poll delay |
//! | `CPG_RESET_BACKOFF_MAX_US` | reset poll delay ceiling |
//! | `CPG_STATUS_POLLS` | divider/mux status poll budget |

use std::time::Duration;
use tracing::{debug, warn};

/// How long to wait for a bit to reach its expected value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    /// Reads before giving up (at least one read is always made)
    pub max_polls: u32,
    /// Delay after the first unsuccessful read
    pub delay: Duration,
    /// Ceiling for the doubling delay
    pub max_delay: Duration,
}

impl PollConfig {
    /// Constant delay between reads.
    pub const fn fixed(max_polls: u32, delay: Duration) -> Self {
        Self {
            max_polls,
            delay,
            max_delay: delay,
        }
    }

    /// Delay doubling from `delay` up to `max_delay`.
    pub const fn backoff(max_polls: u32, delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_polls,
            delay,
            max_delay,
        }
    }

    /// No sleeping at all, only a yield between reads. Used by tests.
    pub const fn immediate(max_polls: u32) -> Self {
        Self::fixed(max_polls, Duration::ZERO)
    }
}

/// Configuration for a [`crate::Cpg`] instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CpgConfig {
    /// Waiting for a module clock monitor after enabling it
    pub clock_monitor: PollConfig,
    /// Waiting for a reset monitor after releasing the line
    pub reset_monitor: PollConfig,
    /// Waiting for a divider or mux busy bit after a write
    pub status: PollConfig,
    /// Rates for external inputs declared without one, by node name
    pub input_rates: Vec<(String, u64)>,
}

impl Default for CpgConfig {
    fn default() -> Self {
        Self {
            clock_monitor: PollConfig::fixed(100, Duration::from_micros(10)),
            reset_monitor: PollConfig::backoff(
                10,
                Duration::from_micros(10),
                Duration::from_millis(1),
            ),
            status: PollConfig::fixed(1000, Duration::from_micros(1)),
            input_rates: Vec::new(),
        }
    }
}

impl CpgConfig {
    /// Defaults overlaid with `CPG_*` environment variables.
    ///
    /// Unparseable values are logged and ignored.
    pub fn from_env() -> Self {
        Self::default().overlay(|key| std::env::var(key).ok())
    }

    /// Every poll budget set to `max_polls` reads with no sleeping.
    pub fn immediate(max_polls: u32) -> Self {
        Self {
            clock_monitor: PollConfig::immediate(max_polls),
            reset_monitor: PollConfig::immediate(max_polls),
            status: PollConfig::immediate(max_polls),
            input_rates: Vec::new(),
        }
    }

    /// Supply the rate of an input declared without one.
    #[must_use]
    pub fn with_input_rate(mut self, name: impl Into<String>, hz: u64) -> Self {
        let name = name.into();
        self.input_rates.retain(|(n, _)| *n != name);
        self.input_rates.push((name, hz));
        self
    }

    /// Configured rate for input `name`.
    pub fn input_rate(&self, name: &str) -> Option<u64> {
        self.input_rates
            .iter()
            .find(|(n, _)| n == name)
            .map(|&(_, hz)| hz)
    }

    fn overlay(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| -> Option<u64> {
            let raw = lookup(key)?;
            match raw.trim().parse::<u64>() {
                Ok(v) => {
                    debug!("{key}={v}");
                    Some(v)
                }
                Err(e) => {
                    warn!("Ignoring {key}={raw:?}: {e}");
                    None
                }
            }
        };
        let polls = |key: &str| get(key).and_then(|v| u32::try_from(v).ok());

        if let Some(n) = polls("CPG_CLOCK_POLLS") {
            self.clock_monitor.max_polls = n;
        }
        if let Some(n) = polls("CPG_RESET_POLLS") {
            self.reset_monitor.max_polls = n;
        }
        if let Some(us) = get("CPG_RESET_BACKOFF_US") {
            self.reset_monitor.delay = Duration::from_micros(us);
        }
        if let Some(us) = get("CPG_RESET_BACKOFF_MAX_US") {
            self.reset_monitor.max_delay = Duration::from_micros(us);
        }
        if let Some(n) = polls("CPG_STATUS_POLLS") {
            self.status.max_polls = n;
        }
        if self.reset_monitor.max_delay < self.reset_monitor.delay {
            self.reset_monitor.max_delay = self.reset_monitor.delay;
        }
        self
    }
}

//! Runner configuration
//!
//! Tuning knobs for the resilient event stream. Everything else about a run
//! comes from the workload request.

use std::time::Duration;

const DEFAULT_RECONNECT_INITIAL_MS: u64 = 500;
const DEFAULT_RECONNECT_MAX_MS: u64 = 30_000;
const DEFAULT_EVENT_BUFFER: usize = 64;

/// Largest accepted `event_buffer`; bounded channels reject larger capacities
pub const MAX_EVENT_BUFFER: usize = 65_536;

/// Runner configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Delay before the first resubscription after a watch breaks
    pub reconnect_initial: Duration,

    /// Upper bound for the doubling resubscription delay
    pub reconnect_max: Duration,

    /// Capacity of the channel between the watch task and the driver
    pub event_buffer: usize,
}

impl Config {
    /// Creates a new configuration
    pub fn new(reconnect_initial: Duration, reconnect_max: Duration, event_buffer: usize) -> Self {
        Self {
            reconnect_initial,
            reconnect_max,
            event_buffer,
        }
    }

    /// Creates configuration from environment variables
    ///
    /// Expected environment variables:
    /// - RUNJOB_RECONNECT_INITIAL_MS (optional, default: 500)
    /// - RUNJOB_RECONNECT_MAX_MS (optional, default: 30000)
    /// - RUNJOB_EVENT_BUFFER (optional, default: 64, at most 65536)
    pub fn from_env() -> anyhow::Result<Self> {
        let reconnect_initial = Duration::from_millis(env_or(
            "RUNJOB_RECONNECT_INITIAL_MS",
            DEFAULT_RECONNECT_INITIAL_MS,
        )?);
        let reconnect_max =
            Duration::from_millis(env_or("RUNJOB_RECONNECT_MAX_MS", DEFAULT_RECONNECT_MAX_MS)?);
        let event_buffer = env_or("RUNJOB_EVENT_BUFFER", DEFAULT_EVENT_BUFFER)?;

        Ok(Self::new(reconnect_initial, reconnect_max, event_buffer))
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.reconnect_initial.is_zero() {
            anyhow::bail!("reconnect_initial must be greater than 0");
        }

        if self.reconnect_max < self.reconnect_initial {
            anyhow::bail!("reconnect_max must not be smaller than reconnect_initial");
        }

        if self.event_buffer == 0 {
            anyhow::bail!("event_buffer must be greater than 0");
        }

        if self.event_buffer > MAX_EVENT_BUFFER {
            anyhow::bail!("event_buffer must be at most {}", MAX_EVENT_BUFFER);
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(
            Duration::from_millis(DEFAULT_RECONNECT_INITIAL_MS),
            Duration::from_millis(DEFAULT_RECONNECT_MAX_MS),
            DEFAULT_EVENT_BUFFER,
        )
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> anyhow::Result<T> {
    match std::env::var(key) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .map_err(|_| anyhow::anyhow!("{} must be a non-negative integer, got '{}'", key, value)),
        Err(_) => Ok(default),
    }
}

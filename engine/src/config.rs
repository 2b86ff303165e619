//! Engine configuration.

use std::time::Duration;

/// Matching engine and worker configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Seconds between scheduled matching cycles.
    pub cycle_interval_secs: u64,
    /// Partial-match tolerance base, in percent.
    pub tolerance_percent: f64,
    /// Hours a funded transaction may wait in the pool before it is
    /// routed to CIPS.
    pub pool_timeout_hours: i64,
    /// Hours an INITIATED transaction may stay unfunded before expiry.
    pub payment_expiry_hours: i64,
    /// Seconds between expiry sweeps.
    pub expiry_sweep_interval_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cycle_interval_secs: 300,
            tolerance_percent: 5.0,
            pool_timeout_hours: 24,
            payment_expiry_hours: 2,
            expiry_sweep_interval_secs: 900,
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset or unparseable.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(raw) = std::env::var("MATCHING_CYCLE_INTERVAL_SECONDS") {
            if let Ok(secs) = raw.parse() {
                config.cycle_interval_secs = secs;
            }
        }

        if let Ok(raw) = std::env::var("MATCHING_TOLERANCE_PERCENT") {
            if let Ok(pct) = raw.parse() {
                config.tolerance_percent = pct;
            }
        }

        if let Ok(raw) = std::env::var("MATCHING_POOL_TIMEOUT_HOURS") {
            if let Ok(hours) = raw.parse() {
                config.pool_timeout_hours = hours;
            }
        }

        if let Ok(raw) = std::env::var("PAYMENT_EXPIRY_HOURS") {
            if let Ok(hours) = raw.parse() {
                config.payment_expiry_hours = hours;
            }
        }

        config
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.cycle_interval_secs == 0 {
            return Err("Cycle interval cannot be 0".to_string());
        }
        if self.pool_timeout_hours <= 0 {
            return Err("Pool timeout must be positive".to_string());
        }
        if self.payment_expiry_hours <= 0 {
            return Err("Payment expiry must be positive".to_string());
        }
        Ok(())
    }

    /// Cycle interval as a [`Duration`].
    pub fn cycle_interval(&self) -> Duration {
        Duration::from_secs(self.cycle_interval_secs)
    }

    /// Expiry sweep interval as a [`Duration`].
    pub fn expiry_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.expiry_sweep_interval_secs)
    }
}

use anyhow::Context;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::domain::validation::{AmountLimits, MAX_AMOUNT, MIN_AMOUNT};

#[derive(Debug, Clone)]
pub struct Settings {
    pub bind_addr: String,
    pub limits: AmountLimits,
    /// How long a charge request waits for the gateway before answering `Indeterminate`.
    pub charge_timeout: Duration,
    pub refund_timeout: Duration,
    pub ledger_timeout: Duration,
    /// Attempts at the conditional insert before `StoreUnavailable` reaches the caller.
    pub reserve_retries: u32,
    /// Base delay between store attempts; grows linearly per attempt.
    pub reserve_backoff: Duration,
    /// Upper bound on the delay between attempts to record an outcome the gateway has
    /// already reported. Those attempts never give up.
    pub settle_backoff_cap: Duration,
    pub sandbox_latency: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:3000".into(),
            limits: AmountLimits::default(),
            charge_timeout: Duration::from_secs(15),
            refund_timeout: Duration::from_secs(15),
            ledger_timeout: Duration::from_secs(5),
            reserve_retries: 3,
            reserve_backoff: Duration::from_millis(50),
            settle_backoff_cap: Duration::from_secs(5),
            sandbox_latency: Duration::ZERO,
        }
    }
}

impl Settings {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();
        let settings = Self {
            bind_addr: env::var("BIND_ADDR").unwrap_or(defaults.bind_addr),
            limits: AmountLimits {
                min: var_or("MIN_AMOUNT_MINOR", MIN_AMOUNT)?,
                max: var_or("MAX_AMOUNT_MINOR", MAX_AMOUNT)?,
            },
            charge_timeout: millis_or("CHARGE_TIMEOUT_MS", defaults.charge_timeout)?,
            refund_timeout: millis_or("REFUND_TIMEOUT_MS", defaults.refund_timeout)?,
            ledger_timeout: millis_or("LEDGER_TIMEOUT_MS", defaults.ledger_timeout)?,
            reserve_retries: var_or("RESERVE_RETRIES", defaults.reserve_retries)?,
            reserve_backoff: millis_or("RESERVE_BACKOFF_MS", defaults.reserve_backoff)?,
            settle_backoff_cap: millis_or("SETTLE_BACKOFF_CAP_MS", defaults.settle_backoff_cap)?,
            sandbox_latency: millis_or("SANDBOX_LATENCY_MS", defaults.sandbox_latency)?,
        };
        settings.check()?;
        Ok(settings)
    }

    fn check(&self) -> anyhow::Result<()> {
        if self.limits.min <= 0 {
            anyhow::bail!("MIN_AMOUNT_MINOR must be positive");
        }
        if self.limits.min > self.limits.max {
            anyhow::bail!(
                "MIN_AMOUNT_MINOR ({}) exceeds MAX_AMOUNT_MINOR ({})",
                self.limits.min,
                self.limits.max
            );
        }
        if self.charge_timeout.is_zero() || self.refund_timeout.is_zero() {
            anyhow::bail!("gateway timeouts must be non-zero");
        }
        if self.reserve_backoff.is_zero() || self.settle_backoff_cap < self.reserve_backoff {
            anyhow::bail!(
                "RESERVE_BACKOFF_MS must be non-zero and not above SETTLE_BACKOFF_CAP_MS"
            );
        }
        Ok(())
    }

    /// Caller-supplied waits may shorten the configured charge timeout, never extend it.
    pub fn charge_wait(&self, requested: Option<Duration>) -> Duration {
        requested.map_or(self.charge_timeout, |w| w.min(self.charge_timeout))
    }

    pub fn refund_wait(&self, requested: Option<Duration>) -> Duration {
        requested.map_or(self.refund_timeout, |w| w.min(self.refund_timeout))
    }

    /// Delay before store attempt `attempt + 1`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.reserve_backoff
            .saturating_mul(attempt.saturating_add(1))
            .min(self.settle_backoff_cap)
    }
}

fn var_or<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid value for {key}: {raw:?}")),
        Err(_) => Ok(default),
    }
}

fn millis_or(key: &str, default: Duration) -> anyhow::Result<Duration> {
    var_or(key, whole_millis(default)).map(Duration::from_millis)
}

/// Milliseconds of `d`, saturating at `u64::MAX`.
pub fn whole_millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

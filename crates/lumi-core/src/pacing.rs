//! Inter-packet timing for effect sequences
//!
//! The private cluster drops or misreads writes that arrive back to back,
//! and the firmware needs a moment after being switched on before it takes
//! effect writes. These delays are part of the protocol contract.

use crate::error::EffectError;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Named delays used by the sequencer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacingPolicy {
    /// Wait after the on/off "on" command
    pub power_on_settle: Duration,
    /// Wait before the color packet and before the speed packet
    pub packet_spacing: Duration,
    /// Upper bound for a single endpoint call
    pub write_timeout: Duration,
}

impl Default for PacingPolicy {
    fn default() -> Self {
        Self {
            power_on_settle: Duration::from_millis(100),
            packet_spacing: Duration::from_millis(200),
            write_timeout: Duration::from_secs(10),
        }
    }
}

impl PacingPolicy {
    /// Defaults overridden by `LUMI_SETTLE_MS`, `LUMI_PACE_MS` and
    /// `LUMI_WRITE_TIMEOUT_MS`
    #[must_use]
    pub fn from_env() -> Self {
        let ms = |name: &str| {
            std::env::var(name)
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_millis)
        };
        let defaults = Self::default();
        Self {
            power_on_settle: ms("LUMI_SETTLE_MS").unwrap_or(defaults.power_on_settle),
            packet_spacing: ms("LUMI_PACE_MS").unwrap_or(defaults.packet_spacing),
            write_timeout: ms("LUMI_WRITE_TIMEOUT_MS").unwrap_or(defaults.write_timeout),
        }
    }
}

/// Sleep for `delay` unless the bridge is shutting down
pub async fn pause(delay: Duration, cancel: &CancellationToken) -> Result<(), EffectError> {
    if delay.is_zero() {
        return Ok(());
    }
    tokio::select! {
        () = cancel.cancelled() => Err(EffectError::Cancelled),
        () = tokio::time::sleep(delay) => Ok(()),
    }
}

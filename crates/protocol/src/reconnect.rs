//! Reconnect policy shared by every host that owns a backend socket.

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backoff {
	/// Every attempt waits `initial_delay_ms`.
	#[default]
	Fixed,
	/// Attempt `n` waits `initial_delay_ms * 2^(n-1)`, capped at `max_delay_ms`.
	Exponential,
}

/// When and how often a dropped connection is retried.
///
/// The attempt counter resets after every successful connect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReconnectPolicy {
	pub initial_delay_ms: u64,
	pub max_delay_ms: u64,
	/// Attempts before giving up; `0` retries forever.
	pub max_attempts: u32,
	pub backoff: Backoff,
}

impl Default for ReconnectPolicy {
	fn default() -> Self {
		Self {
			initial_delay_ms: 3_000,
			max_delay_ms: 30_000,
			max_attempts: 10,
			backoff: Backoff::Fixed,
		}
	}
}

impl ReconnectPolicy {
	pub fn fixed(delay: Duration, max_attempts: u32) -> Self {
		Self {
			initial_delay_ms: delay.as_millis() as u64,
			max_delay_ms: delay.as_millis() as u64,
			max_attempts,
			backoff: Backoff::Fixed,
		}
	}

	pub fn is_unbounded(&self) -> bool {
		self.max_attempts == 0
	}

	/// Delay before reconnect attempt `attempt` (1-based), or `None` once the
	/// policy is exhausted.
	pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
		if attempt == 0 || (!self.is_unbounded() && attempt > self.max_attempts) {
			return None;
		}
		let ms = match self.backoff {
			Backoff::Fixed => self.initial_delay_ms,
			Backoff::Exponential => {
				let factor = 1u64 << (attempt - 1).min(16);
				self.initial_delay_ms.saturating_mul(factor).min(self.max_delay_ms.max(self.initial_delay_ms))
			}
		};
		Some(Duration::from_millis(ms))
	}
}

// std
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters for refresh requests.
#[derive(Debug, Default)]
pub struct RefreshMetrics {
	attempts: AtomicU64,
	extended: AtomicU64,
	reauthorization: AtomicU64,
	failure: AtomicU64,
}
impl RefreshMetrics {
	/// Returns the total number of refresh requests.
	pub fn attempts(&self) -> u64 {
		self.attempts.load(Ordering::Relaxed)
	}

	/// Returns the number of tokens extended through `fb_exchange_token`.
	pub fn extended(&self) -> u64 {
		self.extended.load(Ordering::Relaxed)
	}

	/// Returns the number of requests answered with a re-authorization URL.
	pub fn reauthorizations(&self) -> u64 {
		self.reauthorization.load(Ordering::Relaxed)
	}

	/// Returns the number of failed refresh requests.
	pub fn failures(&self) -> u64 {
		self.failure.load(Ordering::Relaxed)
	}

	pub(crate) fn record_attempt(&self) {
		self.attempts.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_extended(&self) {
		self.extended.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_reauthorization(&self) {
		self.reauthorization.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_failure(&self) {
		self.failure.fetch_add(1, Ordering::Relaxed);
	}
}

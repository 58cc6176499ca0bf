// std
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters for webhook traffic.
#[derive(Debug, Default)]
pub struct DeliveryMetrics {
	received: AtomicU64,
	rejected: AtomicU64,
	dispatched: AtomicU64,
	entry_failures: AtomicU64,
	degraded: AtomicU64,
	unmatched: AtomicU64,
	duplicates: AtomicU64,
	handshake_accepted: AtomicU64,
	handshake_rejected: AtomicU64,
}
impl DeliveryMetrics {
	/// Returns the number of POST deliveries received.
	pub fn received(&self) -> u64 {
		self.received.load(Ordering::Relaxed)
	}

	/// Returns the number of deliveries rejected at the signature or structure gate.
	pub fn rejected(&self) -> u64 {
		self.rejected.load(Ordering::Relaxed)
	}

	/// Returns the number of lead events emitted.
	pub fn dispatched(&self) -> u64 {
		self.dispatched.load(Ordering::Relaxed)
	}

	/// Returns the number of isolated entry or change failures.
	pub fn entry_failures(&self) -> u64 {
		self.entry_failures.load(Ordering::Relaxed)
	}

	/// Returns the number of events emitted without enrichment after an enrichment failure.
	pub fn degraded(&self) -> u64 {
		self.degraded.load(Ordering::Relaxed)
	}

	/// Returns the number of notifications no enabled subscription accepted.
	pub fn unmatched(&self) -> u64 {
		self.unmatched.load(Ordering::Relaxed)
	}

	/// Returns the number of notifications dropped as repeats of a recent lead.
	pub fn duplicates(&self) -> u64 {
		self.duplicates.load(Ordering::Relaxed)
	}

	/// Returns the number of successful handshakes.
	pub fn handshakes_accepted(&self) -> u64 {
		self.handshake_accepted.load(Ordering::Relaxed)
	}

	/// Returns the number of refused handshakes.
	pub fn handshakes_rejected(&self) -> u64 {
		self.handshake_rejected.load(Ordering::Relaxed)
	}

	pub(crate) fn record_received(&self) {
		self.received.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_rejected(&self) {
		self.rejected.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_dispatched(&self) {
		self.dispatched.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_entry_failures(&self, count: usize) {
		self.entry_failures.fetch_add(count as u64, Ordering::Relaxed);
	}

	pub(crate) fn record_degraded(&self) {
		self.degraded.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_unmatched(&self) {
		self.unmatched.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_duplicate(&self) {
		self.duplicates.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_handshake(&self, accepted: bool) {
		if accepted {
			self.handshake_accepted.fetch_add(1, Ordering::Relaxed);
		} else {
			self.handshake_rejected.fetch_add(1, Ordering::Relaxed);
		}
	}
}

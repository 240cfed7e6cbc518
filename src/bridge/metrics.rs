// std
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters for exchanges and refreshes.
#[derive(Debug, Default)]
pub struct BridgeMetrics {
	exchanges: AtomicU64,
	exchange_failures: AtomicU64,
	refreshes: AtomicU64,
	coalesced: AtomicU64,
}
impl BridgeMetrics {
	/// Returns the number of calls made to the exchange endpoint.
	pub fn exchanges(&self) -> u64 {
		self.exchanges.load(Ordering::Relaxed)
	}

	/// Returns the number of exchange calls that did not yield a token.
	pub fn exchange_failures(&self) -> u64 {
		self.exchange_failures.load(Ordering::Relaxed)
	}

	/// Returns the number of refresh requests, coalesced or not.
	pub fn refreshes(&self) -> u64 {
		self.refreshes.load(Ordering::Relaxed)
	}

	/// Returns the number of refresh requests satisfied by a concurrent refresh.
	pub fn coalesced(&self) -> u64 {
		self.coalesced.load(Ordering::Relaxed)
	}

	pub(crate) fn record_exchange(&self) {
		self.exchanges.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_exchange_failure(&self) {
		self.exchange_failures.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_refresh(&self) {
		self.refreshes.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_coalesced(&self) {
		self.coalesced.fetch_add(1, Ordering::Relaxed);
	}
}

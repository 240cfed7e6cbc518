// self
use crate::obs::{FlowKind, FlowOutcome};

/// Why the realtime channel discarded an inbound frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DropReason {
	/// The STOMP frame itself could not be decoded.
	UndecodableFrame,
	/// The frame decoded but its body did not match the subscriber's event type.
	MalformedEvent,
}
impl DropReason {
	/// Returns the `reason` label value.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::UndecodableFrame => "undecodable_frame",
			Self::MalformedEvent => "malformed_event",
		}
	}
}

/// Increments `session_bridge_flow_total` for `kind` + `outcome` (when enabled).
pub fn record_flow_outcome(kind: FlowKind, outcome: FlowOutcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"session_bridge_flow_total",
			"flow" => kind.as_str(),
			"outcome" => outcome.as_str()
		)
		.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (kind, outcome);
	}
}

/// Increments `session_bridge_realtime_dropped_total` for `reason` (when enabled).
pub fn record_realtime_drop(reason: DropReason) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!("session_bridge_realtime_dropped_total", "reason" => reason.as_str())
			.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = reason;
	}
}

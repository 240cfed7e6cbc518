//! Optional observability helpers for bridge flows.
//!
//! # Feature Flags
//!
//! - Enable `tracing` (on by default) to emit structured spans named `session_bridge.flow` with
//!   the `flow` and `stage` (call site) fields, plus the log events the bridge writes.
//! - Enable `metrics` to increment the `session_bridge_flow_total` counter for every
//!   attempt/success/failure/skip, labeled by `flow` + `outcome`, and the
//!   `session_bridge_realtime_dropped_total` counter for inbound frames the channel discards.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Emits a `tracing` event when the feature is enabled.
///
/// Without the feature the field values are still borrowed, so bindings that only feed log
/// events stay used.
macro_rules! emit {
	($level:ident, $($arg:tt)+) => {{
		#[cfg(feature = "tracing")]
		::tracing::$level!($($arg)+);
		#[cfg(not(feature = "tracing"))]
		$crate::obs::emit!(@discard $($arg)+);
	}};
	(@discard) => {{}};
	(@discard $key:ident = %$value:expr $(, $($rest:tt)*)?) => {{
		let _ = &$value;
		$crate::obs::emit!(@discard $($($rest)*)?);
	}};
	(@discard $key:ident = ?$value:expr $(, $($rest:tt)*)?) => {{
		let _ = &$value;
		$crate::obs::emit!(@discard $($($rest)*)?);
	}};
	(@discard $key:ident = $value:expr $(, $($rest:tt)*)?) => {{
		let _ = &$value;
		$crate::obs::emit!(@discard $($($rest)*)?);
	}};
	(@discard $key:ident $(, $($rest:tt)*)?) => {{
		let _ = &$key;
		$crate::obs::emit!(@discard $($($rest)*)?);
	}};
	(@discard $message:literal $(, $arg:expr)* $(,)?) => {{
		$(let _ = &$arg;)*
	}};
}
pub(crate) use emit;

/// Flow kinds observed by the bridge.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowKind {
	/// Passive exchange triggered by a session lifecycle event.
	Exchange,
	/// On-demand refresh triggered by a rejected call.
	Refresh,
	/// A gateway call, including its retry.
	Gateway,
	/// Realtime connection attempts.
	Realtime,
}
impl FlowKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowKind::Exchange => "exchange",
			FlowKind::Refresh => "refresh",
			FlowKind::Gateway => "gateway",
			FlowKind::Realtime => "realtime",
		}
	}
}
impl Display for FlowKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowOutcome {
	/// Entry to a bridge helper.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure converted into state or returned to the caller.
	Failure,
	/// The guard decided no work was needed.
	Skipped,
}
impl FlowOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowOutcome::Attempt => "attempt",
			FlowOutcome::Success => "success",
			FlowOutcome::Failure => "failure",
			FlowOutcome::Skipped => "skipped",
		}
	}
}
impl Display for FlowOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn emit_accepts_every_field_shape() {
		let err = Error::MissingSession;
		let attempt = 2_u32;

		emit!(warn, error = %err, attempt, detail = ?attempt, endpoint = "/api", "flow event");
		emit!(debug, "plain message");
	}
}

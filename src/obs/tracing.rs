// self
use crate::{
	_prelude::*,
	obs::{self, FlowKind, FlowOutcome},
};

/// Future returned by [`FlowSpan::instrument`]; instrumented only when tracing is enabled.
#[cfg(feature = "tracing")]
pub type InstrumentedFlow<F> = tracing::instrument::Instrumented<F>;
/// Future returned by [`FlowSpan::instrument`]; instrumented only when tracing is enabled.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedFlow<F> = F;

/// One observed run of a bridge flow.
///
/// Starting the span counts an attempt; [`FlowSpan::finish`] stamps the `outcome` field on the
/// span and counts the outcome, so logs and the flow counter always agree.
#[derive(Clone, Debug)]
pub struct FlowSpan {
	kind: FlowKind,
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl FlowSpan {
	/// Opens a `session_bridge.flow` span for `kind` at `stage` and records the attempt.
	pub fn start(kind: FlowKind, stage: &'static str) -> Self {
		obs::record_flow_outcome(kind, FlowOutcome::Attempt);

		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!(
				"session_bridge.flow",
				flow = kind.as_str(),
				stage,
				outcome = tracing::field::Empty
			);

			Self { kind, span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = stage;

			Self { kind }
		}
	}

	/// Records the terminal outcome of this run.
	pub fn finish(&self, outcome: FlowOutcome) {
		#[cfg(feature = "tracing")]
		self.span.record("outcome", outcome.as_str());

		obs::record_flow_outcome(self.kind, outcome);
	}

	/// Records success or failure from `result`.
	pub fn finish_with<T>(&self, result: &Result<T>) {
		self.finish(if result.is_ok() { FlowOutcome::Success } else { FlowOutcome::Failure });
	}

	/// Runs `fut` inside the span without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedFlow<Fut>
	where
		Fut: Future,
	{
		#[cfg(feature = "tracing")]
		{
			use tracing::Instrument;

			fut.instrument(self.span.clone())
		}
		#[cfg(not(feature = "tracing"))]
		{
			fut
		}
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[tokio::test]
	async fn refresh_span_wraps_the_exchange_and_records_its_result() {
		let span = FlowSpan::start(FlowKind::Refresh, "refresh");
		let result: Result<u8> = span.instrument(async { Err(Error::MissingSession) }).await;

		span.finish_with(&result);

		assert!(matches!(result, Err(Error::MissingSession)));
	}
}

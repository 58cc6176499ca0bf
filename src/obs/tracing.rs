// self
use crate::{_prelude::*, obs::FlowKind};

/// Future returned by [`FlowSpan::instrument`]; the bare future when `tracing` is off.
#[cfg(feature = "tracing")]
pub type InstrumentedFlow<F> = tracing::instrument::Instrumented<F>;
/// Future returned by [`FlowSpan::instrument`]; the bare future when `tracing` is off.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedFlow<F> = F;

/// `leadgen_broker.flow` span with `flow`, `stage`, and an optional `subject` field.
///
/// `subject` names what the flow acts on: the app for token flows, the Graph path for reads.
#[derive(Clone, Debug)]
pub struct FlowSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl FlowSpan {
	/// Opens a span for `kind` at call site `stage`.
	pub fn new(kind: FlowKind, stage: &'static str) -> Self {
		#[cfg(feature = "tracing")]
		{
			Self {
				span: tracing::info_span!(
					"leadgen_broker.flow",
					flow = kind.as_str(),
					stage,
					subject = tracing::field::Empty
				),
			}
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (kind, stage);

			Self {}
		}
	}

	/// Records the `subject` field.
	pub fn with_subject(self, subject: impl Display) -> Self {
		#[cfg(feature = "tracing")]
		self.span.record("subject", tracing::field::display(&subject));
		#[cfg(not(feature = "tracing"))]
		let _ = subject;

		self
	}

	/// Enters the span for a synchronous section.
	pub fn entered(self) -> FlowSpanGuard {
		#[cfg(feature = "tracing")]
		{
			FlowSpanGuard { _entered: self.span.entered() }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = self;

			FlowSpanGuard {}
		}
	}

	/// Runs `fut` inside the span; no guard is held across `.await`.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedFlow<Fut>
	where
		Fut: Future,
	{
		#[cfg(feature = "tracing")]
		{
			tracing::Instrument::instrument(fut, self.span.clone())
		}
		#[cfg(not(feature = "tracing"))]
		{
			fut
		}
	}
}

/// Keeps a [`FlowSpan`] entered until dropped.
pub struct FlowSpanGuard {
	#[cfg(feature = "tracing")]
	_entered: tracing::span::EnteredSpan,
}
impl Debug for FlowSpanGuard {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("FlowSpanGuard")
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn subject_can_be_recorded_before_entering() {
		let _guard = FlowSpan::new(FlowKind::Authorize, "start_authorization")
			.with_subject("1234567890")
			.entered();
	}

	#[tokio::test]
	async fn instrumented_future_keeps_its_output() {
		let span = FlowSpan::new(FlowKind::GraphRead, "lead").with_subject("/v17.0/444");

		assert_eq!(span.instrument(async { "lead" }).await, "lead");
	}
}

// self
use crate::{
	obs::{FlowKind, FlowOutcome},
	webhook::DeliveryStage,
};

/// Bumps `leadgen_broker_flow_total{flow,outcome}` when the `metrics` feature is on.
pub fn record_flow_outcome(kind: FlowKind, outcome: FlowOutcome) {
	#[cfg(feature = "metrics")]
	metrics::counter!(
		"leadgen_broker_flow_total",
		"flow" => kind.as_str(),
		"outcome" => outcome.as_str()
	)
	.increment(1);
	#[cfg(not(feature = "metrics"))]
	let _ = (kind, outcome);
}

/// Bumps `leadgen_broker_webhook_deliveries_total{stage}` with the furthest stage a delivery
/// reached, and adds its emitted events to `leadgen_broker_lead_events_total`.
pub fn record_delivery(stage: DeliveryStage, dispatched: usize) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!("leadgen_broker_webhook_deliveries_total", "stage" => stage.as_str())
			.increment(1);
		metrics::counter!("leadgen_broker_lead_events_total").increment(dispatched as u64);
	}
	#[cfg(not(feature = "metrics"))]
	let _ = (stage, dispatched);
}

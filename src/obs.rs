//! Optional observability helpers for OAuth flows, Graph reads, and webhook deliveries.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit structured spans named `leadgen_broker.flow` with the `flow` and
//!   `stage` (call site) fields.
//! - Enable `metrics` to increment the `leadgen_broker_flow_total` counter for every
//!   attempt/success/failure, labeled by `flow` + `outcome`.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Flow kinds observed by the service.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowKind {
	/// Authorization URL construction and callback handling.
	Authorize,
	/// Authorization code exchange against the token endpoint.
	ExchangeCode,
	/// Token refresh (re-authorization or `fb_exchange_token`).
	Refresh,
	/// Local token status evaluation.
	StatusCheck,
	/// Webhook subscription handshake.
	WebhookHandshake,
	/// Signed webhook delivery.
	WebhookDelivery,
	/// Lead detail lookup performed during dispatch.
	LeadEnrichment,
	/// Any other Graph API read (forms, pages).
	GraphRead,
}
impl FlowKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowKind::Authorize => "authorize",
			FlowKind::ExchangeCode => "exchange_code",
			FlowKind::Refresh => "refresh",
			FlowKind::StatusCheck => "status_check",
			FlowKind::WebhookHandshake => "webhook_handshake",
			FlowKind::WebhookDelivery => "webhook_delivery",
			FlowKind::LeadEnrichment => "lead_enrichment",
			FlowKind::GraphRead => "graph_read",
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
	/// Entry to a flow helper.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
}
impl FlowOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowOutcome::Attempt => "attempt",
			FlowOutcome::Success => "success",
			FlowOutcome::Failure => "failure",
		}
	}
}
impl Display for FlowOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

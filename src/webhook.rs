//! Webhook intake: subscription handshake, signed deliveries, and lead dispatch.
//!
//! A delivery moves through `RECEIVED -> VERIFIED -> PARSED -> DISPATCHED` and may be
//! `REJECTED` at the signature or structure gate. Once the signature verifies the delivery is
//! always acknowledged; entry failures, unmatched leads, and enrichment failures are recorded in
//! the [`DeliveryReport`] and [`DeliveryMetrics`] instead of failing the request.

pub mod dispatch;
pub mod event;
pub mod handshake;
pub mod payload;
pub mod signature;
pub mod subscription;

mod metrics;

pub use dispatch::{DispatchOutcome, EnrichFuture, Enrichment, LeadEnricher};
pub use event::*;
pub use handshake::*;
pub use metrics::*;
pub use payload::*;
pub use signature::*;
pub use subscription::*;

// crates.io
use tokio::sync::mpsc::{self, UnboundedReceiver};
// self
use crate::{
	_prelude::*,
	auth::Secret,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	webhook::dispatch::Dispatcher,
};

/// Furthest state a delivery reached.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStage {
	/// Body accepted for processing.
	Received,
	/// Signature verified.
	Verified,
	/// Body parsed; nothing was emitted.
	Parsed,
	/// At least one lead event was emitted.
	Dispatched,
	/// Body refused at the signature or structure gate.
	Rejected,
}
impl DeliveryStage {
	/// Stable label used in reports and metrics.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Received => "received",
			Self::Verified => "verified",
			Self::Parsed => "parsed",
			Self::Dispatched => "dispatched",
			Self::Rejected => "rejected",
		}
	}
}

/// Summary of one processed delivery.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DeliveryReport {
	/// Furthest stage reached.
	pub stage: DeliveryStage,
	/// Emitted lead events.
	pub dispatched: usize,
	/// Events emitted without enrichment after an enrichment failure.
	pub degraded: usize,
	/// Notifications no enabled subscription accepted.
	pub unmatched: usize,
	/// Notifications repeating a recently dispatched lead.
	pub duplicates: usize,
	/// Ignored changes or objects.
	pub ignored: usize,
	/// Isolated entry failures.
	pub failures: Vec<EntryFailure>,
	/// Reason for a structural rejection.
	pub rejection: Option<String>,
}
impl DeliveryReport {
	fn new(stage: DeliveryStage) -> Self {
		Self {
			stage,
			dispatched: 0,
			degraded: 0,
			unmatched: 0,
			duplicates: 0,
			ignored: 0,
			failures: Vec::new(),
			rejection: None,
		}
	}
}

/// Verifies, parses, and dispatches webhook traffic.
pub struct WebhookReceiver {
	app_secret: RwLock<Option<Secret>>,
	dispatcher: Dispatcher,
}
impl WebhookReceiver {
	/// Creates a receiver and the consumer end of its lead-event channel.
	///
	/// Without an `enricher` every event carries the inline summary only.
	pub fn new(
		app_secret: Option<Secret>,
		registry: Arc<SubscriptionRegistry>,
		enricher: Option<Arc<dyn LeadEnricher>>,
	) -> (Self, UnboundedReceiver<LeadEvent>) {
		let (events, consumer) = mpsc::unbounded_channel();
		let dispatcher =
			Dispatcher { registry, enricher, events, metrics: Arc::new(DeliveryMetrics::default()) };

		(Self { app_secret: RwLock::new(app_secret.filter(|s| !s.is_blank())), dispatcher }, consumer)
	}

	/// Subscription registry shared with operators.
	pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
		&self.dispatcher.registry
	}

	/// Delivery counters.
	pub fn metrics(&self) -> &Arc<DeliveryMetrics> {
		&self.dispatcher.metrics
	}

	/// Replaces the signing key after a configuration reload.
	pub fn update_app_secret(&self, app_secret: Option<Secret>) {
		*self.app_secret.write() = app_secret.filter(|s| !s.is_blank());
	}

	/// Answers a subscription verification request.
	pub fn handshake(&self, query: &HandshakeQuery) -> HandshakeOutcome {
		let _span = FlowSpan::new(FlowKind::WebhookHandshake, "handshake").entered();
		let outcome = handshake::evaluate(self.registry(), query, OffsetDateTime::now_utc());

		match &outcome {
			HandshakeOutcome::Accepted { subscription, .. } => {
				self.metrics().record_handshake(true);
				obs::record_flow_outcome(FlowKind::WebhookHandshake, FlowOutcome::Success);

				#[cfg(feature = "tracing")]
				tracing::info!(%subscription, "Webhook subscription verified.");
				#[cfg(not(feature = "tracing"))]
				let _ = subscription;
			},
			HandshakeOutcome::Rejected(rejection) => {
				self.metrics().record_handshake(false);
				obs::record_flow_outcome(FlowKind::WebhookHandshake, FlowOutcome::Failure);

				#[cfg(feature = "tracing")]
				tracing::warn!(reason = rejection.as_str(), "Webhook handshake rejected.");
				#[cfg(not(feature = "tracing"))]
				let _ = rejection;
			},
		}

		outcome
	}

	/// Processes one signed delivery.
	///
	/// Returns [`Error::SignatureInvalid`] when the signature does not verify (or no app secret
	/// is configured); nothing in the body is looked at in that case. Every other outcome is an
	/// `Ok` report, including structurally malformed bodies.
	pub async fn receive(&self, signature: Option<&str>, body: &[u8]) -> Result<DeliveryReport> {
		let span = FlowSpan::new(FlowKind::WebhookDelivery, "receive");

		obs::record_flow_outcome(FlowKind::WebhookDelivery, FlowOutcome::Attempt);
		self.metrics().record_received();

		let result = span.instrument(self.process(signature, body)).await;

		match &result {
			Ok(report) if report.stage != DeliveryStage::Rejected =>
				obs::record_flow_outcome(FlowKind::WebhookDelivery, FlowOutcome::Success),
			_ => {
				self.metrics().record_rejected();
				obs::record_flow_outcome(FlowKind::WebhookDelivery, FlowOutcome::Failure);
			},
		}

		match &result {
			Ok(report) => obs::record_delivery(report.stage, report.dispatched),
			Err(_) => obs::record_delivery(DeliveryStage::Rejected, 0),
		}

		result
	}

	async fn process(&self, signature: Option<&str>, body: &[u8]) -> Result<DeliveryReport> {
		let app_secret = self.app_secret.read().clone();
		let Some(app_secret) = app_secret else {
			#[cfg(feature = "tracing")]
			tracing::error!("Webhook delivery refused: no app secret is configured.");

			return Err(Error::SignatureInvalid { reason: "app secret is not configured" });
		};

		if let Err(e) = signature::verify_signature(&app_secret, body, signature) {
			#[cfg(feature = "tracing")]
			tracing::warn!(error = %e, "Webhook delivery failed signature verification.");

			return Err(e);
		}

		let parsed = match payload::parse_delivery(body) {
			Ok(parsed) => parsed,
			Err(e) => {
				#[cfg(feature = "tracing")]
				tracing::warn!(error = %e, "Webhook delivery is malformed.");

				let mut report = DeliveryReport::new(DeliveryStage::Rejected);

				report.rejection = Some(e.to_string());

				return Ok(report);
			},
		};
		let mut report = DeliveryReport::new(DeliveryStage::Parsed);

		report.ignored = parsed.ignored;

		if !parsed.failures.is_empty() {
			self.metrics().record_entry_failures(parsed.failures.len());

			#[cfg(feature = "tracing")]
			for failure in &parsed.failures {
				tracing::warn!(entry = failure.index, reason = %failure.reason, "Webhook entry skipped.");
			}
		}

		report.failures = parsed.failures;

		for notification in &parsed.notifications {
			match self.dispatcher.dispatch(notification).await {
				DispatchOutcome::Unmatched => report.unmatched += 1,
				DispatchOutcome::Duplicate => report.duplicates += 1,
				DispatchOutcome::Degraded => {
					report.degraded += 1;
					report.dispatched += 1;
				},
				DispatchOutcome::Enriched | DispatchOutcome::Summary => report.dispatched += 1,
			}
		}

		if report.dispatched > 0 {
			report.stage = DeliveryStage::Dispatched;
		}

		#[cfg(feature = "tracing")]
		tracing::info!(
			dispatched = report.dispatched,
			degraded = report.degraded,
			unmatched = report.unmatched,
			duplicates = report.duplicates,
			failures = report.failures.len(),
			"Webhook delivery processed."
		);

		Ok(report)
	}
}
impl Debug for WebhookReceiver {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("WebhookReceiver")
			.field("has_app_secret", &self.app_secret.read().is_some())
			.field("metrics", self.metrics())
			.finish()
	}
}

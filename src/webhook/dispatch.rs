//! Per-notification dispatch: subscription matching, optional enrichment, and emission.

// crates.io
use tokio::sync::mpsc::UnboundedSender;
// self
use crate::{
	_prelude::*,
	http::ProviderHttpClient,
	oauth::TransportErrorMapper,
	provider::{GraphClient, LeadDetail, LeadForm},
	webhook::{DeliveryMetrics, LeadEvent, LeadNotification, SubscriptionRegistry},
};

/// Boxed future returned by [`LeadEnricher::enrich`].
pub type EnrichFuture<'a> = Pin<Box<dyn Future<Output = Result<Enrichment>> + 'a + Send>>;

/// Data fetched from the provider for one notification.
#[derive(Clone, Debug)]
pub struct Enrichment {
	/// Lead detail.
	pub lead: LeadDetail,
	/// Form metadata; `None` when the lookup failed.
	pub form: Option<LeadForm>,
}

/// Fetches lead details for a notification.
///
/// Implementations read the stored token; a missing or expired token surfaces as an error and
/// the dispatcher degrades to the inline summary.
pub trait LeadEnricher
where
	Self: Send + Sync,
{
	/// Looks up the lead (and its form) behind `notification`.
	fn enrich<'a>(&'a self, notification: &'a LeadNotification) -> EnrichFuture<'a>;
}
impl<C, M> LeadEnricher for GraphClient<C, M>
where
	C: ?Sized + ProviderHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn enrich<'a>(&'a self, notification: &'a LeadNotification) -> EnrichFuture<'a> {
		Box::pin(async move {
			let lead = self.lead(&notification.leadgen_id).await?;
			let form = match self.form(&notification.form_id).await {
				Ok(form) => Some(form),
				Err(e) => {
					#[cfg(feature = "tracing")]
					tracing::debug!(form_id = %notification.form_id, error = %e, "Form lookup failed.");
					#[cfg(not(feature = "tracing"))]
					let _ = e;

					None
				},
			};

			Ok(Enrichment { lead, form })
		})
	}
}

/// What happened to one notification.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatchOutcome {
	/// Emitted with lead details.
	Enriched,
	/// Emitted with the inline summary because the subscription asks for it.
	Summary,
	/// Emitted with the inline summary because enrichment failed.
	Degraded,
	/// No enabled subscription accepts the page/form pair.
	Unmatched,
	/// The lead was dispatched recently; nothing was emitted.
	Duplicate,
}

pub(crate) struct Dispatcher {
	pub(crate) registry: Arc<SubscriptionRegistry>,
	pub(crate) enricher: Option<Arc<dyn LeadEnricher>>,
	pub(crate) events: UnboundedSender<LeadEvent>,
	pub(crate) metrics: Arc<DeliveryMetrics>,
}
impl Dispatcher {
	pub(crate) async fn dispatch(&self, notification: &LeadNotification) -> DispatchOutcome {
		let Some(subscription) = self.registry.match_lead(&notification.page_id, &notification.form_id)
		else {
			self.metrics.record_unmatched();

			#[cfg(feature = "tracing")]
			tracing::warn!(
				lead_id = %notification.leadgen_id,
				page_id = %notification.page_id,
				form_id = %notification.form_id,
				"No enabled subscription for lead."
			);

			return DispatchOutcome::Unmatched;
		};

		if !self.registry.claim_lead(&notification.leadgen_id) {
			self.metrics.record_duplicate();

			#[cfg(feature = "tracing")]
			tracing::info!(lead_id = %notification.leadgen_id, "Repeated lead skipped.");

			return DispatchOutcome::Duplicate;
		}

		let summary = LeadEvent::summary(subscription.name.clone(), notification);
		let (event, outcome) = match (&self.enricher, subscription.simplify_output) {
			(Some(enricher), false) => match enricher.enrich(notification).await {
				Ok(Enrichment { lead, form }) => (summary.enrich(lead, form), DispatchOutcome::Enriched),
				Err(e) => {
					self.metrics.record_degraded();

					#[cfg(feature = "tracing")]
					tracing::warn!(
						lead_id = %notification.leadgen_id,
						error = %e,
						"Lead enrichment failed; emitting the inline summary."
					);
					#[cfg(not(feature = "tracing"))]
					let _ = e;

					(summary, DispatchOutcome::Degraded)
				},
			},
			_ => (summary, DispatchOutcome::Summary),
		};

		self.registry.record_lead(&subscription.name, OffsetDateTime::now_utc());
		self.metrics.record_dispatched();

		if self.events.send(event).is_err() {
			#[cfg(feature = "tracing")]
			tracing::warn!(
				lead_id = %notification.leadgen_id,
				"Lead event consumer is gone; event dropped."
			);
		}

		outcome
	}
}

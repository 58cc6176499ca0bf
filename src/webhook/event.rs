//! Normalized lead events handed to consumers.

// crates.io
use time::macros::format_description;
// self
use crate::{
	_prelude::*,
	auth::{FormId, LeadId, PageId, SubscriptionName},
	provider::{LeadDetail, LeadForm},
	webhook::LeadNotification,
};

/// A lead ready for downstream processing.
///
/// Built per notification and never persisted. `enriched` tells whether the lead-detail API
/// contributed `field_data` and the ad names; un-enriched events carry the inline summary only.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LeadEvent {
	/// Lead identifier.
	pub lead_id: LeadId,
	/// Subscription that accepted the lead.
	pub subscription: SubscriptionName,
	/// Answers keyed by question, one value each.
	pub field_data: BTreeMap<String, Option<String>>,
	/// Form the lead was submitted through.
	pub form_id: FormId,
	/// Page owning the form.
	pub page_id: PageId,
	/// Ad that produced the lead.
	pub ad_id: Option<String>,
	/// Ad display name.
	pub ad_name: Option<String>,
	/// Ad set that produced the lead.
	pub adset_id: Option<String>,
	/// Ad set display name.
	pub adset_name: Option<String>,
	/// Campaign that produced the lead.
	pub campaign_id: Option<String>,
	/// Campaign display name.
	pub campaign_name: Option<String>,
	/// Submission time.
	#[serde(with = "time::serde::rfc3339::option")]
	pub created_time: Option<OffsetDateTime>,
	/// Form metadata, when it could be fetched.
	pub form: Option<LeadForm>,
	/// Whether the lead-detail API contributed to this event.
	pub enriched: bool,
}
impl LeadEvent {
	/// Builds an event from the inline notification only.
	pub fn summary(subscription: SubscriptionName, notification: &LeadNotification) -> Self {
		Self {
			lead_id: notification.leadgen_id.clone(),
			subscription,
			field_data: BTreeMap::new(),
			form_id: notification.form_id.clone(),
			page_id: notification.page_id.clone(),
			ad_id: notification.ad_id.clone().or_else(|| notification.adgroup_id.clone()),
			ad_name: None,
			adset_id: None,
			adset_name: None,
			campaign_id: None,
			campaign_name: None,
			created_time: notification.created_time,
			form: None,
			enriched: false,
		}
	}

	/// Merges lead detail (and optional form metadata) into a summary event.
	///
	/// The notification's ad id and submission time win when both sides carry one; ad set and
	/// campaign come from the detail only.
	pub fn enrich(mut self, lead: LeadDetail, form: Option<LeadForm>) -> Self {
		self.field_data = lead.simplified();
		self.ad_id = self.ad_id.or(lead.ad_id);
		self.ad_name = lead.ad_name;
		self.adset_id = lead.adset_id;
		self.adset_name = lead.adset_name;
		self.campaign_id = lead.campaign_id;
		self.campaign_name = lead.campaign_name;
		self.created_time =
			self.created_time.or_else(|| lead.created_time.as_deref().and_then(parse_graph_time));
		self.form = form;
		self.enriched = true;

		self
	}
}

/// Parses Graph timestamps such as `2025-01-01T10:00:00+0000`.
fn parse_graph_time(raw: &str) -> Option<OffsetDateTime> {
	let format = format_description!(
		"[year]-[month]-[day]T[hour]:[minute]:[second][offset_hour sign:mandatory][offset_minute]"
	);

	OffsetDateTime::parse(raw, format).ok()
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros::datetime;
	// self
	use super::*;
	use crate::provider::LeadFieldValue;

	fn notification() -> LeadNotification {
		serde_json::from_str(r#"{"leadgen_id":"444","page_id":"111","form_id":"222","adgroup_id":"77"}"#)
			.expect("Notification fixture should deserialize.")
	}

	fn subscription() -> SubscriptionName {
		SubscriptionName::new("spring").expect("Subscription fixture should be valid.")
	}

	#[test]
	fn summary_carries_inline_fields_only() {
		let event = LeadEvent::summary(subscription(), &notification());

		assert!(!event.enriched);
		assert!(event.field_data.is_empty());
		assert_eq!(event.ad_id.as_deref(), Some("77"));
		assert_eq!(event.adset_id, None);
		assert_eq!(event.created_time, None);
	}

	#[test]
	fn explicit_ad_id_wins_over_legacy_alias() {
		let notification: LeadNotification = serde_json::from_str(
			r#"{"leadgen_id":"444","page_id":"111","form_id":"222","ad_id":"444","adgroup_id":"445"}"#,
		)
		.expect("Notification fixture should deserialize.");
		let event = LeadEvent::summary(subscription(), &notification);

		assert_eq!(event.ad_id.as_deref(), Some("444"));
		assert_eq!(event.adset_id, None);
	}

	#[test]
	fn enrichment_fills_gaps_from_lead_detail() {
		let lead = LeadDetail {
			id: LeadId::new("444").expect("Lead fixture should be valid."),
			created_time: Some("2025-01-01T10:00:00+0000".into()),
			ad_id: Some("9".into()),
			ad_name: Some("Spring ad".into()),
			adset_id: Some("88".into()),
			adset_name: Some("Spring set".into()),
			campaign_id: Some("66".into()),
			campaign_name: Some("Spring launch".into()),
			form_id: None,
			field_data: vec![LeadFieldValue { name: "email".into(), values: vec!["a@b.c".into()] }],
		};
		let event = LeadEvent::summary(subscription(), &notification()).enrich(lead, None);

		assert!(event.enriched);
		assert_eq!(event.ad_id.as_deref(), Some("77"));
		assert_eq!(event.adset_id.as_deref(), Some("88"));
		assert_eq!(event.campaign_id.as_deref(), Some("66"));
		assert_eq!(event.campaign_name.as_deref(), Some("Spring launch"));
		assert_eq!(event.ad_name.as_deref(), Some("Spring ad"));
		assert_eq!(event.created_time, Some(datetime!(2025-01-01 10:00:00 UTC)));
		assert_eq!(event.field_data.get("email"), Some(&Some("a@b.c".to_owned())));
	}
}

//! Webhook subscriptions and their shared registry.

// std
use std::collections::{HashSet, VecDeque};
// crates.io
use rand::{Rng, distr::Alphanumeric};
// self
use crate::{
	_prelude::*,
	auth::{FormId, LeadId, PageId, SubscriptionName},
	config::SubscriptionSettings,
	error::ConfigError,
};

const VERIFY_TOKEN_LEN: usize = 32;
/// Number of recently dispatched lead ids remembered for duplicate suppression.
pub const RECENT_LEAD_CAPACITY: usize = 10_000;

/// A named listener for one page/form pair.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookSubscription {
	/// Unique subscription name.
	pub name: SubscriptionName,
	/// Page whose leads are accepted.
	pub page_id: PageId,
	/// Form whose leads are accepted.
	pub form_id: FormId,
	/// Token the provider echoes during the subscription handshake.
	pub verify_token: String,
	/// Disabled subscriptions neither verify nor receive leads.
	pub enabled: bool,
	/// Leads dispatched through this subscription.
	pub lead_count: u64,
	/// Instant of the most recent dispatched lead.
	#[serde(with = "time::serde::rfc3339::option")]
	pub last_lead_received_at: Option<OffsetDateTime>,
	/// Emit the inline summary only, skipping the lead-detail API.
	pub simplify_output: bool,
	/// Instant of the last successful handshake for the current verify token.
	#[serde(with = "time::serde::rfc3339::option")]
	pub verified_at: Option<OffsetDateTime>,
	/// Creation instant.
	#[serde(with = "time::serde::rfc3339")]
	pub created_at: OffsetDateTime,
}
impl WebhookSubscription {
	fn from_settings(
		settings: &SubscriptionSettings,
		now: OffsetDateTime,
	) -> Result<Self, ConfigError> {
		let (name, page_id, form_id) = settings.validate()?;
		let verify_token = settings
			.verify_token
			.as_deref()
			.filter(|token| !token.is_empty())
			.map(ToOwned::to_owned)
			.unwrap_or_else(generate_verify_token);

		Ok(Self {
			name,
			page_id,
			form_id,
			verify_token,
			enabled: settings.enabled,
			lead_count: 0,
			last_lead_received_at: None,
			simplify_output: settings.simplify_output,
			verified_at: None,
			created_at: now,
		})
	}

	fn accepts(&self, page_id: &PageId, form_id: &FormId) -> bool {
		self.enabled && &self.page_id == page_id && &self.form_id == form_id
	}
}

/// Generates a fresh 32-character alphanumeric verify token.
pub fn generate_verify_token() -> String {
	rand::rng().sample_iter(Alphanumeric).take(VERIFY_TOKEN_LEN).map(char::from).collect()
}

/// Bounded set of lead ids, evicting the oldest first.
#[derive(Debug)]
struct RecentLeads {
	capacity: usize,
	order: VecDeque<LeadId>,
	ids: HashSet<LeadId>,
}
impl RecentLeads {
	fn new(capacity: usize) -> Self {
		Self { capacity, order: VecDeque::new(), ids: HashSet::new() }
	}

	fn insert(&mut self, lead_id: &LeadId) -> bool {
		if self.capacity == 0 || !self.ids.insert(lead_id.clone()) {
			return false;
		}

		self.order.push_back(lead_id.clone());

		while self.order.len() > self.capacity {
			if let Some(evicted) = self.order.pop_front() {
				self.ids.remove(&evicted);
			}
		}

		true
	}
}
impl Default for RecentLeads {
	fn default() -> Self {
		Self::new(RECENT_LEAD_CAPACITY)
	}
}

/// Thread-safe registry of [`WebhookSubscription`]s.
///
/// Every mutation happens under one lock so concurrent deliveries never lose a counter update.
/// The registry also remembers the last [`RECENT_LEAD_CAPACITY`] claimed lead ids so provider
/// retries are emitted once.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
	inner: Mutex<BTreeMap<SubscriptionName, WebhookSubscription>>,
	recent: Mutex<RecentLeads>,
}
impl SubscriptionRegistry {
	/// Builds a registry from configured entries.
	pub fn from_settings(settings: &[SubscriptionSettings]) -> Result<Self, ConfigError> {
		let registry = Self::default();

		for entry in settings {
			registry.create(entry)?;
		}

		Ok(registry)
	}

	/// Registers a new subscription, generating a verify token unless one is supplied.
	pub fn create(&self, settings: &SubscriptionSettings) -> Result<WebhookSubscription, ConfigError> {
		let subscription = WebhookSubscription::from_settings(settings, OffsetDateTime::now_utc())?;
		let mut inner = self.inner.lock();

		if inner.contains_key(&subscription.name) {
			return Err(ConfigError::DuplicateSubscription { name: settings.name.clone() });
		}

		inner.insert(subscription.name.clone(), subscription.clone());

		Ok(subscription)
	}

	/// Reconciles the registry with a reloaded configuration.
	///
	/// Existing subscriptions keep their counters, handshake state, and generated verify token;
	/// entries missing from `settings` are removed.
	pub fn apply_settings(&self, settings: &[SubscriptionSettings]) -> Result<(), ConfigError> {
		let now = OffsetDateTime::now_utc();
		let mut next = BTreeMap::new();

		for entry in settings {
			let fresh = WebhookSubscription::from_settings(entry, now)?;

			if next.contains_key(&fresh.name) {
				return Err(ConfigError::DuplicateSubscription { name: entry.name.clone() });
			}

			next.insert(fresh.name.clone(), fresh);
		}

		let mut inner = self.inner.lock();

		for (name, fresh) in next.iter_mut() {
			let Some(current) = inner.get(name) else { continue };
			let pinned = entry_token(settings, name);

			fresh.lead_count = current.lead_count;
			fresh.last_lead_received_at = current.last_lead_received_at;
			fresh.created_at = current.created_at;

			if pinned.is_none() || pinned == Some(current.verify_token.as_str()) {
				fresh.verify_token = current.verify_token.clone();
				fresh.verified_at = current.verified_at;
			}
		}

		*inner = next;

		Ok(())
	}

	/// Returns a snapshot of one subscription.
	pub fn get(&self, name: &str) -> Option<WebhookSubscription> {
		self.inner.lock().get(name).cloned()
	}

	/// Returns a snapshot of every subscription, ordered by name.
	pub fn list(&self) -> Vec<WebhookSubscription> {
		self.inner.lock().values().cloned().collect()
	}

	/// Replaces the verify token and clears the handshake stamp.
	pub fn regenerate_verify_token(&self, name: &str) -> Result<String> {
		let mut inner = self.inner.lock();
		let subscription = inner
			.get_mut(name)
			.ok_or_else(|| Error::UnknownSubscription { name: name.to_owned() })?;

		subscription.verify_token = generate_verify_token();
		subscription.verified_at = None;

		Ok(subscription.verify_token.clone())
	}

	/// Enables or disables a subscription.
	pub fn set_enabled(&self, name: &str, enabled: bool) -> Result<()> {
		let mut inner = self.inner.lock();
		let subscription = inner
			.get_mut(name)
			.ok_or_else(|| Error::UnknownSubscription { name: name.to_owned() })?;

		subscription.enabled = enabled;

		Ok(())
	}

	/// Finds the enabled subscription whose verify token equals `token` byte for byte.
	pub fn find_by_verify_token(&self, token: &str) -> Option<WebhookSubscription> {
		self.inner
			.lock()
			.values()
			.find(|subscription| subscription.enabled && subscription.verify_token == token)
			.cloned()
	}

	/// Stamps a successful handshake.
	pub fn mark_verified(&self, name: &str, at: OffsetDateTime) {
		if let Some(subscription) = self.inner.lock().get_mut(name) {
			subscription.verified_at = Some(at);
		}
	}

	/// Finds the enabled subscription listening to `page_id`/`form_id`.
	pub fn match_lead(&self, page_id: &PageId, form_id: &FormId) -> Option<WebhookSubscription> {
		self.inner.lock().values().find(|subscription| subscription.accepts(page_id, form_id)).cloned()
	}

	/// Claims `lead_id` for dispatch; `false` when it was claimed recently.
	pub fn claim_lead(&self, lead_id: &LeadId) -> bool {
		self.recent.lock().insert(lead_id)
	}

	/// Counts one dispatched lead and returns the new total.
	pub fn record_lead(&self, name: &str, at: OffsetDateTime) -> Option<u64> {
		let mut inner = self.inner.lock();
		let subscription = inner.get_mut(name)?;

		subscription.lead_count += 1;
		subscription.last_lead_received_at = Some(at);

		Some(subscription.lead_count)
	}
}

fn entry_token<'a>(settings: &'a [SubscriptionSettings], name: &str) -> Option<&'a str> {
	settings
		.iter()
		.find(|entry| entry.name == name)
		.and_then(|entry| entry.verify_token.as_deref())
		.filter(|token| !token.is_empty())
}

//! Operator command surface: the actions an administrator triggers on the integration.
//!
//! [`Operator`] is object safe so the HTTP layer (or any other front end) can hold an
//! `Arc<dyn Operator>` without knowing the transport types behind [`LeadAdsService`].

// crates.io
use tokio::sync::mpsc::UnboundedReceiver;
// self
use crate::{
	_prelude::*,
	auth::{AppCredential, Secret, TokenStatusReport},
	config::{ConfigHandle, ServiceConfig},
	error::ConfigError,
	flows::{self, AuthorizationSession, OAuthClient},
	http::ProviderHttpClient,
	oauth::TransportErrorMapper,
	webhook::{
		EnrichFuture, LeadEnricher, LeadEvent, LeadNotification, SubscriptionRegistry,
		WebhookReceiver, WebhookSubscription,
	},
};

/// Query parameters of the OAuth redirect back to the service.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct AuthorizationCallback {
	/// Authorization code, present on success.
	#[serde(default)]
	pub code: Option<String>,
	/// State issued by [`Operator::authorize`].
	#[serde(default)]
	pub state: Option<String>,
	/// Provider error code, e.g. `access_denied`.
	#[serde(default)]
	pub error: Option<String>,
	/// Provider error detail.
	#[serde(default)]
	pub error_description: Option<String>,
}

/// Boxed future returned by [`Operator`] commands.
pub type OpFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + 'a + Send>>;

/// Named administrative operations.
pub trait Operator
where
	Self: Send + Sync,
{
	/// Starts an authorization session and returns the dialog URL to visit.
	fn authorize(&self) -> Result<AuthorizationSession>;

	/// Redeems an authorization callback and stores the resulting token.
	fn complete_authorization(
		&self,
		callback: AuthorizationCallback,
	) -> OpFuture<'_, TokenStatusReport>;

	/// Reports the stored token's status without contacting the provider.
	fn check_status(&self) -> OpFuture<'_, TokenStatusReport>;

	/// Refreshes the token; usually [`Error::RefreshRequiresUserInteraction`].
	fn refresh(&self) -> OpFuture<'_, TokenStatusReport>;

	/// Replaces a subscription's verify token and returns the new value.
	fn regenerate_verify_token(&self, subscription: &str) -> Result<String>;

	/// Enables or disables a subscription.
	fn set_subscription_enabled(&self, subscription: &str, enabled: bool) -> Result<()>;

	/// Lists subscriptions with their counters.
	fn subscriptions(&self) -> Vec<WebhookSubscription>;

	/// Forgets the stored token.
	fn disconnect(&self) -> OpFuture<'_, ()>;
}

/// The integration service: configuration, token lifecycle, and webhook intake.
pub struct LeadAdsService<C, M>
where
	C: ?Sized + ProviderHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	config: ConfigHandle,
	oauth: OAuthClient<C, M>,
	receiver: Arc<WebhookReceiver>,
}
impl<C, M> LeadAdsService<C, M>
where
	C: ?Sized + ProviderHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Wires the service and returns the consumer end of the lead-event channel.
	///
	/// Lead enrichment reads the token through `oauth`'s store with the credential current at
	/// delivery time.
	pub fn new(
		config: ConfigHandle,
		oauth: OAuthClient<C, M>,
	) -> Result<(Self, UnboundedReceiver<LeadEvent>), ConfigError> {
		let snapshot = config.current();
		let registry = Arc::new(SubscriptionRegistry::from_settings(&snapshot.subscriptions)?);
		let enricher: Arc<dyn LeadEnricher> =
			Arc::new(ConfiguredEnricher { config: config.clone(), oauth: oauth.clone() });
		let (receiver, events) =
			WebhookReceiver::new(signing_secret(&snapshot), registry, Some(enricher));

		Ok((Self { config, oauth, receiver: Arc::new(receiver) }, events))
	}

	/// Shared configuration handle.
	pub fn config(&self) -> &ConfigHandle {
		&self.config
	}

	/// OAuth client driving the token lifecycle.
	pub fn oauth(&self) -> &OAuthClient<C, M> {
		&self.oauth
	}

	/// Webhook receiver fed by the HTTP layer.
	pub fn receiver(&self) -> &Arc<WebhookReceiver> {
		&self.receiver
	}

	/// Re-reads configuration, then applies the new app secret and subscription set.
	///
	/// Nothing changes when the new configuration fails validation.
	pub fn reload_config(&self) -> Result<(), ConfigError> {
		let snapshot = self.config.reload()?;

		self.receiver.registry().apply_settings(&snapshot.subscriptions)?;
		self.receiver.update_app_secret(signing_secret(&snapshot));

		Ok(())
	}

	fn context(&self) -> Result<(AppCredential, Url)> {
		let snapshot = self.config.current();

		if !snapshot.enabled {
			return Err(ConfigError::ServiceDisabled.into());
		}

		Ok((snapshot.credential()?, snapshot.server.redirect_uri()?))
	}
}
impl<C, M> Operator for LeadAdsService<C, M>
where
	C: ?Sized + ProviderHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn authorize(&self) -> Result<AuthorizationSession> {
		let (credential, redirect_uri) = self.context()?;

		Ok(self.oauth.start_authorization(&credential, redirect_uri))
	}

	fn complete_authorization(
		&self,
		callback: AuthorizationCallback,
	) -> OpFuture<'_, TokenStatusReport> {
		Box::pin(async move {
			let (credential, _) = self.context()?;

			if let Some(error) = callback.error {
				let reason = match callback.error_description {
					Some(description) => format!("{error}: {description}"),
					None => error,
				};

				return Err(self.oauth.fail_authorization(
					&credential,
					callback.state.as_deref(),
					reason,
				));
			}

			let state = callback.state.ok_or(Error::InvalidState)?;
			let Some(code) = callback.code.filter(|code| !code.trim().is_empty()) else {
				return Err(self.oauth.fail_authorization(
					&credential,
					Some(&state),
					"authorization code is missing".into(),
				));
			};
			let record = self.oauth.complete_authorization(&credential, &state, &code).await?;

			Ok(flows::check_status(Some(&record)))
		})
	}

	fn check_status(&self) -> OpFuture<'_, TokenStatusReport> {
		Box::pin(self.oauth.token_status())
	}

	fn refresh(&self) -> OpFuture<'_, TokenStatusReport> {
		Box::pin(async move {
			let (credential, redirect_uri) = self.context()?;
			let record = self.oauth.refresh(&credential, &redirect_uri).await?;

			Ok(flows::check_status(Some(&record)))
		})
	}

	fn regenerate_verify_token(&self, subscription: &str) -> Result<String> {
		let token = self.receiver.registry().regenerate_verify_token(subscription)?;

		#[cfg(feature = "tracing")]
		tracing::info!(subscription, "Verify token regenerated.");

		Ok(token)
	}

	fn set_subscription_enabled(&self, subscription: &str, enabled: bool) -> Result<()> {
		self.receiver.registry().set_enabled(subscription, enabled)
	}

	fn subscriptions(&self) -> Vec<WebhookSubscription> {
		self.receiver.registry().list()
	}

	fn disconnect(&self) -> OpFuture<'_, ()> {
		Box::pin(async move {
			self.oauth.store.clear().await?;

			#[cfg(feature = "tracing")]
			tracing::info!("Stored access token cleared.");

			Ok(())
		})
	}
}
impl<C, M> Debug for LeadAdsService<C, M>
where
	C: ?Sized + ProviderHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("LeadAdsService")
			.field("oauth", &self.oauth)
			.field("receiver", &self.receiver)
			.finish()
	}
}

/// Enriches leads with the credential current at call time.
struct ConfiguredEnricher<C, M>
where
	C: ?Sized + ProviderHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	config: ConfigHandle,
	oauth: OAuthClient<C, M>,
}
impl<C, M> LeadEnricher for ConfiguredEnricher<C, M>
where
	C: ?Sized + ProviderHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn enrich<'a>(&'a self, notification: &'a LeadNotification) -> EnrichFuture<'a> {
		Box::pin(async move {
			let credential = self.config.current().credential()?;
			let graph = self.oauth.graph(credential);

			graph.enrich(notification).await
		})
	}
}

fn signing_secret(config: &ServiceConfig) -> Option<Secret> {
	config.enabled.then(|| Secret::new(config.app.app_secret.clone()))
}

//! Token refresh.
//!
//! Graph user tokens carry no refresh token, so refreshing normally means sending the operator
//! through the dialog again: [`OAuthClient::refresh`] answers with
//! [`Error::RefreshRequiresUserInteraction`] and a fresh authorization URL. When the credential
//! enables `token_extension` and the stored token is still usable, the token is instead swapped
//! for a long-lived one with `grant_type=fb_exchange_token`.

mod metrics;

pub use metrics::RefreshMetrics;

// self
use crate::{
	_prelude::*,
	auth::{AppCredential, TokenRecord},
	flows::{
		OAuthClient,
		common::{self, MissingExpiry},
	},
	http::ProviderHttpClient,
	oauth::TransportErrorMapper,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
};

impl<C, M> OAuthClient<C, M>
where
	C: ?Sized + ProviderHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Refreshes the stored token.
	///
	/// Returns [`Error::RefreshRequiresUserInteraction`] unless the lifetime extension applies;
	/// the embedded URL starts a session redirecting to `redirect_uri`.
	pub async fn refresh(
		&self,
		credential: &AppCredential,
		redirect_uri: &Url,
	) -> Result<TokenRecord> {
		const KIND: FlowKind = FlowKind::Refresh;

		let span = FlowSpan::new(KIND, "refresh").with_subject(&credential.app_id);

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);
		self.refresh_metrics.record_attempt();

		let result = span
			.instrument(async move {
				let current = self.store.get().await?;
				let now = OffsetDateTime::now_utc();
				let extendable = current
					.as_ref()
					.filter(|_| credential.token_extension)
					.filter(|record| !record.is_expired_at(now));

				match extendable {
					Some(record) => self.extend_token(credential, record).await,
					None => {
						let session = self.start_authorization(credential, redirect_uri.clone());

						self.refresh_metrics.record_reauthorization();

						Err(Error::RefreshRequiresUserInteraction {
							authorization_url: session.authorization_url,
						})
					},
				}
			})
			.await;

		match &result {
			Ok(_) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Err(Error::RefreshRequiresUserInteraction { .. }) => {},
			Err(_) => {
				self.refresh_metrics.record_failure();
				obs::record_flow_outcome(KIND, FlowOutcome::Failure);
			},
		}

		result
	}

	async fn extend_token(
		&self,
		credential: &AppCredential,
		current: &TokenRecord,
	) -> Result<TokenRecord> {
		let mut form = common::base_form(credential);

		form.insert("grant_type".into(), "fb_exchange_token".into());
		form.insert("fb_exchange_token".into(), current.access_token.expose().to_owned());

		let record = common::request_token(
			self,
			credential,
			FlowKind::Refresh,
			form,
			MissingExpiry::LongLived,
		)
		.await?;

		self.store.put(record.clone()).await?;
		self.refresh_metrics.record_extended();

		#[cfg(feature = "tracing")]
		tracing::info!(
			app_id = %credential.app_id,
			expires_at = ?record.expires_at,
			"Extended access token lifetime."
		);

		Ok(record)
	}
}

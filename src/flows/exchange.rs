//! Authorization code exchange.

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
	/// Exchanges an authorization `code` for an access token and stores it.
	///
	/// One form-encoded POST is sent to the token endpoint. A response without an expiry is a
	/// valid outcome and yields a record with `expires_at = None`. On any failure the stored
	/// record is left as it was.
	pub async fn exchange_code(
		&self,
		credential: &AppCredential,
		code: &str,
		redirect_uri: &Url,
	) -> Result<TokenRecord> {
		const KIND: FlowKind = FlowKind::ExchangeCode;

		let span = FlowSpan::new(KIND, "exchange_code").with_subject(&credential.app_id);

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async move {
				let mut form = common::base_form(credential);

				form.insert("redirect_uri".into(), redirect_uri.to_string());
				form.insert("code".into(), code.to_owned());

				let record =
					common::request_token(self, credential, KIND, form, MissingExpiry::NotReported)
						.await?;

				self.store.put(record.clone()).await?;

				#[cfg(feature = "tracing")]
				tracing::info!(
					app_id = %credential.app_id,
					expires_at = ?record.expires_at,
					"Stored access token from authorization code exchange."
				);

				Ok(record)
			})
			.await;

		match &result {
			Ok(_) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Err(_e) => {
				#[cfg(feature = "tracing")]
				tracing::warn!(error = %_e, "Authorization code exchange failed.");

				obs::record_flow_outcome(KIND, FlowOutcome::Failure);
			},
		}

		result
	}
}

//! Shared helpers for token endpoint calls.

// self
use crate::{
	_prelude::*,
	auth::{AppCredential, TokenRecord},
	error::ConfigError,
	flows::OAuthClient,
	http::ProviderHttpClient,
	oauth::{self, TransportErrorMapper},
	obs::FlowKind,
};

/// How to record a token response that carries no expiry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum MissingExpiry {
	/// The lifetime is unknown.
	NotReported,
	/// The grant is documented to mint long-lived tokens.
	LongLived,
}

/// Form parameters every token request carries.
pub(crate) fn base_form(credential: &AppCredential) -> BTreeMap<String, String> {
	BTreeMap::from([
		("client_id".to_owned(), credential.app_id.to_string()),
		("client_secret".to_owned(), credential.app_secret.expose().to_owned()),
	])
}

/// POSTs `form` to the token endpoint and converts the response into a record.
///
/// Nothing is stored here; callers persist the record once the whole flow succeeded.
pub(crate) async fn request_token<C, M>(
	client: &OAuthClient<C, M>,
	credential: &AppCredential,
	step: FlowKind,
	mut form: BTreeMap<String, String>,
	missing_expiry: MissingExpiry,
) -> Result<TokenRecord>
where
	C: ?Sized + ProviderHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	client.strategy.augment_token_request(step, &mut form);

	let request = oauth::form_post(&credential.access_token_url, &form)?;
	let response = oauth::send(
		client.http_client.as_ref(),
		client.transport_mapper.as_ref(),
		step,
		request,
	)
	.await?;

	if response.is_failure() {
		return Err(oauth::map_error_response(
			client.strategy.as_ref(),
			&credential.app_id,
			step,
			&response,
		));
	}

	let issued = oauth::parse_token_response(step, &response)?;
	let obtained_at = OffsetDateTime::now_utc();
	let mut builder =
		TokenRecord::builder().access_token(issued.access_token.clone()).obtained_at(obtained_at);

	match issued.lifetime()? {
		Some(lifetime) => {
			let expires_at =
				obtained_at.checked_add(lifetime).ok_or(ConfigError::ExpiresInOutOfRange)?;

			builder = builder.expires_at(expires_at);
		},
		None if missing_expiry == MissingExpiry::LongLived => builder = builder.long_lived(),
		None => {},
	}

	builder.build().map_err(|e| ConfigError::from(e).into())
}

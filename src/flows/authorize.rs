//! Authorization URL construction and the single-use `state` handshake.

// crates.io
use oauth2::{AuthUrl, ClientId, CsrfToken, RedirectUrl, Scope, basic::BasicClient};
use rand::{Rng, distr::Alphanumeric};
// self
use crate::{
	_prelude::*,
	auth::{AppCredential, TokenRecord},
	flows::OAuthClient,
	http::ProviderHttpClient,
	oauth::TransportErrorMapper,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
};

const STATE_LEN: usize = 32;

/// How long a generated `state` stays redeemable.
pub const STATE_TTL: Duration = Duration::minutes(10);

/// Authorization handshake metadata returned by [`OAuthClient::start_authorization`].
#[derive(Clone, Debug)]
pub struct AuthorizationSession {
	/// Opaque anti-forgery value that must round-trip via the callback.
	pub state: String,
	/// Redirect URI embedded in the authorization URL.
	pub redirect_uri: Url,
	/// Fully-formed dialog URL the operator should be sent to.
	pub authorization_url: Url,
	/// Instant after which the state is rejected.
	pub expires_at: OffsetDateTime,
}

#[derive(Clone, Debug)]
pub(crate) struct PendingAuthorization {
	redirect_uri: Url,
	expires_at: OffsetDateTime,
}

/// Builds the provider dialog URL.
///
/// Deterministic for a given input: carries `client_id`, `redirect_uri`, `scope`,
/// `response_type=code`, and `state`.
pub fn build_authorization_url(credential: &AppCredential, redirect_uri: &Url, state: &str) -> Url {
	let client = BasicClient::new(ClientId::new(credential.app_id.to_string()))
		.set_auth_uri(AuthUrl::from_url(credential.authorization_url.clone()))
		.set_redirect_uri(RedirectUrl::from_url(redirect_uri.clone()));
	let state = state.to_owned();
	let mut request = client.authorize_url(move || CsrfToken::new(state));

	if !credential.scope.trim().is_empty() {
		request = request.add_scope(Scope::new(credential.scope.trim().to_owned()));
	}

	let (url, _) = request.url();

	url
}

/// Generates a fresh 32-character alphanumeric `state` value.
pub fn generate_state() -> String {
	rand::rng().sample_iter(Alphanumeric).take(STATE_LEN).map(char::from).collect()
}

impl<C, M> OAuthClient<C, M>
where
	C: ?Sized + ProviderHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Starts an authorization handshake and remembers its `state` for [`STATE_TTL`].
	pub fn start_authorization(
		&self,
		credential: &AppCredential,
		redirect_uri: Url,
	) -> AuthorizationSession {
		let _span = FlowSpan::new(FlowKind::Authorize, "start_authorization")
			.with_subject(&credential.app_id)
			.entered();
		let now = OffsetDateTime::now_utc();
		let state = generate_state();
		let authorization_url = build_authorization_url(credential, &redirect_uri, &state);
		let expires_at = now + STATE_TTL;

		{
			let mut pending = self.pending.lock();

			pending.retain(|_, entry| entry.expires_at > now);
			pending.insert(
				state.clone(),
				PendingAuthorization { redirect_uri: redirect_uri.clone(), expires_at },
			);
		}

		obs::record_flow_outcome(FlowKind::Authorize, FlowOutcome::Attempt);

		AuthorizationSession { state, redirect_uri, authorization_url, expires_at }
	}

	/// Redeems a callback: validates the single-use `state`, then exchanges `code` with the
	/// redirect URI the session was started with.
	pub async fn complete_authorization(
		&self,
		credential: &AppCredential,
		state: &str,
		code: &str,
	) -> Result<TokenRecord> {
		let redirect_uri = self.redeem_state(state, OffsetDateTime::now_utc())?;

		self.exchange_code(credential, code, &redirect_uri).await
	}

	/// Handles a callback that carries a provider `error` instead of a code.
	///
	/// Always yields [`Error::InvalidGrant`] carrying `reason`; a supplied state is consumed
	/// whether or not it is still pending.
	pub fn fail_authorization(
		&self,
		credential: &AppCredential,
		state: Option<&str>,
		reason: String,
	) -> Error {
		if let Some(state) = state {
			self.pending.lock().remove(state);
		}

		obs::record_flow_outcome(FlowKind::Authorize, FlowOutcome::Failure);

		#[cfg(feature = "tracing")]
		tracing::warn!(app_id = %credential.app_id, %reason, "Provider declined the authorization.");

		Error::InvalidGrant { app_id: credential.app_id.clone(), step: FlowKind::Authorize, reason }
	}

	fn redeem_state(&self, state: &str, now: OffsetDateTime) -> Result<Url> {
		let entry = self.pending.lock().remove(state);

		match entry {
			Some(entry) if entry.expires_at > now => Ok(entry.redirect_uri),
			_ => {
				obs::record_flow_outcome(FlowKind::Authorize, FlowOutcome::Failure);

				#[cfg(feature = "tracing")]
				tracing::warn!("Rejected authorization callback with an unknown or expired state.");

				Err(Error::InvalidState)
			},
		}
	}
}

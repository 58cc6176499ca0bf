//! OAuth token lifecycle orchestrators: authorization, code exchange, status, and refresh.

pub mod authorize;
pub mod common;
pub mod exchange;
pub mod refresh;
pub mod status;

pub use authorize::*;
pub use refresh::*;
pub use status::*;

// self
use crate::{
	_prelude::*,
	auth::AppCredential,
	http::ProviderHttpClient,
	oauth::TransportErrorMapper,
	provider::{GraphClient, ProviderStrategy},
	store::TokenStore,
};
#[cfg(feature = "reqwest")]
use crate::{error::ConfigError, http::ReqwestHttpClient, oauth::ReqwestTransportErrorMapper};

#[cfg(feature = "reqwest")]
/// OAuth client specialized for the crate's default reqwest transport stack.
pub type ReqwestOAuthClient = OAuthClient<ReqwestHttpClient, ReqwestTransportErrorMapper>;

/// Drives the token lifecycle for the configured Facebook app.
///
/// The client owns the HTTP transport, token store, and strategy references so each flow can
/// focus on its own request shape. It is the only writer of the [`TokenStore`]; failed calls
/// never touch the stored record.
pub struct OAuthClient<C, M>
where
	C: ?Sized + ProviderHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// HTTP client wrapper used for every outbound provider request.
	pub http_client: Arc<C>,
	/// Mapper applied to transport-layer errors before surfacing them to callers.
	pub transport_mapper: Arc<M>,
	/// Token store holding the single active record.
	pub store: Arc<dyn TokenStore>,
	/// Strategy responsible for provider-specific request adjustments and error mapping.
	pub strategy: Arc<dyn ProviderStrategy>,
	/// Shared counters for refresh outcomes.
	pub refresh_metrics: Arc<RefreshMetrics>,
	pending: Arc<Mutex<HashMap<String, PendingAuthorization>>>,
}
impl<C, M> OAuthClient<C, M>
where
	C: ?Sized + ProviderHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Creates a client that reuses the caller-provided transport + mapper pair.
	pub fn with_http_client(
		store: Arc<dyn TokenStore>,
		strategy: Arc<dyn ProviderStrategy>,
		http_client: impl Into<Arc<C>>,
		mapper: impl Into<Arc<M>>,
	) -> Self {
		Self {
			http_client: http_client.into(),
			transport_mapper: mapper.into(),
			store,
			strategy,
			refresh_metrics: Default::default(),
			pending: Default::default(),
		}
	}

	/// Builds a Graph reader sharing this client's transport, store, and strategy.
	pub fn graph(&self, credential: AppCredential) -> GraphClient<C, M> {
		GraphClient::new(
			credential,
			self.store.clone(),
			self.strategy.clone(),
			self.http_client.clone(),
			self.transport_mapper.clone(),
		)
	}
}
#[cfg(feature = "reqwest")]
impl OAuthClient<ReqwestHttpClient, ReqwestTransportErrorMapper> {
	/// Creates a client that provisions its own reqwest transport with the given request timeout.
	pub fn new(
		store: Arc<dyn TokenStore>,
		strategy: Arc<dyn ProviderStrategy>,
		timeout: std::time::Duration,
	) -> Result<Self, ConfigError> {
		Ok(Self::with_http_client(
			store,
			strategy,
			ReqwestHttpClient::new(timeout)?,
			Arc::new(ReqwestTransportErrorMapper),
		))
	}
}
impl<C, M> Clone for OAuthClient<C, M>
where
	C: ?Sized + ProviderHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn clone(&self) -> Self {
		Self {
			http_client: self.http_client.clone(),
			transport_mapper: self.transport_mapper.clone(),
			store: self.store.clone(),
			strategy: self.strategy.clone(),
			refresh_metrics: self.refresh_metrics.clone(),
			pending: self.pending.clone(),
		}
	}
}
impl<C, M> Debug for OAuthClient<C, M>
where
	C: ?Sized + ProviderHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("OAuthClient")
			.field("pending_authorizations", &self.pending.lock().len())
			.field("refresh_metrics", &self.refresh_metrics)
			.finish()
	}
}

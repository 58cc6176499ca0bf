//! Service-level error types shared across OAuth flows, Graph reads, stores, and the webhook
//! receiver.

// self
use crate::{_prelude::*, auth::AppId, obs::FlowKind, provider::ProviderErrorKind};

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Storage-layer failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Local configuration problem (missing app id/secret, bad URLs, unreadable config).
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Retryable network failure (timeouts, connection errors, throttling, 5xx).
	#[error(transparent)]
	Network(#[from] NetworkError),
	/// Provider answered with a terminal, non-grant error.
	#[error(transparent)]
	Provider(#[from] ProviderError),

	/// Provider rejected the authorization grant (bad, reused, or expired code/token).
	#[error("Provider rejected the grant for app {app_id} during {step}: {reason}.")]
	InvalidGrant {
		/// App whose credential was used.
		app_id: AppId,
		/// Flow step that failed.
		step: FlowKind,
		/// Provider- or service-supplied reason string.
		reason: String,
	},
	/// The token cannot be refreshed silently; an operator must re-authorize.
	#[error("Token refresh requires re-authorization at {authorization_url}.")]
	RefreshRequiresUserInteraction {
		/// Fresh authorization URL the operator should visit.
		authorization_url: Url,
	},
	/// No access token is stored yet.
	#[error("No access token is configured.")]
	MissingToken,
	/// Stored access token expired and must be refreshed before outbound calls.
	#[error("Access token expired at {expired_at}.")]
	TokenExpired {
		/// Instant the token expired.
		expired_at: OffsetDateTime,
	},
	/// Authorization callback carried an unknown, reused, or stale `state`.
	#[error("Authorization state is invalid or has expired.")]
	InvalidState,
	/// Webhook delivery signature did not verify.
	#[error("Webhook signature is invalid: {reason}.")]
	SignatureInvalid {
		/// Short, log-only reason (never echoed to the caller).
		reason: &'static str,
	},
	/// Webhook payload could not be decoded.
	#[error("Webhook payload is malformed: {reason}.")]
	MalformedPayload {
		/// Decoding failure, including the JSON path when known.
		reason: String,
	},
	/// Operator referenced a subscription that does not exist.
	#[error("Webhook subscription `{name}` does not exist.")]
	UnknownSubscription {
		/// Requested subscription name.
		name: String,
	},
}
impl Error {
	/// Returns `true` when retrying the same call later may succeed.
	pub fn is_retryable(&self) -> bool {
		matches!(self, Self::Network(e) if !matches!(e, NetworkError::ResponseParse { .. }))
	}
}

/// Configuration and validation failures.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// HTTP request construction failed.
	#[error(transparent)]
	HttpRequest(#[from] oauth2::http::Error),
	/// Configuration sources could not be read or deserialized.
	#[error("Configuration could not be loaded.")]
	Load(#[from] config::ConfigError),
	/// A configured URL cannot be parsed.
	#[error("Configured {field} is not a valid URL.")]
	InvalidUrl {
		/// Configuration field holding the URL.
		field: &'static str,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// A configured URL uses a scheme other than http/https.
	#[error("Configured {field} must use http or https: {url}.")]
	UnsupportedScheme {
		/// Configuration field holding the URL.
		field: &'static str,
		/// Offending URL.
		url: String,
	},
	/// The app id is missing.
	#[error("App ID is not configured.")]
	MissingAppId,
	/// The app secret is missing.
	#[error("App secret is not configured for app {app_id}.")]
	MissingAppSecret {
		/// App lacking a secret.
		app_id: String,
	},
	/// The integration is switched off (`enabled = false`).
	#[error("Lead Ads integration is disabled.")]
	ServiceDisabled,
	/// Two subscriptions share a name.
	#[error("Webhook subscription `{name}` is defined more than once.")]
	DuplicateSubscription {
		/// Conflicting subscription name.
		name: String,
	},
	/// App identifier failed validation.
	#[error(transparent)]
	InvalidIdentifier(#[from] crate::auth::IdentifierError),
	/// Token record builder validation failed.
	#[error("Unable to build token record.")]
	TokenBuild(#[from] crate::auth::TokenRecordBuilderError),
	/// Token endpoint returned an excessively large expiry.
	#[error("The expires_in value exceeds the supported range.")]
	ExpiresInOutOfRange,
	/// Token endpoint returned a non-positive expiry.
	#[error("The expires_in value must be positive.")]
	NonPositiveExpiresIn,
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Transport and upstream failures; all but [`NetworkError::ResponseParse`] are retryable.
#[derive(Debug, ThisError)]
pub enum NetworkError {
	/// The call did not finish within the configured timeout.
	#[error("Request timed out during {step}.")]
	Timeout {
		/// Flow step that timed out.
		step: FlowKind,
	},
	/// Underlying HTTP client reported a connection-level failure.
	#[error("Network error occurred during {step}.")]
	Transport {
		/// Flow step that failed.
		step: FlowKind,
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the provider.")]
	Io(#[from] std::io::Error),
	/// Provider answered with a temporary failure.
	#[error("Provider is temporarily unavailable during {step}: {message}.")]
	Unavailable {
		/// Flow step that failed.
		step: FlowKind,
		/// Provider- or service-supplied message summarizing the failure.
		message: String,
		/// HTTP status code, when available.
		status: Option<u16>,
		/// Retry-After hint from upstream, if supplied.
		retry_after: Option<Duration>,
	},
	/// Provider responded with a body that could not be parsed. Terminal: the same call yields
	/// the same body.
	#[error("Provider returned an unreadable response during {step}.")]
	ResponseParse {
		/// Flow step that failed.
		step: FlowKind,
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
}
impl NetworkError {
	/// Wraps a transport-specific network error.
	pub fn transport(step: FlowKind, src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Transport { step, source: Box::new(src) }
	}
}

/// Terminal provider failure surfaced to the operator.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
#[error("Provider rejected {step} for app {app_id} ({kind:?}): {message}.")]
pub struct ProviderError {
	/// App whose credential was used.
	pub app_id: AppId,
	/// Flow step that failed.
	pub step: FlowKind,
	/// Classified failure category.
	pub kind: ProviderErrorKind,
	/// Provider error message.
	pub message: String,
	/// Provider-specific numeric error code, if any.
	pub code: Option<i64>,
	/// HTTP status code, when available.
	pub status: Option<u16>,
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn only_network_errors_are_retryable() {
		let timeout: Error = NetworkError::Timeout { step: FlowKind::ExchangeCode }.into();

		assert!(timeout.is_retryable());
		assert!(!Error::MissingToken.is_retryable());

		let unreadable = serde_path_to_error::deserialize::<_, String>(
			&mut serde_json::Deserializer::from_str("{}"),
		)
		.expect_err("An object is not a string.");

		assert!(
			!Error::from(NetworkError::ResponseParse {
				step: FlowKind::ExchangeCode,
				source: unreadable,
				status: Some(200),
			})
			.is_retryable()
		);
		assert!(
			!Error::InvalidGrant {
				app_id: AppId::new("42").expect("App id fixture should be valid."),
				step: FlowKind::ExchangeCode,
				reason: "code reused".into(),
			}
			.is_retryable()
		);
	}

	#[test]
	fn invalid_grant_names_app_and_step() {
		let err = Error::InvalidGrant {
			app_id: AppId::new("987").expect("App id fixture should be valid."),
			step: FlowKind::ExchangeCode,
			reason: "This authorization code has been used".into(),
		};
		let rendered = err.to_string();

		assert!(rendered.contains("987"));
		assert!(rendered.contains("exchange_code"));
	}
}

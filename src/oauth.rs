//! Provider request execution and response mapping shared by OAuth flows and Graph reads.
//!
//! Requests are plain [`HttpRequest`] values executed through a [`ProviderHttpClient`] handle;
//! responses are decoded here so token-endpoint quirks (form-encoded bodies, Graph error
//! envelopes) never leak into the flows.

pub use oauth2;

// crates.io
use oauth2::{
	AsyncHttpClient, HttpClientError, HttpRequest,
	http::{
		Method, Request,
		header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
	},
};
use serde::de::{DeserializeOwned, Deserializer, Error as _};
// self
use crate::{
	_prelude::*,
	auth::{AppId, Secret},
	error::{ConfigError, NetworkError, ProviderError},
	http::{ProviderHttpClient, ResponseMetadata, ResponseMetadataSlot},
	obs::FlowKind,
	provider::{ProviderErrorContext, ProviderErrorKind, ProviderStrategy},
};

/// Maps HTTP transport failures into service [`Error`] values.
pub trait TransportErrorMapper<E>
where
	Self: 'static + Send + Sync,
	E: 'static + Send + Sync + StdError,
{
	/// Converts an [`HttpClientError`] emitted by the transport into a service error.
	fn map_transport_error(
		&self,
		step: FlowKind,
		metadata: Option<&ResponseMetadata>,
		error: HttpClientError<E>,
	) -> Error;
}

/// Default mapper for reqwest-backed transports.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransportErrorMapper;
#[cfg(feature = "reqwest")]
impl TransportErrorMapper<ReqwestError> for ReqwestTransportErrorMapper {
	fn map_transport_error(
		&self,
		step: FlowKind,
		meta: Option<&ResponseMetadata>,
		err: HttpClientError<ReqwestError>,
	) -> Error {
		match err {
			HttpClientError::Reqwest(inner) => {
				let inner = *inner;

				if inner.is_builder() {
					return ConfigError::from(inner).into();
				}
				if inner.is_timeout() {
					return NetworkError::Timeout { step }.into();
				}

				NetworkError::transport(step, inner).into()
			},
			HttpClientError::Http(inner) => ConfigError::from(inner).into(),
			HttpClientError::Io(inner) => NetworkError::Io(inner).into(),
			HttpClientError::Other(message) => unavailable(step, meta, message),
			_ => unavailable(step, meta, "unrecognized transport failure"),
		}
	}
}

fn unavailable(step: FlowKind, meta: Option<&ResponseMetadata>, message: impl Display) -> Error {
	NetworkError::Unavailable {
		step,
		message: format!("HTTP client error occurred while calling the provider: {message}"),
		status: meta.and_then(|m| m.status),
		retry_after: meta.and_then(|m| m.retry_after),
	}
	.into()
}

/// Status, retry hint, and raw body of a completed provider call.
#[derive(Clone, Debug)]
pub(crate) struct ProviderResponse {
	pub(crate) status: u16,
	pub(crate) retry_after: Option<Duration>,
	pub(crate) body: Vec<u8>,
}
impl ProviderResponse {
	pub(crate) fn is_success(&self) -> bool {
		(200..300).contains(&self.status)
	}

	/// Non-2xx status, or a 2xx whose body is still an error envelope.
	pub(crate) fn is_failure(&self) -> bool {
		!self.is_success() || serde_json::from_slice::<ErrorEnvelope>(&self.body).is_ok()
	}

	fn body_text(&self) -> String {
		String::from_utf8_lossy(&self.body).into_owned()
	}
}

/// Executes `request` through a fresh transport handle.
///
/// Only transport failures become errors here; any HTTP status is returned for the caller to
/// classify.
pub(crate) async fn send<C, M>(
	http_client: &C,
	mapper: &M,
	step: FlowKind,
	request: HttpRequest,
) -> Result<ProviderResponse>
where
	C: ?Sized + ProviderHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	let slot = ResponseMetadataSlot::default();
	let handle = http_client.with_metadata(slot.clone());

	match handle.call(request).await {
		Ok(response) => {
			let retry_after = slot.take().and_then(|meta| meta.retry_after);

			Ok(ProviderResponse {
				status: response.status().as_u16(),
				retry_after,
				body: response.into_body(),
			})
		},
		Err(e) => Err(mapper.map_transport_error(step, slot.take().as_ref(), e)),
	}
}

/// Builds a form-encoded POST.
pub(crate) fn form_post(url: &Url, form: &BTreeMap<String, String>) -> Result<HttpRequest> {
	let body = url::form_urlencoded::Serializer::new(String::new()).extend_pairs(form).finish();

	Request::builder()
		.method(Method::POST)
		.uri(url.as_str())
		.header(CONTENT_TYPE, "application/x-www-form-urlencoded")
		.header(ACCEPT, "application/json")
		.body(body.into_bytes())
		.map_err(|e| ConfigError::from(e).into())
}

/// Builds a GET authenticated with a bearer token.
pub(crate) fn bearer_get(url: &Url, token: &Secret) -> Result<HttpRequest> {
	Request::builder()
		.method(Method::GET)
		.uri(url.as_str())
		.header(AUTHORIZATION, format!("Bearer {}", token.expose()))
		.header(ACCEPT, "application/json")
		.body(Vec::new())
		.map_err(|e| ConfigError::from(e).into())
}

/// Decodes a successful JSON body, naming the failing path on error.
pub(crate) fn decode_json<T>(step: FlowKind, response: &ProviderResponse) -> Result<T>
where
	T: DeserializeOwned,
{
	let mut de = serde_json::Deserializer::from_slice(&response.body);

	serde_path_to_error::deserialize(&mut de).map_err(|source| {
		NetworkError::ResponseParse { step, source, status: Some(response.status) }.into()
	})
}

/// Token fields issued by the token endpoint.
#[derive(Clone, Debug, Deserialize)]
pub(crate) struct IssuedToken {
	pub(crate) access_token: String,
	#[serde(default, alias = "expires", deserialize_with = "lenient_seconds")]
	pub(crate) expires_in: Option<i64>,
}
impl IssuedToken {
	/// Validated lifetime; a zero lifetime means the provider did not report one.
	pub(crate) fn lifetime(&self) -> Result<Option<Duration>, ConfigError> {
		match self.expires_in {
			None | Some(0) => Ok(None),
			Some(secs) if secs < 0 => Err(ConfigError::NonPositiveExpiresIn),
			Some(secs) => Ok(Some(Duration::seconds(secs))),
		}
	}
}

/// Parses a token endpoint body, which may be JSON or `access_token=..&expires=..`.
pub(crate) fn parse_token_response(
	step: FlowKind,
	response: &ProviderResponse,
) -> Result<IssuedToken> {
	let trimmed = response.body.trim_ascii_start();

	if trimmed.starts_with(b"{") {
		return decode_json(step, response);
	}

	let fields = url::form_urlencoded::parse(&response.body)
		.map(|(k, v)| (k.into_owned(), serde_json::Value::String(v.into_owned())))
		.collect::<serde_json::Map<_, _>>();

	serde_path_to_error::deserialize(serde_json::Value::Object(fields)).map_err(|source| {
		NetworkError::ResponseParse { step, source, status: Some(response.status) }.into()
	})
}

fn lenient_seconds<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
	D: Deserializer<'de>,
{
	#[derive(Deserialize)]
	#[serde(untagged)]
	enum Seconds {
		Number(i64),
		Text(String),
	}

	match Option::<Seconds>::deserialize(deserializer)? {
		None => Ok(None),
		Some(Seconds::Number(n)) => Ok(Some(n)),
		Some(Seconds::Text(s)) if s.trim().is_empty() => Ok(None),
		Some(Seconds::Text(s)) => s.trim().parse().map(Some).map_err(D::Error::custom),
	}
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
	error: ErrorField,
	#[serde(default)]
	error_description: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ErrorField {
	Graph(GraphErrorBody),
	Rfc(String),
}

#[derive(Debug, Deserialize)]
struct GraphErrorBody {
	#[serde(default)]
	message: Option<String>,
	#[serde(default, rename = "type")]
	error_type: Option<String>,
	#[serde(default)]
	code: Option<i64>,
	#[serde(default)]
	error_subcode: Option<i64>,
}

/// Classifies a non-success provider response into the service taxonomy.
pub(crate) fn map_error_response(
	strategy: &dyn ProviderStrategy,
	app_id: &AppId,
	step: FlowKind,
	response: &ProviderResponse,
) -> Error {
	let mut ctx = ProviderErrorContext::new(step).with_http_status(response.status);
	let mut message = None;

	match serde_json::from_slice::<ErrorEnvelope>(&response.body) {
		Ok(ErrorEnvelope { error: ErrorField::Graph(graph), .. }) => {
			ctx = ctx.with_graph_error(graph.error_type, graph.code, graph.error_subcode);

			if let Some(text) = graph.message {
				ctx = ctx.with_error_description(text.clone());
				message = Some(text);
			}
		},
		Ok(ErrorEnvelope { error: ErrorField::Rfc(code), error_description }) => {
			ctx = ctx.with_oauth_error(code.clone());

			if let Some(text) = error_description {
				ctx = ctx.with_error_description(text);
			}

			message = Some(ctx.error_description.clone().unwrap_or(code));
		},
		Err(_) => ctx = ctx.with_body_preview(response.body_text()),
	}

	let message = message
		.or_else(|| ctx.body_preview.clone().filter(|p| !p.trim().is_empty()))
		.unwrap_or_else(|| format!("HTTP {}", response.status));
	let kind = strategy.classify_token_error(&ctx);

	match kind {
		ProviderErrorKind::InvalidGrant =>
			Error::InvalidGrant { app_id: app_id.clone(), step, reason: message },
		ProviderErrorKind::Transient => NetworkError::Unavailable {
			step,
			message,
			status: Some(response.status),
			retry_after: response.retry_after,
		}
		.into(),
		_ => ProviderError {
			app_id: app_id.clone(),
			step,
			kind,
			message,
			code: ctx.graph_code,
			status: Some(response.status),
		}
		.into(),
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::provider::DefaultProviderStrategy;

	fn response(status: u16, body: &str) -> ProviderResponse {
		ProviderResponse { status, retry_after: None, body: body.as_bytes().to_vec() }
	}

	fn app_id() -> AppId {
		AppId::new("1234567890").expect("App id fixture should be valid.")
	}

	#[test]
	fn token_response_accepts_json_and_form_bodies() {
		let json = parse_token_response(
			FlowKind::ExchangeCode,
			&response(200, r#"{"access_token":"EAAB","token_type":"bearer","expires_in":5183944}"#),
		)
		.expect("JSON token body should parse.");

		assert_eq!(json.access_token, "EAAB");
		assert_eq!(json.expires_in, Some(5_183_944));

		let form =
			parse_token_response(FlowKind::ExchangeCode, &response(200, "access_token=EAAC&expires=3600"))
				.expect("Form token body should parse.");

		assert_eq!(form.access_token, "EAAC");
		assert_eq!(form.lifetime().expect("Lifetime should be valid."), Some(Duration::hours(1)));
	}

	#[test]
	fn token_response_without_expiry_has_no_lifetime() {
		let body = response(200, r#"{"access_token":"EAAD"}"#);
		let token = parse_token_response(FlowKind::ExchangeCode, &body)
			.expect("Token body without expiry should parse.");

		assert_eq!(token.lifetime().expect("Missing expiry is valid."), None);

		let zero = IssuedToken { access_token: "x".into(), expires_in: Some(0) };

		assert_eq!(zero.lifetime().expect("Zero expiry is treated as unreported."), None);

		let negative = IssuedToken { access_token: "x".into(), expires_in: Some(-5) };

		assert!(matches!(negative.lifetime(), Err(ConfigError::NonPositiveExpiresIn)));
	}

	#[test]
	fn token_response_missing_access_token_names_the_field() {
		let err = parse_token_response(FlowKind::ExchangeCode, &response(200, r#"{"expires_in":60}"#))
			.expect_err("Token body without access_token should fail.");

		assert!(matches!(err, Error::Network(NetworkError::ResponseParse { .. })));
		assert!(format!("{:?}", err).contains("access_token"));
	}

	#[test]
	fn graph_error_body_maps_to_invalid_grant() {
		let body = r#"{"error":{"message":"This authorization code has been used.","type":"OAuthException","code":100,"error_subcode":36009}}"#;
		let err = map_error_response(
			&DefaultProviderStrategy,
			&app_id(),
			FlowKind::ExchangeCode,
			&response(400, body),
		);

		match err {
			Error::InvalidGrant { reason, step, .. } => {
				assert_eq!(step, FlowKind::ExchangeCode);
				assert!(reason.contains("has been used"));
			},
			other => panic!("Expected InvalidGrant, got {other:?}."),
		}
	}

	#[test]
	fn rfc_error_body_maps_to_provider_error() {
		let err = map_error_response(
			&DefaultProviderStrategy,
			&app_id(),
			FlowKind::ExchangeCode,
			&response(401, r#"{"error":"invalid_client","error_description":"Bad secret"}"#),
		);

		assert!(matches!(
			err,
			Error::Provider(ProviderError { kind: ProviderErrorKind::InvalidClient, .. })
		));
	}

	#[test]
	fn error_envelope_fails_even_with_success_status() {
		let graph = response(
			200,
			r#"{"error":{"message":"Invalid OAuth access token.","type":"OAuthException","code":190}}"#,
		);

		assert!(graph.is_failure());
		assert!(response(200, r#"{"error":"invalid_request"}"#).is_failure());
		assert!(!response(200, r#"{"access_token":"EAAB","expires_in":60}"#).is_failure());
		assert!(!response(200, "access_token=EAAC&expires=3600").is_failure());
		assert!(response(500, "").is_failure());
		assert!(matches!(
			map_error_response(&DefaultProviderStrategy, &app_id(), FlowKind::ExchangeCode, &graph),
			Error::InvalidGrant { .. }
		));
	}

	#[test]
	fn server_errors_are_retryable() {
		let err = map_error_response(
			&DefaultProviderStrategy,
			&app_id(),
			FlowKind::LeadEnrichment,
			&response(503, "upstream unavailable"),
		);

		assert!(err.is_retryable());
	}
}

//! Provider strategy hooks that classify token endpoint and Graph API failures.
//!
//! Implementations normalize error mapping without tying flows to any particular HTTP client.

// std
use std::collections::BTreeMap;
// self
use crate::{_prelude::*, obs::FlowKind};

/// Strategy hook that allows providers to decorate requests and classify errors.
///
/// Implementors are required to be `Send + Sync`, and the hooks use crate-owned data types so
/// downstream crates never depend on reqwest-specific structures. `augment_token_request` has a
/// default no-op implementation.
pub trait ProviderStrategy: Send + Sync {
	/// Maps a failed provider response into the service taxonomy.
	fn classify_token_error(&self, ctx: &ProviderErrorContext) -> ProviderErrorKind;

	/// Gives providers a chance to add custom form parameters before dispatching a token request.
	fn augment_token_request(&self, _step: FlowKind, _form: &mut BTreeMap<String, String>) {}
}

/// Canonical provider error categories used by strategies.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderErrorKind {
	/// Provider rejected the grant (bad, reused, or expired code/token).
	InvalidGrant,
	/// App authentication failed.
	InvalidClient,
	/// The token lacks a permission the call requires.
	InsufficientScope,
	/// Failure is temporary and should be retried.
	Transient,
	/// Provider refused the request for another reason (bad parameter, unknown object).
	Rejected,
}

/// Context passed to provider strategies when classifying failures.
///
/// Only primitive data is kept (status codes, error fields, body preview) so strategies stay
/// decoupled from any HTTP client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProviderErrorContext {
	/// Flow step associated with the failing request.
	pub step: FlowKind,
	/// HTTP status code returned by the provider, when available.
	pub http_status: Option<u16>,
	/// RFC 6749 `error` field.
	pub oauth_error: Option<String>,
	/// RFC 6749 `error_description` field, or the Graph `error.message`.
	pub error_description: Option<String>,
	/// Graph `error.type` (for example `OAuthException`).
	pub graph_type: Option<String>,
	/// Graph `error.code`.
	pub graph_code: Option<i64>,
	/// Graph `error.error_subcode`.
	pub graph_subcode: Option<i64>,
	/// Preview of the response body for unstructured payloads.
	pub body_preview: Option<String>,
	/// Indicates whether the failure originated from the network/transport layer.
	pub network_error: bool,
}
impl ProviderErrorContext {
	const BODY_PREVIEW_LIMIT: usize = 256;

	/// Creates a new context scoped to the provided flow step.
	pub fn new(step: FlowKind) -> Self {
		Self {
			step,
			http_status: None,
			oauth_error: None,
			error_description: None,
			graph_type: None,
			graph_code: None,
			graph_subcode: None,
			body_preview: None,
			network_error: false,
		}
	}

	/// Convenience constructor for transport-level/network failures.
	pub fn network_failure(step: FlowKind) -> Self {
		let mut ctx = Self::new(step);

		ctx.network_error = true;

		ctx
	}

	/// Adds an HTTP status code (e.g., 400, 401, 500).
	pub fn with_http_status(mut self, status: u16) -> Self {
		self.http_status = Some(status);

		self
	}

	/// Adds the RFC 6749 error code string.
	pub fn with_oauth_error(mut self, error: impl Into<String>) -> Self {
		self.oauth_error = Some(error.into());

		self
	}

	/// Adds a human-readable error description.
	pub fn with_error_description(mut self, description: impl Into<String>) -> Self {
		self.error_description = Some(description.into());

		self
	}

	/// Adds the Graph error type, code, and subcode.
	pub fn with_graph_error(
		mut self,
		error_type: Option<String>,
		code: Option<i64>,
		subcode: Option<i64>,
	) -> Self {
		self.graph_type = error_type;
		self.graph_code = code;
		self.graph_subcode = subcode;

		self
	}

	/// Adds a body preview for providers that return unstructured payloads.
	pub fn with_body_preview(mut self, body: impl Into<String>) -> Self {
		self.body_preview = Some(truncate_preview(body.into()));

		self
	}
}

/// Default strategy for the Graph API.
///
/// It prioritizes Graph error codes, then RFC 6749 fields, then body text hints, and finally the
/// HTTP status code. Network failures are always treated as transient.
#[derive(Debug, Default)]
pub struct DefaultProviderStrategy;
impl Display for DefaultProviderStrategy {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("graph-provider-strategy")
	}
}
impl ProviderStrategy for DefaultProviderStrategy {
	fn classify_token_error(&self, ctx: &ProviderErrorContext) -> ProviderErrorKind {
		if ctx.network_error {
			return ProviderErrorKind::Transient;
		}
		if let Some(code) = ctx.graph_code {
			if let Some(kind) = classify_graph_code(ctx.step, code) {
				return kind;
			}
			if !is_grant_step(ctx.step) {
				return ProviderErrorKind::Rejected;
			}
		}
		if let Some(kind) =
			classify_oauth_error(ctx.oauth_error.as_deref(), ctx.error_description.as_deref())
		{
			return kind;
		}
		if let Some(kind) = classify_body(ctx.body_preview.as_deref()) {
			return kind;
		}

		classify_status(ctx.step, ctx.http_status)
	}
}

fn truncate_preview(body: String) -> String {
	if body.chars().count() <= ProviderErrorContext::BODY_PREVIEW_LIMIT {
		return body;
	}

	let mut buf = body.chars().take(ProviderErrorContext::BODY_PREVIEW_LIMIT).collect::<String>();

	buf.push('…');

	buf
}

fn is_grant_step(step: FlowKind) -> bool {
	matches!(step, FlowKind::ExchangeCode | FlowKind::Refresh | FlowKind::Authorize)
}

// https://developers.facebook.com/docs/graph-api/guides/error-handling
fn classify_graph_code(step: FlowKind, code: i64) -> Option<ProviderErrorKind> {
	match code {
		// Unknown, service, app-level throttling, user-level throttling, page throttling.
		1 | 2 | 4 | 17 | 32 | 341 | 613 => Some(ProviderErrorKind::Transient),
		190 => Some(ProviderErrorKind::InvalidGrant),
		// Invalid parameter: on the token endpoint this is a used or expired code.
		100 if is_grant_step(step) => Some(ProviderErrorKind::InvalidGrant),
		101 | 191 => Some(ProviderErrorKind::InvalidClient),
		10 | 200..=299 => Some(ProviderErrorKind::InsufficientScope),
		_ => None,
	}
}

fn classify_oauth_error(
	oauth_error: Option<&str>,
	error_description: Option<&str>,
) -> Option<ProviderErrorKind> {
	oauth_error
		.and_then(match_exact_value)
		.or_else(|| error_description.and_then(match_exact_value))
		.or_else(|| classify_body(error_description))
}

fn match_exact_value(value: &str) -> Option<ProviderErrorKind> {
	if value.eq_ignore_ascii_case("invalid_grant") || value.eq_ignore_ascii_case("access_denied") {
		Some(ProviderErrorKind::InvalidGrant)
	} else if value.eq_ignore_ascii_case("invalid_client")
		|| value.eq_ignore_ascii_case("unauthorized_client")
	{
		Some(ProviderErrorKind::InvalidClient)
	} else if value.eq_ignore_ascii_case("invalid_scope")
		|| value.eq_ignore_ascii_case("insufficient_scope")
	{
		Some(ProviderErrorKind::InsufficientScope)
	} else if value.eq_ignore_ascii_case("temporarily_unavailable")
		|| value.eq_ignore_ascii_case("server_error")
	{
		Some(ProviderErrorKind::Transient)
	} else {
		None
	}
}

fn classify_body(body: Option<&str>) -> Option<ProviderErrorKind> {
	let lowered = body?.to_ascii_lowercase();

	match lowered.as_str() {
		text if text.contains("invalid_grant")
			|| text.contains("authorization code has been used")
			|| text.contains("code has expired") =>
			Some(ProviderErrorKind::InvalidGrant),
		text if text.contains("invalid_client") => Some(ProviderErrorKind::InvalidClient),
		text if text.contains("insufficient_scope") || text.contains("invalid_scope") =>
			Some(ProviderErrorKind::InsufficientScope),
		text if text.contains("temporarily_unavailable") || text.contains("retry") =>
			Some(ProviderErrorKind::Transient),
		_ => None,
	}
}

fn classify_status(step: FlowKind, status: Option<u16>) -> ProviderErrorKind {
	match status {
		Some(400 | 404 | 410) if is_grant_step(step) => ProviderErrorKind::InvalidGrant,
		Some(400 | 404 | 410) => ProviderErrorKind::Rejected,
		Some(401) => ProviderErrorKind::InvalidClient,
		Some(403) => ProviderErrorKind::InsufficientScope,
		_ => ProviderErrorKind::Transient,
	}
}

//! Inbound HTTP surface built on `axum`.
//!
//! | Route | Purpose |
//! |---|---|
//! | `GET /webhook` | subscription handshake; echoes `hub.challenge` or answers 403 |
//! | `POST /webhook` | signed deliveries; 403 on a bad signature, otherwise 200 |
//! | `GET /oauth/authorize` | 302 to a fresh authorization dialog (operator) |
//! | `GET /oauth/callback` | redeems `code` + `state` |
//! | `GET /oauth/status` | token status report (operator) |
//! | `POST /oauth/refresh` | extended token status or the re-authorization URL (operator) |
//!
//! Operator routes require `Authorization: Bearer <server.operator_token>` and answer 401
//! otherwise, including when no operator token is configured.

// crates.io
use axum::{
	Json, Router,
	body::Bytes,
	extract::{Query, Request, State},
	http::{
		HeaderMap, StatusCode,
		header::{AUTHORIZATION, LOCATION},
	},
	middleware::{self, Next},
	response::{IntoResponse, Response},
	routing::{get, post},
};
use tokio::net::TcpListener;
// self
use crate::{
	_prelude::*,
	auth::{Secret, TokenStatusReport},
	error::ConfigError,
	ops::{AuthorizationCallback, Operator},
	webhook::{HandshakeOutcome, HandshakeQuery, SIGNATURE_HEADER, WebhookReceiver},
};

/// Shared handler state.
#[derive(Clone)]
pub struct ServerState {
	operator: Arc<dyn Operator>,
	receiver: Arc<WebhookReceiver>,
	operator_token: Option<Secret>,
}
impl ServerState {
	/// Bundles the operator surface with the webhook receiver and the operator bearer token.
	pub fn new(
		operator: Arc<dyn Operator>,
		receiver: Arc<WebhookReceiver>,
		operator_token: Option<Secret>,
	) -> Self {
		Self { operator, receiver, operator_token: operator_token.filter(|t| !t.is_blank()) }
	}
}
impl Debug for ServerState {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ServerState")
			.field("receiver", &self.receiver)
			.field("operator_token", &self.operator_token)
			.finish()
	}
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum RefreshResponse {
	Extended { token: TokenStatusReport },
	ReauthorizationRequired { authorization_url: Url },
}

#[derive(Debug, Serialize)]
struct ErrorBody {
	error: &'static str,
	message: String,
}

/// Builds the router.
pub fn router(state: ServerState) -> Router {
	let operator_routes = Router::new()
		.route("/oauth/authorize", get(authorize))
		.route("/oauth/status", get(token_status))
		.route("/oauth/refresh", post(refresh_token))
		.route_layer(middleware::from_fn_with_state(state.clone(), require_operator));

	Router::new()
		.route("/webhook", get(verify_subscription).post(receive_delivery))
		.route("/oauth/callback", get(authorization_callback))
		.merge(operator_routes)
		.with_state(state)
}

/// Serves the router on `listener` until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, state: ServerState, shutdown: F) -> std::io::Result<()>
where
	F: 'static + Send + Future<Output = ()>,
{
	#[cfg(feature = "tracing")]
	if let Ok(addr) = listener.local_addr() {
		tracing::info!(%addr, "HTTP listener bound.");
	}

	axum::serve(listener, router(state)).with_graceful_shutdown(shutdown).await
}

async fn require_operator(
	State(state): State<ServerState>,
	request: Request,
	next: Next,
) -> Response {
	if bearer_matches(state.operator_token.as_ref(), request.headers()) {
		return next.run(request).await;
	}

	#[cfg(feature = "tracing")]
	tracing::warn!(
		path = request.uri().path(),
		configured = state.operator_token.is_some(),
		"Operator request refused."
	);

	(
		StatusCode::UNAUTHORIZED,
		Json(ErrorBody { error: "unauthorized", message: "Operator token is missing or wrong.".into() }),
	)
		.into_response()
}

fn bearer_matches(expected: Option<&Secret>, headers: &HeaderMap) -> bool {
	let presented = headers
		.get(AUTHORIZATION)
		.and_then(|v| v.to_str().ok())
		.and_then(|v| v.strip_prefix("Bearer "));

	match (expected, presented) {
		(Some(expected), Some(presented)) => expected.matches(presented),
		_ => false,
	}
}

async fn verify_subscription(
	State(state): State<ServerState>,
	Query(query): Query<HandshakeQuery>,
) -> Response {
	match state.receiver.handshake(&query) {
		HandshakeOutcome::Accepted { challenge, .. } => (StatusCode::OK, challenge).into_response(),
		HandshakeOutcome::Rejected(_) => StatusCode::FORBIDDEN.into_response(),
	}
}

async fn receive_delivery(
	State(state): State<ServerState>,
	headers: HeaderMap,
	body: Bytes,
) -> Response {
	let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());

	match state.receiver.receive(signature, &body).await {
		Ok(report) => (StatusCode::OK, Json(report)).into_response(),
		// The reason is logged by the receiver and never echoed.
		Err(_) => StatusCode::FORBIDDEN.into_response(),
	}
}

async fn authorize(State(state): State<ServerState>) -> Response {
	match state.operator.authorize() {
		Ok(session) =>
			(StatusCode::FOUND, [(LOCATION, session.authorization_url.to_string())]).into_response(),
		Err(e) => error_response(e),
	}
}

async fn authorization_callback(
	State(state): State<ServerState>,
	Query(callback): Query<AuthorizationCallback>,
) -> Response {
	match state.operator.complete_authorization(callback).await {
		Ok(report) => Json(report).into_response(),
		Err(e) => error_response(e),
	}
}

async fn token_status(State(state): State<ServerState>) -> Response {
	match state.operator.check_status().await {
		Ok(report) => Json(report).into_response(),
		Err(e) => error_response(e),
	}
}

async fn refresh_token(State(state): State<ServerState>) -> Response {
	match state.operator.refresh().await {
		Ok(token) => Json(RefreshResponse::Extended { token }).into_response(),
		Err(Error::RefreshRequiresUserInteraction { authorization_url }) =>
			Json(RefreshResponse::ReauthorizationRequired { authorization_url }).into_response(),
		Err(e) => error_response(e),
	}
}

fn error_response(error: Error) -> Response {
	let (status, kind) = classify(&error);

	#[cfg(feature = "tracing")]
	if status.is_server_error() {
		tracing::error!(%error, kind, "Request failed.");
	} else {
		tracing::warn!(%error, kind, "Request rejected.");
	}

	(status, Json(ErrorBody { error: kind, message: error.to_string() })).into_response()
}

fn classify(error: &Error) -> (StatusCode, &'static str) {
	match error {
		Error::Config(ConfigError::ServiceDisabled) =>
			(StatusCode::SERVICE_UNAVAILABLE, "service_disabled"),
		Error::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "configuration"),
		Error::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "storage"),
		Error::Network(_) => (StatusCode::BAD_GATEWAY, "network"),
		Error::Provider(_) => (StatusCode::BAD_GATEWAY, "provider"),
		Error::InvalidGrant { .. } => (StatusCode::BAD_REQUEST, "invalid_grant"),
		Error::InvalidState => (StatusCode::BAD_REQUEST, "invalid_state"),
		Error::RefreshRequiresUserInteraction { .. } =>
			(StatusCode::CONFLICT, "reauthorization_required"),
		Error::MissingToken => (StatusCode::CONFLICT, "missing_token"),
		Error::TokenExpired { .. } => (StatusCode::CONFLICT, "token_expired"),
		Error::SignatureInvalid { .. } => (StatusCode::FORBIDDEN, "signature_invalid"),
		Error::MalformedPayload { .. } => (StatusCode::BAD_REQUEST, "malformed_payload"),
		Error::UnknownSubscription { .. } => (StatusCode::NOT_FOUND, "unknown_subscription"),
	}
}

#![cfg(feature = "reqwest")]

// crates.io
use httpmock::prelude::*;
use tokio::sync::mpsc::UnboundedReceiver;
// self
use leadgen_broker::{
	_preludet::*,
	auth::{Secret, TokenRecord},
	config::{ConfigHandle, ServiceConfig},
	error::ConfigError,
	http::ReqwestHttpClient,
	oauth::ReqwestTransportErrorMapper,
	ops::{AuthorizationCallback, LeadAdsService, Operator},
	store::TokenStore,
	webhook::{self, DeliveryStage, HandshakeOutcome, HandshakeQuery, LeadEvent},
};

type Service = LeadAdsService<ReqwestHttpClient, ReqwestTransportErrorMapper>;

const APP_SECRET: &str = "app-secret-it";

fn config_toml(base_url: &str, enabled: bool) -> String {
	format!(
		r#"
enabled = {enabled}

[app]
app_id = "1234567890"
app_secret = "{APP_SECRET}"
access_token_url = "{base_url}/v17.0/oauth/access_token"
authorization_url = "{base_url}/v17.0/dialog/oauth"
graph_url = "{base_url}"

[server]
public_url = "https://crm.example.com"

[[subscriptions]]
name = "spring"
page_id = "111"
form_id = "222"
verify_token = "tok-spring"

[[subscriptions]]
name = "quick"
page_id = "111"
form_id = "333"
verify_token = "tok-quick"
simplify_output = true
"#
	)
}

fn build_service(base_url: &str, enabled: bool) -> (Service, UnboundedReceiver<LeadEvent>) {
	let config = ServiceConfig::from_toml(&config_toml(base_url, enabled))
		.expect("Service configuration should load.");
	let (client, _) = build_reqwest_test_client();

	LeadAdsService::new(ConfigHandle::from_config("unused.toml", config), client)
		.expect("Service should build.")
}

fn delivery(form_id: &str, leadgen_id: &str) -> Vec<u8> {
	format!(
		r#"{{"object":"page","entry":[{{"id":"111","time":1735725600,"changes":[{{"field":"leadgen","value":{{"leadgen_id":"{leadgen_id}","page_id":"111","form_id":"{form_id}","ad_id":"9","created_time":1735725600}}}}]}}]}}"#
	)
	.into_bytes()
}

fn signed(body: &[u8]) -> String {
	webhook::sign(&Secret::new(APP_SECRET), body).expect("Signing should succeed.")
}

async fn seed_token(service: &Service) {
	let record = TokenRecord::builder()
		.access_token("EAAB-live")
		.expires_in(Duration::days(60))
		.build()
		.expect("Seed record should build.");

	service.oauth().store.put(record).await.expect("Seeding the store should succeed.");
}

#[tokio::test]
async fn signed_delivery_is_enriched_through_graph() {
	let server = MockServer::start_async().await;
	let (service, mut events) = build_service(&server.base_url(), true);

	seed_token(&service).await;

	let lead = server
		.mock_async(|when, then| {
			when.method(GET).path("/v17.0/444").header("authorization", "Bearer EAAB-live");
			then.status(200).header("content-type", "application/json").body(
				r#"{"id":"444","ad_name":"Spring","adset_id":"8","adset_name":"Warm","field_data":[{"name":"email","values":["ada@example.com"]}]}"#,
			);
		})
		.await;
	let form = server
		.mock_async(|when, then| {
			when.method(GET).path("/v17.0/222");
			then.status(200)
				.header("content-type", "application/json")
				.body(r#"{"id":"222","name":"Quote request","status":"ACTIVE"}"#);
		})
		.await;
	let body = delivery("222", "444");
	let report = service
		.receiver()
		.receive(Some(&signed(&body)), &body)
		.await
		.expect("Signed delivery should be accepted.");

	lead.assert_async().await;
	form.assert_async().await;

	assert_eq!(report.stage, DeliveryStage::Dispatched);
	assert_eq!(report.dispatched, 1);
	assert_eq!(report.degraded, 0);

	let event = events.recv().await.expect("A lead event should be emitted.");

	assert!(event.enriched);
	assert_eq!(event.subscription.as_ref(), "spring");
	assert_eq!(event.ad_id.as_deref(), Some("9"));
	assert_eq!(event.ad_name.as_deref(), Some("Spring"));
	assert_eq!(event.field_data.get("email"), Some(&Some("ada@example.com".to_owned())));
	assert_eq!(event.form.and_then(|form| form.name).as_deref(), Some("Quote request"));

	let spring = service
		.subscriptions()
		.into_iter()
		.find(|subscription| subscription.name.as_ref() == "spring")
		.expect("Configured subscription should be listed.");

	assert_eq!(spring.lead_count, 1);
	assert!(spring.last_lead_received_at.is_some());
}

#[tokio::test]
async fn enrichment_failure_degrades_to_summary() {
	let server = MockServer::start_async().await;
	let (service, mut events) = build_service(&server.base_url(), true);
	let graph = server
		.mock_async(|when, then| {
			when.any_request();
			then.status(500);
		})
		.await;
	let body = delivery("222", "445");
	let report = service
		.receiver()
		.receive(Some(&signed(&body)), &body)
		.await
		.expect("Signed delivery should be accepted.");

	// No token is stored, so enrichment fails before any Graph call.
	graph.assert_hits_async(0).await;

	assert_eq!(report.dispatched, 1);
	assert_eq!(report.degraded, 1);

	let event = events.recv().await.expect("A lead event should be emitted.");

	assert!(!event.enriched);
	assert_eq!(event.lead_id.as_ref(), "445");
	assert!(event.created_time.is_some());
	assert_eq!(service.receiver().metrics().degraded(), 1);
}

#[tokio::test]
async fn simplified_subscription_skips_graph() {
	let server = MockServer::start_async().await;
	let (service, mut events) = build_service(&server.base_url(), true);

	seed_token(&service).await;

	let graph = server
		.mock_async(|when, then| {
			when.any_request();
			then.status(200).body("{}");
		})
		.await;
	let body = delivery("333", "446");
	let report = service
		.receiver()
		.receive(Some(&signed(&body)), &body)
		.await
		.expect("Signed delivery should be accepted.");

	graph.assert_hits_async(0).await;

	assert_eq!(report.dispatched, 1);
	assert_eq!(report.degraded, 0);

	let event = events.recv().await.expect("A lead event should be emitted.");

	assert!(!event.enriched);
	assert_eq!(event.subscription.as_ref(), "quick");
}

#[tokio::test]
async fn forged_signature_emits_nothing() {
	let server = MockServer::start_async().await;
	let (service, mut events) = build_service(&server.base_url(), true);
	let body = delivery("222", "447");
	let forged =
		webhook::sign(&Secret::new("someone-else"), &body).expect("Signing should succeed.");

	assert!(matches!(
		service.receiver().receive(Some(&forged), &body).await,
		Err(Error::SignatureInvalid { .. })
	));
	assert!(events.try_recv().is_err());
	assert_eq!(service.receiver().metrics().rejected(), 1);
}

#[tokio::test]
async fn operator_controls_subscriptions() {
	let server = MockServer::start_async().await;
	let (service, _events) = build_service(&server.base_url(), true);
	let query = |token: &str| HandshakeQuery {
		mode: Some("subscribe".into()),
		verify_token: Some(token.into()),
		challenge: Some("abc123".into()),
	};

	assert!(matches!(
		service.receiver().handshake(&query("tok-spring")),
		HandshakeOutcome::Accepted { ref challenge, .. } if challenge == "abc123"
	));

	let fresh = service
		.regenerate_verify_token("spring")
		.expect("Known subscription should regenerate.");
	let receiver = service.receiver();

	assert_eq!(fresh.len(), 32);
	assert!(matches!(receiver.handshake(&query("tok-spring")), HandshakeOutcome::Rejected(_)));
	assert!(matches!(receiver.handshake(&query(&fresh)), HandshakeOutcome::Accepted { .. }));

	service.set_subscription_enabled("spring", false).expect("Known subscription should toggle.");

	assert!(matches!(receiver.handshake(&query(&fresh)), HandshakeOutcome::Rejected(_)));
	assert!(matches!(
		service.regenerate_verify_token("missing"),
		Err(Error::UnknownSubscription { .. })
	));
}

#[tokio::test]
async fn callback_flow_stores_token_and_disconnect_clears_it() {
	let server = MockServer::start_async().await;
	let (service, _events) = build_service(&server.base_url(), true);
	let token = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/v17.0/oauth/access_token")
				.form_urlencoded_tuple("code", "auth-code")
				.form_urlencoded_tuple("redirect_uri", "https://crm.example.com/oauth/callback");
			then.status(200)
				.header("content-type", "application/json")
				.body(r#"{"access_token":"EAAB-fresh","expires_in":5183944}"#);
		})
		.await;
	let session = service.authorize().expect("Authorization should start.");
	let report = service
		.complete_authorization(AuthorizationCallback {
			code: Some("auth-code".into()),
			state: Some(session.state.clone()),
			..Default::default()
		})
		.await
		.expect("Callback should succeed.");

	token.assert_async().await;

	assert!(report.has_token);
	assert!(!report.is_long_lived);
	assert!(report.expires_in_seconds.is_some_and(|secs| secs > 0));

	let denied = service.authorize().expect("Authorization should start.");

	assert!(matches!(
		service
			.complete_authorization(AuthorizationCallback {
				state: Some(denied.state),
				error: Some("access_denied".into()),
				error_description: Some("Permissions error".into()),
				..Default::default()
			})
			.await,
		Err(Error::InvalidGrant { .. })
	));
	assert!(matches!(
		service
			.complete_authorization(AuthorizationCallback {
				error: Some("access_denied".into()),
				..Default::default()
			})
			.await,
		Err(Error::InvalidGrant { .. })
	));
	assert!(service.check_status().await.expect("Status should be readable.").has_token);

	service.disconnect().await.expect("Disconnect should succeed.");

	assert!(!service.check_status().await.expect("Status should be readable.").has_token);
}

#[tokio::test]
async fn disabled_service_refuses_operations_and_deliveries() {
	let server = MockServer::start_async().await;
	let (service, _events) = build_service(&server.base_url(), false);
	let body = delivery("222", "448");

	assert!(matches!(service.authorize(), Err(Error::Config(ConfigError::ServiceDisabled))));
	assert!(matches!(
		service.refresh().await,
		Err(Error::Config(ConfigError::ServiceDisabled))
	));
	assert!(matches!(
		service.receiver().receive(Some(&signed(&body)), &body).await,
		Err(Error::SignatureInvalid { .. })
	));
}

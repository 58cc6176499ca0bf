#![cfg(feature = "reqwest")]

// crates.io
use httpmock::prelude::*;
// self
use leadgen_broker::{
	_preludet::*,
	auth::{ExpirySource, TokenRecord},
	error::NetworkError,
	flows::check_status,
	store::TokenStore,
};

const TOKEN_PATH: &str = "/v17.0/oauth/access_token";

fn redirect() -> Url {
	Url::parse("https://crm.example.com/oauth/callback").expect("Redirect fixture should parse.")
}

fn seeded_record() -> TokenRecord {
	TokenRecord::builder()
		.access_token("EAAB-previous")
		.expires_in(Duration::days(30))
		.build()
		.expect("Seed record should build.")
}

#[tokio::test]
async fn exchange_code_stores_json_token() {
	let server = MockServer::start_async().await;
	let (client, store) = build_reqwest_test_client();
	let credential = test_credential(&server.base_url());
	let mock = server
		.mock_async(|when, then| {
			when.method(POST)
				.path(TOKEN_PATH)
				.header("content-type", "application/x-www-form-urlencoded")
				.form_urlencoded_tuple("client_id", "1234567890")
				.form_urlencoded_tuple("client_secret", "app-secret-it")
				.form_urlencoded_tuple("code", "auth-code")
				.form_urlencoded_tuple("redirect_uri", "https://crm.example.com/oauth/callback");
			then.status(200)
				.header("content-type", "application/json")
				.body(r#"{"access_token":"EAAB-fresh","token_type":"bearer","expires_in":5183944}"#);
		})
		.await;
	let record = client
		.exchange_code(&credential, "auth-code", &redirect())
		.await
		.expect("Code exchange should succeed.");

	mock.assert_async().await;

	assert_eq!(record.access_token.expose(), "EAAB-fresh");
	assert_eq!(record.expiry_source, ExpirySource::Provider);
	assert!(record.expires_at.is_some_and(|at| at > record.obtained_at));

	let stored = store.snapshot().expect("Successful exchange should store the record.");

	assert_eq!(stored.access_token.expose(), "EAAB-fresh");
}

#[tokio::test]
async fn exchange_code_accepts_form_encoded_response_without_expiry() {
	let server = MockServer::start_async().await;
	let (client, store) = build_reqwest_test_client();
	let credential = test_credential(&server.base_url());
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path(TOKEN_PATH);
			then.status(200).header("content-type", "text/plain").body("access_token=EAAB-form");
		})
		.await;
	let record = client
		.exchange_code(&credential, "auth-code", &redirect())
		.await
		.expect("Form-encoded responses should be accepted.");

	mock.assert_async().await;

	assert_eq!(record.access_token.expose(), "EAAB-form");
	assert_eq!(record.expires_at, None);
	assert_eq!(record.expiry_source, ExpirySource::NotReported);

	let report = check_status(store.snapshot().as_ref());

	assert!(report.has_token);
	assert!(report.is_long_lived);
	assert!(!report.is_expired);
	assert_eq!(report.expires_in_seconds, None);
}

#[tokio::test]
async fn exchange_error_is_invalid_grant_and_store_is_unchanged() {
	let server = MockServer::start_async().await;
	let (client, store) = build_reqwest_test_client();
	let credential = test_credential(&server.base_url());

	store.put(seeded_record()).await.expect("Seeding the store should succeed.");

	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path(TOKEN_PATH);
			then.status(400).header("content-type", "application/json").body(
				r#"{"error":{"message":"This authorization code has been used.","type":"OAuthException","code":100,"error_subcode":36009}}"#,
			);
		})
		.await;
	let err = client
		.exchange_code(&credential, "used-code", &redirect())
		.await
		.expect_err("A rejected code should fail.");

	mock.assert_async().await;

	assert!(matches!(err, Error::InvalidGrant { ref reason, .. } if reason.contains("has been used")));
	assert_eq!(
		store.snapshot().map(|record| record.access_token.expose().to_owned()).as_deref(),
		Some("EAAB-previous")
	);
}

#[tokio::test]
async fn error_body_with_success_status_is_terminal() {
	let server = MockServer::start_async().await;
	let (client, store) = build_reqwest_test_client();
	let credential = test_credential(&server.base_url());
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path(TOKEN_PATH);
			then.status(200).header("content-type", "application/json").body(
				r#"{"error":{"message":"This authorization code has been used.","type":"OAuthException","code":100,"error_subcode":36009}}"#,
			);
		})
		.await;
	let err = client
		.exchange_code(&credential, "used-code", &redirect())
		.await
		.expect_err("An error body should fail even with a 200 status.");

	mock.assert_async().await;

	assert!(matches!(err, Error::InvalidGrant { ref reason, .. } if reason.contains("has been used")));
	assert!(!err.is_retryable());
	assert!(store.snapshot().is_none());
}

#[tokio::test]
async fn upstream_outage_is_retryable_and_store_is_unchanged() {
	let server = MockServer::start_async().await;
	let (client, store) = build_reqwest_test_client();
	let credential = test_credential(&server.base_url());
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path(TOKEN_PATH);
			then.status(503).header("retry-after", "7").body("upstream down");
		})
		.await;
	let err = client
		.exchange_code(&credential, "auth-code", &redirect())
		.await
		.expect_err("Upstream outages should fail.");

	mock.assert_async().await;

	assert!(err.is_retryable());
	assert!(matches!(
		err,
		Error::Network(NetworkError::Unavailable { status: Some(503), retry_after: Some(delay), .. })
			if delay == Duration::seconds(7)
	));
	assert!(store.snapshot().is_none());
}

#[tokio::test]
async fn callback_redeems_state_once() {
	let server = MockServer::start_async().await;
	let (client, store) = build_reqwest_test_client();
	let credential = test_credential(&server.base_url());
	let session = client.start_authorization(&credential, redirect());
	let mock = server
		.mock_async(|when, then| {
			when.method(POST)
				.path(TOKEN_PATH)
				.form_urlencoded_tuple("redirect_uri", "https://crm.example.com/oauth/callback");
			then.status(200)
				.header("content-type", "application/json")
				.body(r#"{"access_token":"EAAB-callback","expires_in":3600}"#);
		})
		.await;

	client
		.complete_authorization(&credential, &session.state, "auth-code")
		.await
		.expect("First callback should succeed.");

	assert!(matches!(
		client.complete_authorization(&credential, &session.state, "auth-code").await,
		Err(Error::InvalidState)
	));

	mock.assert_hits_async(1).await;

	assert!(store.snapshot().is_some());
}

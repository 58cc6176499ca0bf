#![cfg(feature = "reqwest")]

// crates.io
use httpmock::prelude::*;
// self
use leadgen_broker::{
	_preludet::*,
	auth::{AppCredential, ExpirySource, TokenRecord},
	store::TokenStore,
};

const TOKEN_PATH: &str = "/v17.0/oauth/access_token";

fn redirect() -> Url {
	Url::parse("https://crm.example.com/oauth/callback").expect("Redirect fixture should parse.")
}

fn extending_credential(base_url: &str) -> AppCredential {
	let base = test_credential(base_url);

	AppCredential::builder("1234567890", "app-secret-it")
		.authorization_url(base.authorization_url)
		.access_token_url(base.access_token_url)
		.graph_url(base.graph_url)
		.scope(base.scope)
		.token_extension(true)
		.build()
		.expect("Extending credential should build.")
}

fn short_lived(expires_in: Duration) -> TokenRecord {
	TokenRecord::builder()
		.access_token("EAAB-short")
		.expires_in(expires_in)
		.build()
		.expect("Seed record should build.")
}

#[tokio::test]
async fn refresh_without_extension_requires_reauthorization() {
	let server = MockServer::start_async().await;
	let (client, store) = build_reqwest_test_client();
	let credential = test_credential(&server.base_url());

	store.put(short_lived(Duration::hours(1))).await.expect("Seeding the store should succeed.");

	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path(TOKEN_PATH);
			then.status(200).body(r#"{"access_token":"never"}"#);
		})
		.await;
	let err = client
		.refresh(&credential, &redirect())
		.await
		.expect_err("Refresh without extension should ask for the dialog.");

	mock.assert_hits_async(0).await;

	let Error::RefreshRequiresUserInteraction { authorization_url } = err else {
		panic!("Unexpected refresh error: {err:?}.");
	};
	let query = authorization_url.query_pairs().collect::<HashMap<_, _>>();

	assert!(authorization_url.path().ends_with("/v17.0/dialog/oauth"));
	assert_eq!(query.get("client_id").map(|v| v.as_ref()), Some("1234567890"));
	assert_eq!(
		query.get("redirect_uri").map(|v| v.as_ref()),
		Some("https://crm.example.com/oauth/callback")
	);
	assert!(query.get("state").is_some_and(|state| state.len() == 32));
	assert_eq!(
		store.snapshot().map(|record| record.access_token.expose().to_owned()).as_deref(),
		Some("EAAB-short")
	);
	assert_eq!(client.refresh_metrics.reauthorizations(), 1);
}

#[tokio::test]
async fn refresh_extends_usable_token() {
	let server = MockServer::start_async().await;
	let (client, store) = build_reqwest_test_client();
	let credential = extending_credential(&server.base_url());

	store.put(short_lived(Duration::hours(1))).await.expect("Seeding the store should succeed.");

	let mock = server
		.mock_async(|when, then| {
			when.method(POST)
				.path(TOKEN_PATH)
				.form_urlencoded_tuple("grant_type", "fb_exchange_token")
				.form_urlencoded_tuple("fb_exchange_token", "EAAB-short")
				.form_urlencoded_tuple("client_id", "1234567890");
			then.status(200)
				.header("content-type", "application/json")
				.body(r#"{"access_token":"EAAB-long","token_type":"bearer","expires_in":5183944}"#);
		})
		.await;
	let record =
		client.refresh(&credential, &redirect()).await.expect("Extension should succeed.");

	mock.assert_async().await;

	assert_eq!(record.access_token.expose(), "EAAB-long");
	assert_eq!(record.expiry_source, ExpirySource::Provider);
	assert_eq!(
		store.snapshot().map(|record| record.access_token.expose().to_owned()).as_deref(),
		Some("EAAB-long")
	);
	assert_eq!(client.refresh_metrics.extended(), 1);
}

#[tokio::test]
async fn extension_without_expiry_is_marked_long_lived() {
	let server = MockServer::start_async().await;
	let (client, store) = build_reqwest_test_client();
	let credential = extending_credential(&server.base_url());

	store.put(short_lived(Duration::hours(1))).await.expect("Seeding the store should succeed.");

	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path(TOKEN_PATH);
			then.status(200).body("access_token=EAAB-forever");
		})
		.await;
	let record =
		client.refresh(&credential, &redirect()).await.expect("Extension should succeed.");

	mock.assert_async().await;

	assert_eq!(record.expires_at, None);
	assert_eq!(record.expiry_source, ExpirySource::LongLived);
}

#[tokio::test]
async fn expired_token_cannot_be_extended() {
	let server = MockServer::start_async().await;
	let (client, store) = build_reqwest_test_client();
	let credential = extending_credential(&server.base_url());
	let expired = TokenRecord::builder()
		.access_token("EAAB-stale")
		.obtained_at(OffsetDateTime::now_utc() - Duration::days(61))
		.expires_in(Duration::days(60))
		.build()
		.expect("Expired record should build.");

	store.put(expired).await.expect("Seeding the store should succeed.");

	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path(TOKEN_PATH);
			then.status(200).body(r#"{"access_token":"never"}"#);
		})
		.await;

	assert!(matches!(
		client.refresh(&credential, &redirect()).await,
		Err(Error::RefreshRequiresUserInteraction { .. })
	));

	mock.assert_hits_async(0).await;
}

#[tokio::test]
async fn rejected_extension_keeps_previous_token() {
	let server = MockServer::start_async().await;
	let (client, store) = build_reqwest_test_client();
	let credential = extending_credential(&server.base_url());

	store.put(short_lived(Duration::hours(1))).await.expect("Seeding the store should succeed.");

	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path(TOKEN_PATH);
			then.status(400).header("content-type", "application/json").body(
				r#"{"error":{"message":"Error validating access token: Session has expired.","type":"OAuthException","code":190}}"#,
			);
		})
		.await;
	let err = client
		.refresh(&credential, &redirect())
		.await
		.expect_err("A revoked token should not extend.");

	mock.assert_async().await;

	assert!(matches!(err, Error::InvalidGrant { .. }));
	assert_eq!(
		store.snapshot().map(|record| record.access_token.expose().to_owned()).as_deref(),
		Some("EAAB-short")
	);
	assert_eq!(client.refresh_metrics.failures(), 1);
}

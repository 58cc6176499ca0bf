//! Facebook Lead Ads bridge: drive the Graph OAuth token lifecycle, verify signed webhook
//! deliveries, and hand normalized lead events to downstream consumers.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod config;
pub mod error;
pub mod flows;
pub mod http;
pub mod oauth;
pub mod obs;
pub mod ops;
pub mod provider;
pub mod server;
pub mod store;
pub mod webhook;
#[cfg(all(any(test, feature = "test"), feature = "reqwest"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for integration tests; enabled via `cfg(test)` or the
	//! `test` crate feature.

	pub use crate::_prelude::*;

	// self
	use crate::{
		auth::AppCredential,
		flows::OAuthClient,
		http::ReqwestHttpClient,
		oauth::ReqwestTransportErrorMapper,
		provider::{DefaultProviderStrategy, ProviderStrategy},
		store::{MemoryTokenStore, TokenStore},
	};

	/// OAuth client type alias used by reqwest-backed integration tests.
	pub type ReqwestTestClient = OAuthClient<ReqwestHttpClient, ReqwestTransportErrorMapper>;

	/// Builds a reqwest HTTP client that accepts the self-signed certificates produced by
	/// `httpmock` during tests.
	pub fn test_reqwest_http_client() -> ReqwestHttpClient {
		let client = ReqwestClient::builder()
			.danger_accept_invalid_certs(true)
			.danger_accept_invalid_hostnames(true)
			.timeout(std::time::Duration::from_secs(5))
			.build()
			.expect("Failed to build insecure Reqwest client for tests.");

		ReqwestHttpClient::with_client(client)
	}

	/// Builds a credential whose token and Graph endpoints point at the provided base URL.
	pub fn test_credential(base_url: &str) -> AppCredential {
		let base = base_url.trim_end_matches('/');

		AppCredential::builder("1234567890", "app-secret-it")
			.authorization_url(
				Url::parse(&format!("{base}/v17.0/dialog/oauth"))
					.expect("Failed to parse mock authorization URL."),
			)
			.access_token_url(
				Url::parse(&format!("{base}/v17.0/oauth/access_token"))
					.expect("Failed to parse mock token URL."),
			)
			.graph_url(Url::parse(base).expect("Failed to parse mock Graph URL."))
			.scope("leads_retrieval,pages_show_list,pages_manage_metadata")
			.build()
			.expect("Failed to build mock app credential.")
	}

	/// Constructs an [`OAuthClient`] backed by an in-memory store, the default provider
	/// strategy, and the reqwest transport used across integration tests.
	pub fn build_reqwest_test_client() -> (ReqwestTestClient, Arc<MemoryTokenStore>) {
		let store_backend = Arc::new(MemoryTokenStore::default());
		let store: Arc<dyn TokenStore> = store_backend.clone();
		let strategy: Arc<dyn ProviderStrategy> = Arc::new(DefaultProviderStrategy);
		let client = OAuthClient::with_http_client(
			store,
			strategy,
			test_reqwest_http_client(),
			Arc::new(ReqwestTransportErrorMapper),
		);

		(client, store_backend)
	}
}

mod _prelude {
	pub use std::{
		collections::{BTreeMap, HashMap},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(feature = "cli")] use {color_eyre as _, tracing_subscriber as _};
#[cfg(all(test, feature = "reqwest"))] use httpmock as _;
#[cfg(all(test, not(feature = "cli")))] use color_eyre as _;

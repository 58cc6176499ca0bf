//! Facebook app credentials and Graph endpoint helpers.

// self
use crate::{
	_prelude::*,
	auth::{AppId, Secret},
	error::ConfigError,
};

/// Graph API version used when none is configured.
pub const DEFAULT_API_VERSION: &str = "v17.0";
/// Graph API host used when none is configured.
pub const DEFAULT_GRAPH_URL: &str = "https://graph.facebook.com";

const DEFAULT_DIALOG_HOST: &str = "https://www.facebook.com";

/// Credentials and endpoints for the single active Facebook app.
///
/// The secret never leaves the process: it is only used to authenticate token exchanges and to
/// key webhook signatures, and every formatter redacts it.
#[derive(Clone, Debug)]
pub struct AppCredential {
	/// App identifier sent as `client_id`.
	pub app_id: AppId,
	/// App secret used for token exchanges and webhook signatures.
	pub app_secret: Secret,
	/// OAuth dialog endpoint users are redirected to.
	pub authorization_url: Url,
	/// Token endpoint used for code exchanges.
	pub access_token_url: Url,
	/// Raw scope string requested during authorization (comma separated).
	pub scope: String,
	/// Graph API version segment, e.g. `v17.0`.
	pub api_version: String,
	/// Graph API host used for lead, form, and page reads.
	pub graph_url: Url,
	/// Enables the `fb_exchange_token` extension during refresh.
	pub token_extension: bool,
}
impl AppCredential {
	/// Returns a builder seeded with the app id and secret.
	pub fn builder(
		app_id: impl Into<String>,
		app_secret: impl Into<String>,
	) -> AppCredentialBuilder {
		AppCredentialBuilder::new(app_id.into(), app_secret.into())
	}

	/// Builds a versioned Graph API URL for the provided object path.
	pub fn graph_endpoint(&self, path: &str) -> Url {
		let mut url = self.graph_url.clone();

		if let Ok(mut segments) = url.path_segments_mut() {
			segments.pop_if_empty().push(&self.api_version);

			for segment in path.split('/').filter(|s| !s.is_empty()) {
				segments.push(segment);
			}
		}

		url
	}
}

/// Builder for [`AppCredential`] that fills Graph defaults and validates the result.
#[derive(Clone, Debug)]
pub struct AppCredentialBuilder {
	app_id: String,
	app_secret: Secret,
	authorization_url: Option<Url>,
	access_token_url: Option<Url>,
	scope: String,
	api_version: Option<String>,
	graph_url: Option<Url>,
	token_extension: bool,
}
impl AppCredentialBuilder {
	fn new(app_id: String, app_secret: String) -> Self {
		Self {
			app_id,
			app_secret: Secret::new(app_secret),
			authorization_url: None,
			access_token_url: None,
			scope: String::new(),
			api_version: None,
			graph_url: None,
			token_extension: false,
		}
	}

	/// Overrides the OAuth dialog endpoint.
	pub fn authorization_url(mut self, url: Url) -> Self {
		self.authorization_url = Some(url);

		self
	}

	/// Overrides the token endpoint.
	pub fn access_token_url(mut self, url: Url) -> Self {
		self.access_token_url = Some(url);

		self
	}

	/// Sets the requested scope string.
	pub fn scope(mut self, scope: impl Into<String>) -> Self {
		self.scope = scope.into();

		self
	}

	/// Sets the Graph API version.
	pub fn api_version(mut self, version: impl Into<String>) -> Self {
		self.api_version = Some(version.into());

		self
	}

	/// Overrides the Graph API host.
	pub fn graph_url(mut self, url: Url) -> Self {
		self.graph_url = Some(url);

		self
	}

	/// Enables or disables the `fb_exchange_token` extension.
	pub fn token_extension(mut self, enabled: bool) -> Self {
		self.token_extension = enabled;

		self
	}

	/// Consumes the builder and validates the credential.
	pub fn build(self) -> Result<AppCredential, ConfigError> {
		if self.app_id.trim().is_empty() {
			return Err(ConfigError::MissingAppId);
		}

		let app_id = AppId::new(&self.app_id)?;

		if self.app_secret.is_blank() {
			return Err(ConfigError::MissingAppSecret { app_id: app_id.to_string() });
		}

		let api_version = self
			.api_version
			.filter(|v| !v.trim().is_empty())
			.unwrap_or_else(|| DEFAULT_API_VERSION.to_owned());
		let graph_url = match self.graph_url {
			Some(url) => url,
			None => parse_url("graph_url", DEFAULT_GRAPH_URL)?,
		};
		let authorization_url = match self.authorization_url {
			Some(url) => url,
			None => parse_url(
				"authorization_url",
				&format!("{DEFAULT_DIALOG_HOST}/{api_version}/dialog/oauth"),
			)?,
		};
		let access_token_url = match self.access_token_url {
			Some(url) => url,
			None => parse_url(
				"access_token_url",
				&format!(
					"{}/{api_version}/oauth/access_token",
					graph_url.as_str().trim_end_matches('/')
				),
			)?,
		};

		validate_scheme("graph_url", &graph_url)?;
		validate_scheme("authorization_url", &authorization_url)?;
		validate_scheme("access_token_url", &access_token_url)?;

		Ok(AppCredential {
			app_id,
			app_secret: self.app_secret,
			authorization_url,
			access_token_url,
			scope: self.scope,
			api_version,
			graph_url,
			token_extension: self.token_extension,
		})
	}
}

pub(crate) fn parse_url(field: &'static str, raw: &str) -> Result<Url, ConfigError> {
	Url::parse(raw).map_err(|source| ConfigError::InvalidUrl { field, source })
}

fn validate_scheme(field: &'static str, url: &Url) -> Result<(), ConfigError> {
	match url.scheme() {
		"https" | "http" => Ok(()),
		_ => Err(ConfigError::UnsupportedScheme { field, url: url.to_string() }),
	}
}

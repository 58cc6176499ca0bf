//! Service configuration: a TOML file plus `LEADGEN__`-prefixed environment overrides.
//!
//! The configuration is loaded once at startup into a [`ConfigHandle`]. [`ConfigHandle::reload`]
//! re-reads the sources and swaps the snapshot only when the new one validates, so readers
//! always observe a complete, valid [`ServiceConfig`].

// std
use std::{
	net::{Ipv4Addr, SocketAddr},
	path::{Path, PathBuf},
};
// crates.io
use config::{Config as RawConfig, Environment, File};
// self
use crate::{
	_prelude::*,
	auth::{AppCredential, FormId, PageId, Secret, SubscriptionName, credential::parse_url},
	error::ConfigError,
};

/// Prefix of environment variables overriding file values (`LEADGEN__APP__APP_SECRET`).
pub const ENV_PREFIX: &str = "LEADGEN";
/// Scope requested when none is configured.
pub const DEFAULT_SCOPE: &str = "leads_retrieval,pages_show_list,pages_manage_metadata";

/// Complete, validated service configuration.
#[derive(Clone, Debug, Deserialize)]
pub struct ServiceConfig {
	/// Master switch; a disabled service skips credential validation.
	#[serde(default = "default_true")]
	pub enabled: bool,
	/// Facebook app settings.
	#[serde(default)]
	pub app: CredentialSettings,
	/// Inbound HTTP listener settings.
	#[serde(default)]
	pub server: ServerSettings,
	/// Outbound HTTP settings.
	#[serde(default)]
	pub http: HttpSettings,
	/// Token persistence settings.
	#[serde(default)]
	pub store: StoreSettings,
	/// Webhook subscriptions registered at startup.
	#[serde(default)]
	pub subscriptions: Vec<SubscriptionSettings>,
}
impl ServiceConfig {
	/// Loads and validates configuration from `path` plus environment overrides.
	pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
		let raw = RawConfig::builder()
			.add_source(File::from(path.as_ref()).required(false))
			.add_source(Environment::with_prefix(ENV_PREFIX).prefix_separator("__").separator("__"))
			.build()?;

		Self::from_raw(raw)
	}

	/// Parses and validates configuration from a TOML string (no environment overrides).
	pub fn from_toml(source: &str) -> Result<Self, ConfigError> {
		let raw = RawConfig::builder()
			.add_source(File::from_str(source, config::FileFormat::Toml))
			.build()?;

		Self::from_raw(raw)
	}

	fn from_raw(raw: RawConfig) -> Result<Self, ConfigError> {
		let config: Self = raw.try_deserialize()?;

		config.validate()?;

		Ok(config)
	}

	/// Checks the invariants a running service relies on.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.enabled {
			self.credential()?;
			self.server.redirect_uri()?;
		}

		let mut seen = std::collections::BTreeSet::new();

		for subscription in &self.subscriptions {
			let (name, _, _) = subscription.validate()?;

			if !seen.insert(name) {
				return Err(ConfigError::DuplicateSubscription { name: subscription.name.clone() });
			}
		}

		Ok(())
	}

	/// Builds the app credential from the `[app]` table.
	pub fn credential(&self) -> Result<AppCredential, ConfigError> {
		self.app.credential()
	}
}

/// `[app]` table.
#[derive(Clone, Deserialize)]
pub struct CredentialSettings {
	/// App identifier.
	#[serde(default)]
	pub app_id: String,
	/// App secret.
	#[serde(default)]
	pub app_secret: String,
	/// OAuth dialog endpoint override.
	#[serde(default)]
	pub authorization_url: Option<String>,
	/// Token endpoint override.
	#[serde(default)]
	pub access_token_url: Option<String>,
	/// Comma-separated permissions requested during authorization.
	#[serde(default = "default_scope")]
	pub scope: String,
	/// Graph API version.
	#[serde(default)]
	pub api_version: Option<String>,
	/// Graph API host override.
	#[serde(default)]
	pub graph_url: Option<String>,
	/// Enables `fb_exchange_token` during refresh.
	#[serde(default)]
	pub token_extension: bool,
}
impl CredentialSettings {
	/// Converts the table into a validated [`AppCredential`].
	pub fn credential(&self) -> Result<AppCredential, ConfigError> {
		let mut builder = AppCredential::builder(self.app_id.trim(), self.app_secret.trim())
			.scope(self.scope.trim())
			.token_extension(self.token_extension);

		if let Some(version) = &self.api_version {
			builder = builder.api_version(version.trim());
		}
		if let Some(raw) = &self.authorization_url {
			builder = builder.authorization_url(parse_url("authorization_url", raw)?);
		}
		if let Some(raw) = &self.access_token_url {
			builder = builder.access_token_url(parse_url("access_token_url", raw)?);
		}
		if let Some(raw) = &self.graph_url {
			builder = builder.graph_url(parse_url("graph_url", raw)?);
		}

		builder.build()
	}
}
impl Default for CredentialSettings {
	fn default() -> Self {
		Self {
			app_id: String::new(),
			app_secret: String::new(),
			authorization_url: None,
			access_token_url: None,
			scope: default_scope(),
			api_version: None,
			graph_url: None,
			token_extension: false,
		}
	}
}
impl Debug for CredentialSettings {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("CredentialSettings")
			.field("app_id", &self.app_id)
			.field("app_secret", &"<redacted>")
			.field("authorization_url", &self.authorization_url)
			.field("access_token_url", &self.access_token_url)
			.field("scope", &self.scope)
			.field("api_version", &self.api_version)
			.field("graph_url", &self.graph_url)
			.field("token_extension", &self.token_extension)
			.finish()
	}
}

/// `[server]` table.
#[derive(Clone, Debug, Deserialize)]
pub struct ServerSettings {
	/// Socket the listener binds to.
	#[serde(default = "default_listen")]
	pub listen: SocketAddr,
	/// Externally reachable base URL, used to build the OAuth redirect URI.
	#[serde(default)]
	pub public_url: Option<String>,
	/// Bearer token guarding `/oauth/authorize`, `/oauth/status`, and `/oauth/refresh`.
	///
	/// Without one those routes refuse every request.
	#[serde(default)]
	pub operator_token: Option<Secret>,
}
impl ServerSettings {
	/// Redirect URI registered with the app: `{public_url}/oauth/callback`.
	pub fn redirect_uri(&self) -> Result<Url, ConfigError> {
		let base = match &self.public_url {
			Some(raw) => parse_url("server.public_url", raw)?,
			None => parse_url("server.public_url", &format!("http://{}", self.listen))?,
		};
		let mut url = base;

		if let Ok(mut segments) = url.path_segments_mut() {
			segments.pop_if_empty().push("oauth").push("callback");
		}

		Ok(url)
	}
}
impl Default for ServerSettings {
	fn default() -> Self {
		Self { listen: default_listen(), public_url: None, operator_token: None }
	}
}

/// `[http]` table.
#[derive(Clone, Debug, Deserialize)]
pub struct HttpSettings {
	/// Per-request timeout for outbound calls, in seconds.
	#[serde(default = "default_timeout_secs")]
	pub timeout_secs: u64,
}
impl HttpSettings {
	/// Per-request timeout as a standard duration.
	pub fn timeout(&self) -> std::time::Duration {
		std::time::Duration::from_secs(self.timeout_secs.max(1))
	}
}
impl Default for HttpSettings {
	fn default() -> Self {
		Self { timeout_secs: default_timeout_secs() }
	}
}

/// `[store]` table.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StoreSettings {
	/// Keep the token in memory only.
	#[default]
	Memory,
	/// Persist the token to a JSON file.
	File {
		/// Location of the JSON file.
		path: PathBuf,
	},
}

/// `[[subscriptions]]` entry.
#[derive(Clone, Debug, Deserialize)]
pub struct SubscriptionSettings {
	/// Unique subscription name.
	pub name: String,
	/// Page the subscription listens to.
	pub page_id: String,
	/// Form the subscription listens to.
	pub form_id: String,
	/// Fixed verify token; generated when omitted.
	#[serde(default)]
	pub verify_token: Option<String>,
	/// Whether deliveries are accepted.
	#[serde(default = "default_true")]
	pub enabled: bool,
	/// Emit the inline summary without calling the lead-detail API.
	#[serde(default)]
	pub simplify_output: bool,
}
impl SubscriptionSettings {
	/// Validates the identifiers of the entry.
	pub fn validate(&self) -> Result<(SubscriptionName, PageId, FormId), ConfigError> {
		Ok((
			SubscriptionName::new(&self.name)?,
			PageId::new(&self.page_id)?,
			FormId::new(&self.form_id)?,
		))
	}
}

/// Shared, reloadable configuration snapshot.
#[derive(Clone, Debug)]
pub struct ConfigHandle {
	path: PathBuf,
	inner: Arc<RwLock<Arc<ServiceConfig>>>,
}
impl ConfigHandle {
	/// Loads configuration from `path` (plus environment overrides).
	pub fn load(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
		let path = path.into();
		let config = ServiceConfig::load(&path)?;

		Ok(Self { path, inner: Arc::new(RwLock::new(Arc::new(config))) })
	}

	/// Wraps an already validated configuration; `reload` re-reads `path`.
	pub fn from_config(path: impl Into<PathBuf>, config: ServiceConfig) -> Self {
		Self { path: path.into(), inner: Arc::new(RwLock::new(Arc::new(config))) }
	}

	/// Returns the current snapshot.
	pub fn current(&self) -> Arc<ServiceConfig> {
		self.inner.read().clone()
	}

	/// Re-reads the sources; the snapshot is replaced only when the new configuration is valid.
	pub fn reload(&self) -> Result<Arc<ServiceConfig>, ConfigError> {
		match ServiceConfig::load(&self.path) {
			Ok(config) => {
				let config = Arc::new(config);

				*self.inner.write() = config.clone();

				#[cfg(feature = "tracing")]
				tracing::info!(path = %self.path.display(), "Configuration reloaded.");

				Ok(config)
			},
			Err(e) => {
				#[cfg(feature = "tracing")]
				tracing::error!(path = %self.path.display(), error = %e, "Configuration reload rejected.");

				Err(e)
			},
		}
	}
}

fn default_true() -> bool {
	true
}

fn default_scope() -> String {
	DEFAULT_SCOPE.to_owned()
}

fn default_listen() -> SocketAddr {
	SocketAddr::from((Ipv4Addr::UNSPECIFIED, 8080))
}

fn default_timeout_secs() -> u64 {
	10
}

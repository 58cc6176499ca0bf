//! Access-token records, lifecycle helpers, and status reports.

// self
use crate::{_prelude::*, auth::token::secret::Secret};

/// Current lifecycle status for a token record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenStatus {
	/// Token is usable.
	Active,
	/// Token exceeded its expiry instant.
	Expired,
}

/// Why a record carries (or lacks) an expiry instant.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpirySource {
	/// The provider reported `expires_in`/`expires`.
	#[default]
	Provider,
	/// The provider omitted the expiry; lifetime is unknown.
	NotReported,
	/// The token was minted through a flow documented to return long-lived tokens.
	LongLived,
}

/// Errors produced by [`TokenRecordBuilder`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum TokenRecordBuilderError {
	/// Issued when no access token value was provided.
	#[error("Access token is required.")]
	MissingAccessToken,
}

/// The single active access token for the configured app.
#[derive(Clone, Serialize, Deserialize)]
pub struct TokenRecord {
	/// Access token secret; callers must avoid logging it.
	pub access_token: Secret,
	/// Expiry instant, or `None` when the provider did not communicate one.
	#[serde(with = "time::serde::rfc3339::option")]
	pub expires_at: Option<OffsetDateTime>,
	/// Instant the token was obtained.
	#[serde(with = "time::serde::rfc3339")]
	pub obtained_at: OffsetDateTime,
	/// Provenance of `expires_at`.
	#[serde(default)]
	pub expiry_source: ExpirySource,
}
impl TokenRecord {
	/// Returns a builder for constructing records.
	pub fn builder() -> TokenRecordBuilder {
		TokenRecordBuilder::default()
	}

	/// Computes the lifecycle status at a given instant.
	pub fn status_at(&self, instant: OffsetDateTime) -> TokenStatus {
		match self.expires_at {
			Some(expires_at) if instant >= expires_at => TokenStatus::Expired,
			_ => TokenStatus::Active,
		}
	}

	/// Convenience helper that checks the status using the current UTC instant.
	pub fn status(&self) -> TokenStatus {
		self.status_at(OffsetDateTime::now_utc())
	}

	/// Returns `true` if the record has expired at the provided instant.
	pub fn is_expired_at(&self, instant: OffsetDateTime) -> bool {
		matches!(self.status_at(instant), TokenStatus::Expired)
	}

	/// Returns `true` if the record is expired relative to the current clock.
	pub fn is_expired(&self) -> bool {
		matches!(self.status(), TokenStatus::Expired)
	}

	/// Returns `true` when no expiry instant is known.
	pub fn is_long_lived(&self) -> bool {
		self.expires_at.is_none()
	}

	/// Ensures the record may be used for outbound calls at `instant`.
	pub fn ensure_usable_at(&self, instant: OffsetDateTime) -> Result<&Secret> {
		match self.expires_at {
			Some(expired_at) if instant >= expired_at => Err(Error::TokenExpired { expired_at }),
			_ => Ok(&self.access_token),
		}
	}
}
impl Debug for TokenRecord {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenRecord")
			.field("access_token", &"<redacted>")
			.field("expires_at", &self.expires_at)
			.field("obtained_at", &self.obtained_at)
			.field("expiry_source", &self.expiry_source)
			.finish()
	}
}

/// Builder for [`TokenRecord`].
#[derive(Clone, Debug, Default)]
pub struct TokenRecordBuilder {
	access_token: Option<Secret>,
	obtained_at: Option<OffsetDateTime>,
	expires_at: Option<OffsetDateTime>,
	expires_in: Option<Duration>,
	long_lived: bool,
}
impl TokenRecordBuilder {
	/// Provides the access token value.
	pub fn access_token(mut self, token: impl Into<String>) -> Self {
		self.access_token = Some(Secret::new(token));

		self
	}

	/// Sets the obtained-at instant.
	pub fn obtained_at(mut self, instant: OffsetDateTime) -> Self {
		self.obtained_at = Some(instant);

		self
	}

	/// Sets an absolute expiry instant.
	pub fn expires_at(mut self, instant: OffsetDateTime) -> Self {
		self.expires_at = Some(instant);

		self
	}

	/// Sets a relative expiry duration from the obtained instant.
	pub fn expires_in(mut self, duration: Duration) -> Self {
		self.expires_in = Some(duration);

		self
	}

	/// Marks a record without expiry as documented long-lived rather than unknown.
	pub fn long_lived(mut self) -> Self {
		self.long_lived = true;

		self
	}

	/// Consumes the builder and produces a [`TokenRecord`].
	pub fn build(self) -> Result<TokenRecord, TokenRecordBuilderError> {
		let access_token = self
			.access_token
			.filter(|token| !token.is_blank())
			.ok_or(TokenRecordBuilderError::MissingAccessToken)?;
		let obtained_at = self.obtained_at.unwrap_or_else(OffsetDateTime::now_utc);
		let expires_at = match (self.expires_at, self.expires_in) {
			(Some(instant), _) => Some(instant),
			(None, Some(delta)) => Some(obtained_at + delta),
			(None, None) => None,
		};
		let expiry_source = match (expires_at, self.long_lived) {
			(Some(_), _) => ExpirySource::Provider,
			(None, true) => ExpirySource::LongLived,
			(None, false) => ExpirySource::NotReported,
		};

		Ok(TokenRecord { access_token, expires_at, obtained_at, expiry_source })
	}
}

/// Operator-facing token status computed without touching the network.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenStatusReport {
	/// A token is stored.
	pub has_token: bool,
	/// The stored token's expiry is in the past.
	pub is_expired: bool,
	/// The stored token has no expiry instant.
	pub is_long_lived: bool,
	/// Seconds until expiry, when an expiry is known and not yet reached.
	pub expires_in_seconds: Option<i64>,
	/// Expiry instant, when known.
	#[serde(with = "time::serde::rfc3339::option")]
	pub expires_at: Option<OffsetDateTime>,
	/// Provenance of the expiry, when a token is stored.
	pub expiry_source: Option<ExpirySource>,
}
impl TokenStatusReport {
	/// Evaluates the optional record at `now`.
	pub fn at(record: Option<&TokenRecord>, now: OffsetDateTime) -> Self {
		let Some(record) = record else {
			return Self {
				has_token: false,
				is_expired: false,
				is_long_lived: false,
				expires_in_seconds: None,
				expires_at: None,
				expiry_source: None,
			};
		};
		let is_expired = record.is_expired_at(now);
		let expires_in_seconds = match record.expires_at {
			Some(expires_at) if !is_expired => Some((expires_at - now).whole_seconds()),
			_ => None,
		};

		Self {
			has_token: true,
			is_expired,
			is_long_lived: record.is_long_lived(),
			expires_in_seconds,
			expires_at: record.expires_at,
			expiry_source: Some(record.expiry_source),
		}
	}
}

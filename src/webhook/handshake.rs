//! Subscription verification handshake (`GET /webhook`).

// self
use crate::{_prelude::*, auth::SubscriptionName, webhook::SubscriptionRegistry};

/// Mode value the provider sends when verifying a subscription.
pub const SUBSCRIBE_MODE: &str = "subscribe";

/// Query parameters of the verification request.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct HandshakeQuery {
	/// Expected to be `subscribe`.
	#[serde(rename = "hub.mode", default)]
	pub mode: Option<String>,
	/// Token configured on the provider side.
	#[serde(rename = "hub.verify_token", default)]
	pub verify_token: Option<String>,
	/// Opaque value to echo back.
	#[serde(rename = "hub.challenge", default)]
	pub challenge: Option<String>,
}

/// Result of a verification request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandshakeOutcome {
	/// The token matched; respond with `challenge` unmodified.
	Accepted {
		/// Subscription that matched the token.
		subscription: SubscriptionName,
		/// Challenge to echo.
		challenge: String,
	},
	/// The request must be answered with 403.
	Rejected(HandshakeRejection),
}

/// Why a handshake was refused.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HandshakeRejection {
	/// `hub.mode` was absent or not `subscribe`.
	WrongMode,
	/// `hub.challenge` was absent.
	MissingChallenge,
	/// No enabled subscription carries the presented token.
	UnknownToken,
}
impl HandshakeRejection {
	/// Short label for logs.
	pub fn as_str(self) -> &'static str {
		match self {
			Self::WrongMode => "wrong_mode",
			Self::MissingChallenge => "missing_challenge",
			Self::UnknownToken => "unknown_token",
		}
	}
}

/// Evaluates a verification request against the registry, stamping `verified_at` on success.
pub fn evaluate(
	registry: &SubscriptionRegistry,
	query: &HandshakeQuery,
	now: OffsetDateTime,
) -> HandshakeOutcome {
	if query.mode.as_deref() != Some(SUBSCRIBE_MODE) {
		return HandshakeOutcome::Rejected(HandshakeRejection::WrongMode);
	}

	let Some(challenge) = query.challenge.clone() else {
		return HandshakeOutcome::Rejected(HandshakeRejection::MissingChallenge);
	};
	let Some(subscription) =
		query.verify_token.as_deref().and_then(|token| registry.find_by_verify_token(token))
	else {
		return HandshakeOutcome::Rejected(HandshakeRejection::UnknownToken);
	};

	registry.mark_verified(&subscription.name, now);

	HandshakeOutcome::Accepted { subscription: subscription.name, challenge }
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::config::SubscriptionSettings;

	fn registry() -> SubscriptionRegistry {
		SubscriptionRegistry::from_settings(&[SubscriptionSettings {
			name: "spring".into(),
			page_id: "111".into(),
			form_id: "222".into(),
			verify_token: Some("tok-123".into()),
			enabled: true,
			simplify_output: false,
		}])
		.expect("Registry fixture should build.")
	}

	fn query(mode: &str, token: &str, challenge: &str) -> HandshakeQuery {
		HandshakeQuery {
			mode: Some(mode.into()),
			verify_token: Some(token.into()),
			challenge: Some(challenge.into()),
		}
	}

	#[test]
	fn matching_token_echoes_challenge() {
		let registry = registry();
		let now = OffsetDateTime::now_utc();
		let outcome = evaluate(&registry, &query("subscribe", "tok-123", "abc123"), now);

		assert!(matches!(
			outcome,
			HandshakeOutcome::Accepted { ref challenge, .. } if challenge == "abc123"
		));
		assert_eq!(registry.get("spring").and_then(|s| s.verified_at), Some(now));
	}

	#[test]
	fn mismatches_never_echo_challenge() {
		let registry = registry();
		let now = OffsetDateTime::now_utc();

		assert_eq!(
			evaluate(&registry, &query("subscribe", "tok-124", "abc123"), now),
			HandshakeOutcome::Rejected(HandshakeRejection::UnknownToken)
		);
		assert_eq!(
			evaluate(&registry, &query("unsubscribe", "tok-123", "abc123"), now),
			HandshakeOutcome::Rejected(HandshakeRejection::WrongMode)
		);
		assert_eq!(
			evaluate(
				&registry,
				&HandshakeQuery { challenge: None, ..query("subscribe", "tok-123", "") },
				now
			),
			HandshakeOutcome::Rejected(HandshakeRejection::MissingChallenge)
		);
		assert_eq!(registry.get("spring").and_then(|s| s.verified_at), None);
	}

	#[test]
	fn query_uses_dotted_parameter_names() {
		let query: HandshakeQuery = serde_json::from_str(
			r#"{"hub.mode":"subscribe","hub.verify_token":"tok-123","hub.challenge":"abc123"}"#,
		)
		.expect("Query should deserialize.");

		assert_eq!(query.challenge.as_deref(), Some("abc123"));
	}
}

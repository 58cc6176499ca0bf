//! `X-Hub-Signature-256` verification.

// crates.io
use hmac::{Hmac, Mac};
use sha2::Sha256;
// self
use crate::{_prelude::*, auth::Secret};

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the delivery signature.
pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";

const PREFIX: &str = "sha256=";

/// Computes the header value the provider would send for `body`.
pub fn sign(app_secret: &Secret, body: &[u8]) -> Result<String> {
	Ok(format!("{PREFIX}{}", hex::encode(digest(app_secret, body)?.finalize().into_bytes())))
}

/// Verifies `header` against an HMAC-SHA256 of the raw `body` keyed by the app secret.
///
/// The comparison runs in constant time. Failure reasons are short static strings meant for
/// logs only.
pub fn verify_signature(app_secret: &Secret, body: &[u8], header: Option<&str>) -> Result<()> {
	let header = header.ok_or(Error::SignatureInvalid { reason: "missing signature header" })?;
	let hex_digest = header
		.trim()
		.strip_prefix(PREFIX)
		.ok_or(Error::SignatureInvalid { reason: "unsupported signature scheme" })?;
	let expected = hex::decode(hex_digest)
		.map_err(|_| Error::SignatureInvalid { reason: "signature is not hex encoded" })?;

	digest(app_secret, body)?
		.verify_slice(&expected)
		.map_err(|_| Error::SignatureInvalid { reason: "signature mismatch" })
}

fn digest(app_secret: &Secret, body: &[u8]) -> Result<HmacSha256> {
	let mut mac = <HmacSha256 as Mac>::new_from_slice(app_secret.expose().as_bytes())
		.map_err(|_| Error::SignatureInvalid { reason: "invalid signing key" })?;

	mac.update(body);

	Ok(mac)
}

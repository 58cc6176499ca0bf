//! Lead-generation delivery payloads: `entry[] -> changes[] -> value`.

// crates.io
use serde::{Deserializer, de::Error as _};
use serde_json::Value;
// self
use crate::{
	_prelude::*,
	auth::{FormId, LeadId, PageId},
};

/// `object` value of page deliveries.
pub const PAGE_OBJECT: &str = "page";
/// `field` value of lead-generation changes.
pub const LEADGEN_FIELD: &str = "leadgen";

/// One `leadgen` change value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadNotification {
	/// Lead identifier used for enrichment.
	#[serde(deserialize_with = "lenient_id")]
	pub leadgen_id: LeadId,
	/// Page the form belongs to.
	#[serde(deserialize_with = "lenient_id")]
	pub page_id: PageId,
	/// Form the lead was submitted through.
	#[serde(deserialize_with = "lenient_id")]
	pub form_id: FormId,
	/// Ad that produced the lead.
	#[serde(default, deserialize_with = "lenient_opt_string")]
	pub ad_id: Option<String>,
	/// Legacy name of the ad identifier; stands in for `ad_id` when that is absent.
	#[serde(default, deserialize_with = "lenient_opt_string")]
	pub adgroup_id: Option<String>,
	/// Submission time.
	#[serde(
		default,
		deserialize_with = "unix_time",
		serialize_with = "time::serde::rfc3339::option::serialize"
	)]
	pub created_time: Option<OffsetDateTime>,
}

/// A change or entry that could not be decoded.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EntryFailure {
	/// Position of the entry within `entry[]`.
	pub index: usize,
	/// Decoding failure including the JSON path.
	pub reason: String,
}

/// Outcome of parsing one delivery body.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ParsedDelivery {
	/// `object` field of the delivery.
	pub object: String,
	/// Entries present in the body.
	pub entries: usize,
	/// Decoded lead notifications, in body order.
	pub notifications: Vec<LeadNotification>,
	/// Isolated failures; sibling entries are still decoded.
	pub failures: Vec<EntryFailure>,
	/// Changes skipped because they are not `leadgen`, or deliveries for other objects.
	pub ignored: usize,
}

#[derive(Debug, Deserialize)]
struct Entry {
	#[serde(default)]
	changes: Vec<Change>,
}

#[derive(Debug, Deserialize)]
struct Change {
	field: String,
	#[serde(default)]
	value: Value,
}

/// Parses a delivery body.
///
/// A body that is not a JSON object, or a page delivery without an `entry` array, is
/// [`Error::MalformedPayload`]. Deliveries for other objects parse to an empty result counted as
/// ignored. Within a page delivery every entry and change is decoded independently.
pub fn parse_delivery(body: &[u8]) -> Result<ParsedDelivery> {
	let root: Value = serde_json::from_slice(body)
		.map_err(|e| Error::MalformedPayload { reason: format!("invalid JSON: {e}") })?;
	let Value::Object(mut root) = root else {
		return Err(Error::MalformedPayload { reason: "body is not a JSON object".into() });
	};
	let object = match root.remove("object") {
		Some(Value::String(object)) => object,
		_ => return Err(Error::MalformedPayload { reason: "`object` is missing".into() }),
	};

	if object != PAGE_OBJECT {
		return Ok(ParsedDelivery { object, ignored: 1, ..Default::default() });
	}

	let Some(Value::Array(entries)) = root.remove("entry") else {
		return Err(Error::MalformedPayload { reason: "`entry` is not an array".into() });
	};
	let mut parsed = ParsedDelivery { object, entries: entries.len(), ..Default::default() };

	for (index, entry) in entries.into_iter().enumerate() {
		let entry: Entry = match serde_path_to_error::deserialize(entry) {
			Ok(entry) => entry,
			Err(e) => {
				parsed.failures.push(EntryFailure { index, reason: describe(index, None, &e) });

				continue;
			},
		};

		for (position, change) in entry.changes.into_iter().enumerate() {
			if change.field != LEADGEN_FIELD {
				parsed.ignored += 1;

				continue;
			}

			match serde_path_to_error::deserialize(change.value) {
				Ok(notification) => parsed.notifications.push(notification),
				Err(e) => parsed
					.failures
					.push(EntryFailure { index, reason: describe(index, Some(position), &e) }),
			}
		}
	}

	Ok(parsed)
}

fn describe(
	index: usize,
	change: Option<usize>,
	error: &serde_path_to_error::Error<serde_json::Error>,
) -> String {
	let mut path = format!("entry[{index}]");

	if let Some(change) = change {
		path.push_str(&format!(".changes[{change}].value"));
	}

	let inner = error.path().to_string();

	if inner != "." {
		path.push('.');
		path.push_str(&inner);
	}

	format!("{path}: {}", error.inner())
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
	D: Deserializer<'de>,
{
	match Option::<Value>::deserialize(deserializer)? {
		None | Some(Value::Null) => Ok(None),
		Some(Value::String(s)) => Ok(Some(s)),
		Some(Value::Number(n)) => Ok(Some(n.to_string())),
		Some(other) => Err(D::Error::custom(format!("expected a string or number, got {other}"))),
	}
}

fn lenient_opt_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
	D: Deserializer<'de>,
{
	Ok(lenient_string(deserializer)?.filter(|s| !s.trim().is_empty()))
}

fn lenient_id<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
	D: Deserializer<'de>,
	T: TryFrom<String>,
	T::Error: Display,
{
	let raw = lenient_string(deserializer)?.ok_or_else(|| D::Error::custom("identifier is null"))?;

	T::try_from(raw).map_err(D::Error::custom)
}

fn unix_time<'de, D>(deserializer: D) -> Result<Option<OffsetDateTime>, D::Error>
where
	D: Deserializer<'de>,
{
	let Some(raw) = lenient_string(deserializer)? else { return Ok(None) };
	let seconds = raw.trim().parse::<i64>().map_err(D::Error::custom)?;

	OffsetDateTime::from_unix_timestamp(seconds).map(Some).map_err(D::Error::custom)
}

//! Strongly typed Graph identifiers (apps, pages, forms, leads) and subscription names.
//!
//! Graph object ids are decimal strings; webhook payloads sometimes carry them as JSON numbers,
//! which the payload decoder normalizes before they reach these types. Subscription names are
//! operator-chosen slugs.

// std
use std::{borrow::Borrow, ops::Deref};
// self
use crate::_prelude::*;

/// Longest Graph object id accepted.
pub const GRAPH_ID_MAX_LEN: usize = 32;
/// Longest subscription name accepted.
pub const SUBSCRIPTION_NAME_MAX_LEN: usize = 64;

/// Character and length rule applied to one identifier kind.
#[derive(Clone, Copy, Debug)]
struct Rule {
	kind: &'static str,
	max_len: usize,
	allowed: fn(char) -> bool,
}
impl Rule {
	fn check(&self, view: &str) -> Result<(), IdentifierError> {
		let kind = self.kind;

		if view.is_empty() {
			return Err(IdentifierError::Empty { kind });
		}
		if let Some(found) = view.chars().find(|c| !(self.allowed)(*c)) {
			return Err(IdentifierError::InvalidCharacter { kind, found });
		}
		if view.len() > self.max_len {
			return Err(IdentifierError::TooLong { kind, max: self.max_len });
		}

		Ok(())
	}
}

fn graph_id(kind: &'static str) -> Rule {
	Rule { kind, max_len: GRAPH_ID_MAX_LEN, allowed: |c| c.is_ascii_digit() }
}

fn slug(kind: &'static str) -> Rule {
	Rule {
		kind,
		max_len: SUBSCRIPTION_NAME_MAX_LEN,
		allowed: |c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'),
	}
}

macro_rules! def_id {
	($name:ident, $doc:literal, $rule:expr) => {
		#[doc = $doc]
		#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
		#[serde(try_from = "String", into = "String")]
		pub struct $name(String);
		impl $name {
			/// Validates `value` and wraps it.
			pub fn new(value: impl AsRef<str>) -> Result<Self, IdentifierError> {
				Self::try_from(value.as_ref().to_owned())
			}

			fn rule() -> Rule {
				$rule
			}
		}
		impl TryFrom<String> for $name {
			type Error = IdentifierError;

			fn try_from(value: String) -> Result<Self, Self::Error> {
				Self::rule().check(&value)?;

				Ok(Self(value))
			}
		}
		impl FromStr for $name {
			type Err = IdentifierError;

			fn from_str(s: &str) -> Result<Self, Self::Err> {
				Self::new(s)
			}
		}
		impl From<$name> for String {
			fn from(value: $name) -> Self {
				value.0
			}
		}
		impl Deref for $name {
			type Target = str;

			fn deref(&self) -> &str {
				&self.0
			}
		}
		impl AsRef<str> for $name {
			fn as_ref(&self) -> &str {
				&self.0
			}
		}
		impl Borrow<str> for $name {
			fn borrow(&self) -> &str {
				&self.0
			}
		}
		impl Debug for $name {
			fn fmt(&self, f: &mut Formatter) -> FmtResult {
				write!(f, "{}({})", Self::rule().kind, self.0)
			}
		}
		impl Display for $name {
			fn fmt(&self, f: &mut Formatter) -> FmtResult {
				f.write_str(&self.0)
			}
		}
	};
}

/// Identifier validation failure.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ThisError)]
pub enum IdentifierError {
	/// Nothing was supplied.
	#[error("{kind} identifier cannot be empty.")]
	Empty {
		/// Identifier kind.
		kind: &'static str,
	},
	/// A character outside the kind's alphabet was found.
	#[error("{kind} identifier contains {found:?}.")]
	InvalidCharacter {
		/// Identifier kind.
		kind: &'static str,
		/// First offending character.
		found: char,
	},
	/// Longer than the kind allows.
	#[error("{kind} identifier exceeds {max} characters.")]
	TooLong {
		/// Identifier kind.
		kind: &'static str,
		/// Maximum permitted length.
		max: usize,
	},
}

def_id! { AppId, "Facebook app identifier (the OAuth `client_id`).", graph_id("App") }
def_id! { PageId, "Facebook page identifier.", graph_id("Page") }
def_id! { FormId, "Lead Ads form identifier.", graph_id("Form") }
def_id! { LeadId, "Lead Ads submission identifier (`leadgen_id`).", graph_id("Lead") }
def_id! {
	SubscriptionName,
	"Operator-chosen webhook subscription name: ASCII letters, digits, `-`, `_`, `.`.",
	slug("Subscription")
}

//! Strongly typed identifiers for identity-provider users and backend accounts.

// std
use std::{borrow::Borrow, ops::Deref};
// crates.io
use base64::{Engine, engine::general_purpose::STANDARD_NO_PAD};
use sha2::{Digest, Sha256};
// self
use crate::_prelude::*;

const IDENTIFIER_MAX_LEN: usize = 128;

/// Error returned when identifier validation fails.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ThisError)]
pub enum IdentifierError {
	/// The identifier was empty or whitespace.
	#[error("Identity identifier cannot be empty.")]
	Empty,
	/// The identifier contains whitespace characters.
	#[error("Identity identifier contains whitespace.")]
	ContainsWhitespace,
	/// The identifier exceeded the allowed character count.
	#[error("Identity identifier exceeds {max} characters.")]
	TooLong {
		/// Maximum permitted character count.
		max: usize,
	},
	/// The value is not a positive backend user id.
	#[error("`{value}` is not a numeric user id.")]
	NotNumeric {
		/// Offending input.
		value: String,
	},
}

/// Identity-provider user identifier (a UUID for the hosted provider, but treated as opaque).
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct IdentityId(String);
impl IdentityId {
	/// Creates a new identifier after validation.
	pub fn new(value: impl AsRef<str>) -> Result<Self, IdentifierError> {
		let view = value.as_ref();

		validate_view(view)?;

		Ok(Self(view.to_owned()))
	}

	/// Log-safe digest of the identifier, used in spans instead of the raw value.
	pub fn fingerprint(&self) -> String {
		let mut hasher = Sha256::new();

		hasher.update(self.0.as_bytes());

		let digest = hasher.finalize();

		STANDARD_NO_PAD.encode(&digest[..9])
	}
}
impl Deref for IdentityId {
	type Target = str;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}
impl AsRef<str> for IdentityId {
	fn as_ref(&self) -> &str {
		&self.0
	}
}
impl Borrow<str> for IdentityId {
	fn borrow(&self) -> &str {
		&self.0
	}
}
impl From<IdentityId> for String {
	fn from(value: IdentityId) -> Self {
		value.0
	}
}
impl TryFrom<String> for IdentityId {
	type Error = IdentifierError;

	fn try_from(value: String) -> Result<Self, Self::Error> {
		validate_view(&value)?;

		Ok(Self(value))
	}
}
impl Debug for IdentityId {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "Identity({})", self.fingerprint())
	}
}
impl Display for IdentityId {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.0)
	}
}
impl FromStr for IdentityId {
	type Err = IdentifierError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::new(s)
	}
}

/// Numeric backend account id; realtime topics are scoped by it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub u64);
impl UserId {
	/// Returns the raw numeric value.
	pub const fn get(self) -> u64 {
		self.0
	}
}
impl Display for UserId {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "{}", self.0)
	}
}
impl FromStr for UserId {
	type Err = IdentifierError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.trim().parse::<u64>() {
			Ok(value) if value > 0 => Ok(Self(value)),
			_ => Err(IdentifierError::NotNumeric { value: s.to_owned() }),
		}
	}
}

fn validate_view(view: &str) -> Result<(), IdentifierError> {
	if view.is_empty() {
		return Err(IdentifierError::Empty);
	}
	if view.chars().any(char::is_whitespace) {
		return Err(IdentifierError::ContainsWhitespace);
	}
	if view.len() > IDENTIFIER_MAX_LEN {
		return Err(IdentifierError::TooLong { max: IDENTIFIER_MAX_LEN });
	}

	Ok(())
}

//! Durable slot contract and built-in implementations for the current application token.
//!
//! The slot holds two named entries, the bearer token and the last-known user projection.
//! They are written together by the token bridge and cleared together on sign-out or forced
//! logout; every other component only reads them.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::{MemoryStore, StoreOp};

// self
use crate::{_prelude::*, auth::ApplicationToken};

/// Boxed future returned by [`TokenStore`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Name of the bearer token entry.
pub const TOKEN_ENTRY: &str = "token";
/// Name of the user projection entry.
pub const USER_ENTRY: &str = "user";

/// Storage backend contract for the durable token slot.
pub trait TokenStore
where
	Self: Send + Sync,
{
	/// Reads the current token and user projection, if present.
	fn get(&self) -> StoreFuture<'_, Option<ApplicationToken>>;

	/// Replaces the current token and user projection.
	fn set(&self, token: ApplicationToken) -> StoreFuture<'_, ()>;

	/// Removes both entries.
	fn clear(&self) -> StoreFuture<'_, ()>;
}

/// Error type produced by [`TokenStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failures surfaced by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}

/// On-disk layout of the slot: one object with the two named entries.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct SlotSnapshot {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub(crate) token: Option<crate::auth::TokenSecret>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub(crate) user: Option<crate::auth::UserProjection>,
}
impl SlotSnapshot {
	pub(crate) fn into_token(self) -> Option<ApplicationToken> {
		match (self.token, self.user) {
			(Some(token), Some(user)) => Some(ApplicationToken { token, user }),
			_ => None,
		}
	}
}
impl From<ApplicationToken> for SlotSnapshot {
	fn from(value: ApplicationToken) -> Self {
		Self { token: Some(value.token), user: Some(value.user) }
	}
}

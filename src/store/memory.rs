//! Thread-safe in-memory [`TokenStore`] implementation for tests and short-lived clients.

// self
use crate::{
	_prelude::*,
	auth::ApplicationToken,
	store::{StoreError, StoreFuture, TokenStore},
};

/// Mutation recorded by [`MemoryStore`], in the order it happened.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreOp {
	/// A token was written; carries the exposed bearer value.
	Set(String),
	/// Both entries were removed.
	Clear,
}

/// In-process slot that also journals its mutations so callers can assert ordering.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
	slot: Arc<RwLock<Option<ApplicationToken>>>,
	journal: Arc<Mutex<Vec<StoreOp>>>,
}
impl MemoryStore {
	/// Creates a store pre-populated with a token, as if restored after a reload.
	pub fn with_token(token: ApplicationToken) -> Self {
		let store = Self::default();

		*store.slot.write() = Some(token);

		store
	}

	/// Returns the current token without going through the async contract.
	pub fn snapshot(&self) -> Option<ApplicationToken> {
		self.slot.read().clone()
	}

	/// Returns every mutation applied so far.
	pub fn journal(&self) -> Vec<StoreOp> {
		self.journal.lock().clone()
	}

	fn set_now(&self, token: ApplicationToken) -> Result<(), StoreError> {
		let op = StoreOp::Set(token.token.expose().to_owned());

		*self.slot.write() = Some(token);
		self.journal.lock().push(op);

		Ok(())
	}

	fn clear_now(&self) -> Result<(), StoreError> {
		self.slot.write().take();
		self.journal.lock().push(StoreOp::Clear);

		Ok(())
	}
}
impl TokenStore for MemoryStore {
	fn get(&self) -> StoreFuture<'_, Option<ApplicationToken>> {
		let current = self.snapshot();

		Box::pin(async move { Ok(current) })
	}

	fn set(&self, token: ApplicationToken) -> StoreFuture<'_, ()> {
		Box::pin(async move { self.set_now(token) })
	}

	fn clear(&self) -> StoreFuture<'_, ()> {
		Box::pin(async move { self.clear_now() })
	}
}

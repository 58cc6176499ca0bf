//! Thread-safe in-memory [`TokenStore`] for local development and tests.

// self
use crate::{
	_prelude::*,
	auth::TokenRecord,
	store::{StoreFuture, TokenStore},
};

type Slot = Arc<RwLock<Option<TokenRecord>>>;

/// Keeps the active record in-process.
#[derive(Clone, Debug, Default)]
pub struct MemoryTokenStore(Slot);
impl MemoryTokenStore {
	/// Creates a store seeded with `record`.
	pub fn with_record(record: TokenRecord) -> Self {
		Self(Arc::new(RwLock::new(Some(record))))
	}

	/// Returns a clone of the current record without going through the async contract.
	pub fn snapshot(&self) -> Option<TokenRecord> {
		self.0.read().clone()
	}
}
impl TokenStore for MemoryTokenStore {
	fn get(&self) -> StoreFuture<'_, Option<TokenRecord>> {
		let slot = self.0.clone();

		Box::pin(async move { Ok(slot.read().clone()) })
	}

	fn put(&self, record: TokenRecord) -> StoreFuture<'_, ()> {
		let slot = self.0.clone();

		Box::pin(async move {
			*slot.write() = Some(record);

			Ok(())
		})
	}

	fn clear(&self) -> StoreFuture<'_, ()> {
		let slot = self.0.clone();

		Box::pin(async move {
			slot.write().take();

			Ok(())
		})
	}
}

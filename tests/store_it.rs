// std
use std::{env, fs, process, sync::Arc};
// crates.io
use time::{Duration, OffsetDateTime};
// self
use leadgen_broker::{
	auth::{ExpirySource, TokenRecord},
	store::{FileTokenStore, MemoryTokenStore, TokenStore},
};

fn record(token: &str) -> TokenRecord {
	TokenRecord::builder()
		.access_token(token)
		.expires_in(Duration::days(60))
		.build()
		.expect("Store fixture record should build.")
}

async fn exercise(store: Arc<dyn TokenStore>) {
	assert!(store.get().await.expect("Empty store should be readable.").is_none());

	store.put(record("EAAB-first")).await.expect("First write should succeed.");
	store.put(record("EAAB-second")).await.expect("Second write should succeed.");

	let current = store.get().await.expect("Store should be readable.").expect("Record expected.");

	assert_eq!(current.access_token.expose(), "EAAB-second");
	assert_eq!(current.expiry_source, ExpirySource::Provider);

	store.clear().await.expect("Clear should succeed.");

	assert!(store.get().await.expect("Store should be readable.").is_none());
}

#[tokio::test]
async fn memory_store_honors_contract() {
	exercise(Arc::new(MemoryTokenStore::default())).await;
}

#[tokio::test]
async fn file_store_honors_contract_and_survives_reopen() {
	let dir = env::temp_dir().join(format!(
		"leadgen_broker_store_it_{}_{}",
		process::id(),
		OffsetDateTime::now_utc().unix_timestamp_nanos()
	));
	let path = dir.join("nested").join("token.json");
	let store = FileTokenStore::open(&path).expect("File store should open.");

	exercise(Arc::new(store.clone())).await;

	let long_lived = TokenRecord::builder()
		.access_token("EAAB-long")
		.long_lived()
		.build()
		.expect("Long-lived record should build.");

	store.put(long_lived).await.expect("Write should succeed.");

	let reopened = FileTokenStore::open(&path).expect("File store should reopen.");
	let restored =
		reopened.get().await.expect("Store should be readable.").expect("Record expected.");

	assert_eq!(restored.access_token.expose(), "EAAB-long");
	assert_eq!(restored.expires_at, None);
	assert_eq!(restored.expiry_source, ExpirySource::LongLived);
	assert!(
		!fs::read_to_string(&path).expect("Snapshot should be readable.").contains("\"EAAB-first\"")
	);

	fs::remove_dir_all(&dir).unwrap_or_else(|e| {
		panic!("Failed to remove temporary store directory {}: {e}", dir.display())
	});
}

#[tokio::test]
async fn concurrent_writers_leave_one_complete_record() {
	let store: Arc<dyn TokenStore> = Arc::new(MemoryTokenStore::default());
	let writers = (0..8)
		.map(|i| {
			let store = store.clone();

			tokio::spawn(async move { store.put(record(&format!("EAAB-{i}"))).await })
		})
		.collect::<Vec<_>>();

	for writer in writers {
		writer.await.expect("Writer should not panic.").expect("Write should succeed.");
	}

	let current = store.get().await.expect("Store should be readable.").expect("Record expected.");

	assert!(current.access_token.expose().starts_with("EAAB-"));
}

mod common;

// std
use std::{fs, sync::Arc};
// crates.io
use httpmock::prelude::*;
use time::{Duration, OffsetDateTime};
// self
use common::*;
use hydra_broker::{
	error::{CorruptionError, Error},
	journal::{JournalEntry, RollbackOp},
	store::{FileStore, Storage},
};

#[tokio::test]
async fn committed_entries_survive_restart_and_are_swept() {
	let server = MockServer::start_async().await;
	let delete = server
		.mock_async(|when, then| {
			when.method(DELETE).path("/clients/orphan-1");
			then.status(204);
		})
		.await;
	let path = temp_path("journal_restart");
	let store = Arc::new(FileStore::open(&path).expect("File store should open."));
	let backend = hydra_backend(store);

	configure(&backend, &server.base_url(), &server.base_url(), "").await;

	let entry = backend
		.journal()
		.commit(&RollbackOp::DeleteClient { id: "orphan-1".into() })
		.await
		.expect("Commit should succeed.");

	// Simulates a crash between commit and execution.
	drop(backend);

	let reopened = Arc::new(FileStore::open(&path).expect("File store should reopen."));
	let backend = hydra_backend(reopened.clone());
	let pending = backend.journal().pending().await.expect("Listing should succeed.");

	assert_eq!(pending.len(), 1);
	assert_eq!(pending[0].id, entry.id);
	assert_eq!(pending[0].kind, "client");

	let report = backend.sweep().await.expect("Sweep should run.");

	delete.assert_async().await;

	assert_eq!(report.cleared, vec![entry.id]);
	assert!(reopened.list("wal/").await.expect("Listing should succeed.").is_empty());

	fs::remove_file(&path).expect("Temporary file store should be removable.");
}

#[tokio::test]
async fn unknown_entry_kinds_are_reported_and_kept() {
	let path = temp_path("journal_unknown_kind");
	let store = Arc::new(FileStore::open(&path).expect("File store should open."));
	let backend = hydra_backend(store.clone());

	configure(&backend, "http://127.0.0.1:9", "http://127.0.0.1:9", "").await;
	store
		.put(
			"wal/legacy",
			serde_json::to_vec(&JournalEntry {
				id: "legacy".into(),
				kind: "policy".into(),
				payload: serde_json::json!("p"),
				created_at: OffsetDateTime::now_utc() - Duration::days(1),
			})
			.expect("Fixture entry should encode."),
		)
		.await
		.expect("Fixture entry should be stored.");

	let report = backend.sweep().await.expect("Sweep should run.");

	assert!(report.cleared.is_empty());
	assert_eq!(report.failures.len(), 1);
	assert_eq!(report.failures[0].entry_id, "legacy");
	assert!(matches!(
		&report.failures[0].error,
		Error::Corruption(CorruptionError::UnknownKind { kind }) if kind == "policy"
	));
	assert!(store.get("wal/legacy").await.expect("Get should succeed.").is_some());

	fs::remove_file(&path).expect("Temporary file store should be removable.");
}

//! Key/value storage contract and built-in store implementations.
//!
//! Values are opaque bytes at the trait level; [`get_json`] and [`put_json`] layer the JSON
//! encoding used by every component on top. Keys are `/`-separated paths such as
//! `config/root`, `role/<name>`, and `wal/<entry-id>`.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

// std
use std::collections::BTreeSet;
// self
use crate::{_prelude::*, error::CorruptionError};

/// Boxed future returned by [`Storage`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Storage backend contract shared by every component.
///
/// The store is the only coordination point between concurrent requests, so implementations
/// must make each write visible to the next read.
pub trait Storage
where
	Self: Send + Sync,
{
	/// Fetches the raw value stored under `key`, if present.
	fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<Vec<u8>>>;

	/// Persists or replaces the value stored under `key`.
	fn put<'a>(&'a self, key: &'a str, value: Vec<u8>) -> StoreFuture<'a, ()>;

	/// Removes `key`; succeeds when the key is absent.
	fn delete<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()>;

	/// Lists the immediate children of `prefix`.
	///
	/// Nested keys are reported once with a trailing `/`, matching the semantics of
	/// [`list_children`].
	fn list<'a>(&'a self, prefix: &'a str) -> StoreFuture<'a, Vec<String>>;
}

/// Error type produced by [`Storage`] implementations.
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

/// Reads and decodes a JSON document.
///
/// Undecodable documents are reported as [`CorruptionError::MalformedEntry`] with the failing
/// path so a tampered entry is never mistaken for a missing one.
pub async fn get_json<T>(store: &dyn Storage, key: &str) -> Result<Option<T>>
where
	T: for<'de> Deserialize<'de>,
{
	let Some(bytes) = store.get(key).await? else {
		return Ok(None);
	};
	let mut de = serde_json::Deserializer::from_slice(&bytes);
	let value = serde_path_to_error::deserialize(&mut de)
		.map_err(|source| CorruptionError::MalformedEntry { key: key.to_owned(), source })?;

	Ok(Some(value))
}

/// Encodes and writes a JSON document.
pub async fn put_json<T>(store: &dyn Storage, key: &str, value: &T) -> Result<()>
where
	T: ?Sized + Serialize,
{
	let bytes = serde_json::to_vec(value).map_err(|e| StoreError::Serialization {
		message: format!("Failed to encode {key}: {e}"),
	})?;

	store.put(key, bytes).await?;

	Ok(())
}

/// Computes the immediate children of `prefix` among `keys`.
pub fn list_children<'k, I>(keys: I, prefix: &str) -> Vec<String>
where
	I: IntoIterator<Item = &'k String>,
{
	let children = keys
		.into_iter()
		.filter_map(|key| key.strip_prefix(prefix))
		.filter(|rest| !rest.is_empty())
		.map(|rest| match rest.find('/') {
			Some(idx) => rest[..=idx].to_owned(),
			None => rest.to_owned(),
		})
		.collect::<BTreeSet<_>>();

	children.into_iter().collect()
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::error::Error;

	#[test]
	fn store_error_converts_into_backend_error_with_source() {
		let store_error = StoreError::Backend { message: "database unreachable".into() };
		let error: Error = store_error.clone().into();

		assert!(matches!(error, Error::Storage(_)));
		assert!(error.to_string().contains("database unreachable"));

		let source = StdError::source(&error)
			.expect("Backend error should expose the original store error as its source.");

		assert_eq!(source.to_string(), store_error.to_string());
	}

	#[test]
	fn list_children_collapses_nested_keys() {
		let keys = ["role/a", "role/b", "role/nested/c", "role/nested/d", "config/root"]
			.map(String::from);
		let children = list_children(keys.iter(), "role/");

		assert_eq!(children, vec!["a".to_owned(), "b".to_owned(), "nested/".to_owned()]);
		assert!(list_children(keys.iter(), "wal/").is_empty());
	}

	#[tokio::test]
	async fn malformed_documents_are_corruption() {
		let store = MemoryStore::default();

		store
			.put("role/broken", b"{not json".to_vec())
			.await
			.expect("Writing raw bytes into the memory store should succeed.");

		let err = get_json::<serde_json::Value>(&store, "role/broken")
			.await
			.expect_err("Malformed JSON should not decode.");

		assert!(matches!(err, Error::Corruption(CorruptionError::MalformedEntry { .. })));
	}
}

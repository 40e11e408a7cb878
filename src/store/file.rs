//! Simple file-backed [`Storage`] that survives process restarts.

// std
use std::{
	fs::{self, File},
	io::Write,
	path::{Path, PathBuf},
};
// self
use crate::{
	_prelude::*,
	store::{self, Storage, StoreError, StoreFuture},
};

type Snapshot = BTreeMap<String, Vec<u8>>;

/// Persists every entry to a JSON file after each mutation.
///
/// Writes go through a temporary file followed by a rename, so a crash mid-write leaves the
/// previous snapshot intact.
#[derive(Clone, Debug)]
pub struct FileStore {
	path: PathBuf,
	inner: Arc<RwLock<Snapshot>>,
}
impl FileStore {
	/// Opens (or creates) a store at the provided path, eagerly loading existing data.
	pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
		let path = path.into();

		Self::ensure_parent_exists(&path)?;

		let snapshot = Self::load_snapshot(&path)?;

		Ok(Self { path, inner: Arc::new(RwLock::new(snapshot)) })
	}

	/// Location of the backing file.
	pub fn path(&self) -> &Path {
		&self.path
	}

	fn load_snapshot(path: &Path) -> Result<Snapshot, StoreError> {
		if !path.exists() {
			return Ok(Snapshot::new());
		}

		let metadata = path.metadata().map_err(|e| StoreError::Backend {
			message: format!("Failed to inspect {}: {e}", path.display()),
		})?;

		if metadata.len() == 0 {
			return Ok(Snapshot::new());
		}

		let bytes = fs::read(path).map_err(|e| StoreError::Backend {
			message: format!("Failed to read {}: {e}", path.display()),
		})?;
		let entries: BTreeMap<String, serde_json::Value> =
			serde_json::from_slice(&bytes).map_err(|e| StoreError::Serialization {
				message: format!("Failed to parse {}: {e}", path.display()),
			})?;

		entries
			.into_iter()
			.map(|(key, value)| {
				serde_json::to_vec(&value).map(|bytes| (key, bytes)).map_err(|e| {
					StoreError::Serialization { message: format!("Failed to re-encode entry: {e}") }
				})
			})
			.collect()
	}

	fn ensure_parent_exists(path: &Path) -> Result<(), StoreError> {
		if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
			fs::create_dir_all(parent).map_err(|e| StoreError::Backend {
				message: format!("Failed to create store directory {}: {e}", parent.display()),
			})?;
		}

		Ok(())
	}

	fn persist_locked(&self, contents: &Snapshot) -> Result<(), StoreError> {
		Self::ensure_parent_exists(&self.path)?;

		// Values are JSON documents; keep them readable in the snapshot.
		let mut readable = BTreeMap::new();

		for (key, bytes) in contents {
			let value: serde_json::Value =
				serde_json::from_slice(bytes).map_err(|e| StoreError::Serialization {
					message: format!("Entry {key} is not a JSON document: {e}"),
				})?;

			readable.insert(key, value);
		}

		let serialized =
			serde_json::to_vec_pretty(&readable).map_err(|e| StoreError::Serialization {
				message: format!("Failed to serialize store snapshot: {e}"),
			})?;
		let mut tmp_path = self.path.clone();

		tmp_path.set_extension("tmp");

		{
			let mut file = File::create(&tmp_path).map_err(|e| StoreError::Backend {
				message: format!("Failed to create {}: {e}", tmp_path.display()),
			})?;

			file.write_all(&serialized).map_err(|e| StoreError::Backend {
				message: format!("Failed to write {}: {e}", tmp_path.display()),
			})?;
			file.sync_all().map_err(|e| StoreError::Backend {
				message: format!("Failed to sync {}: {e}", tmp_path.display()),
			})?;
		}

		fs::rename(&tmp_path, &self.path).map_err(|e| StoreError::Backend {
			message: format!("Failed to replace {}: {e}", self.path.display()),
		})
	}
}
impl Storage for FileStore {
	fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<Vec<u8>>> {
		Box::pin(async move { Ok(self.inner.read().get(key).cloned()) })
	}

	fn put<'a>(&'a self, key: &'a str, value: Vec<u8>) -> StoreFuture<'a, ()> {
		Box::pin(async move {
			let mut guard = self.inner.write();
			let previous = guard.insert(key.to_owned(), value);

			if let Err(e) = self.persist_locked(&guard) {
				match previous {
					Some(old) => guard.insert(key.to_owned(), old),
					None => guard.remove(key),
				};

				return Err(e);
			}

			Ok(())
		})
	}

	fn delete<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()> {
		Box::pin(async move {
			let mut guard = self.inner.write();

			let Some(old) = guard.remove(key) else {
				return Ok(());
			};

			if let Err(e) = self.persist_locked(&guard) {
				guard.insert(key.to_owned(), old);

				return Err(e);
			}

			Ok(())
		})
	}

	fn list<'a>(&'a self, prefix: &'a str) -> StoreFuture<'a, Vec<String>> {
		Box::pin(async move { Ok(store::list_children(self.inner.read().keys(), prefix)) })
	}
}

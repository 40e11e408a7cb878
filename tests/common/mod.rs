#![allow(dead_code)]

// std
use std::{env, path::PathBuf, process, sync::Arc};
// crates.io
use serde_json::{Value, json};
use time::{Duration, OffsetDateTime};
// self
use hydra_broker::{
	backend::{Backend, BackendSettings, Operation, Request, Response},
	schema::RawData,
	secret::LeasedSecret,
	store::Storage,
};

pub const ROLE: &str = "web";

pub fn fields(value: Value) -> RawData {
	value.as_object().cloned().expect("Fixture fields should be a JSON object.")
}

/// Hydra-backed backend whose journal sweeps do not wait for entries to age.
pub fn hydra_backend(store: Arc<dyn Storage>) -> Backend {
	Backend::hydra(store, BackendSettings::default().with_rollback_min_age(Duration::ZERO))
}

pub async fn configure(backend: &Backend, admin_url: &str, public_url: &str, client_id: &str) {
	let response = backend
		.handle(Request::new(Operation::Write, "config/root").with_data(fields(json!({
			"admin_url": admin_url,
			"public_url": public_url,
			"client_id": client_id,
			"client_secret": if client_id.is_empty() { "" } else { "admin-secret" },
		}))))
		.await
		.expect("Config write should succeed.");

	assert_eq!(response, Response::Empty);
}

pub async fn write_role(backend: &Backend) {
	let response = backend
		.handle(Request::new(Operation::Write, format!("roles/{ROLE}")).with_data(fields(json!({
			"grant_types": "client_credentials",
			"response_types": ["token"],
			"allowed_scopes": "read,write",
			"lease": "2h",
		}))))
		.await
		.expect("Role write should succeed.");

	assert_eq!(response, Response::Empty);
}

pub async fn issue(backend: &Backend) -> LeasedSecret {
	match backend
		.handle(Request::new(Operation::Read, format!("creds/{ROLE}")).with_display_name("ops"))
		.await
		.expect("Creds read should succeed.")
	{
		Response::Secret(secret) => secret,
		other => panic!("Creds read should return a secret, got {other:?}."),
	}
}

pub fn temp_path(label: &str) -> PathBuf {
	let unique = format!(
		"hydra_broker_{label}_{}_{}.json",
		process::id(),
		OffsetDateTime::now_utc().unix_timestamp_nanos(),
	);

	env::temp_dir().join(unique)
}

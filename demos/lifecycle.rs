//! Walks one credential through its whole lifecycle against a mocked Hydra admin API: configure,
//! write a role, mint, renew, and revoke.

// std
use std::{sync::Arc, time::Duration as StdDuration};
// crates.io
use color_eyre::{Result, eyre::eyre};
use httpmock::prelude::*;
use serde_json::json;
// self
use hydra_broker::{
	backend::{Backend, BackendSettings, Operation, Request, Response},
	reqwest::Client,
	store::{MemoryStore, Storage},
	upstream::HydraConnector,
};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let server = MockServer::start_async().await;
	let create_mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/clients").header("x-forwarded-proto", "https");
			then.status(201)
				.header("content-type", "application/json")
				.body(r#"{"client_id":"demo-client","client_secret":"demo-secret"}"#);
		})
		.await;
	let delete_mock = server
		.mock_async(|when, then| {
			when.method(DELETE).path("/clients/demo-client");
			then.status(204);
		})
		.await;
	let store: Arc<dyn Storage> = Arc::new(MemoryStore::default());
	let connector =
		HydraConnector::with_client(Client::builder().timeout(StdDuration::from_secs(10)).build()?);
	let backend = Backend::new(store, Arc::new(connector), BackendSettings::default());
	let config =
		json!({ "admin_url": server.base_url(), "public_url": "https://hydra.example.com" });
	let role = json!({ "grant_types": "client_credentials", "allowed_scopes": "read,write" });

	for (path, data) in [("config/root", config), ("roles/web", role)] {
		let data =
			data.as_object().cloned().ok_or_else(|| eyre!("{path} fields are not an object"))?;

		if let Response::Error(message) =
			backend.handle(Request::new(Operation::Write, path).with_data(data)).await?
		{
			return Err(eyre!("{path} write rejected: {message}"));
		}
	}

	let Response::Secret(secret) = backend
		.handle(Request::new(Operation::Read, "creds/web").with_display_name("demo"))
		.await?
	else {
		return Err(eyre!("creds/web did not return a secret"));
	};

	println!("Minted client {} valid until {}.", secret.data.client_id, secret.lease.expires_at());

	let renewed = backend.renew(&secret, Some(time::Duration::minutes(30))).await?;

	println!("Renewed until {}.", renewed.lease.expires_at());

	backend.revoke(&renewed).await?;

	println!("Revoked; pending rollbacks: {}.", backend.journal().pending().await?.len());

	create_mock.assert_async().await;
	delete_mock.assert_async().await;

	Ok(())
}

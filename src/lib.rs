//! Leased, revocable OAuth 2.0 client credentials minted on demand against an ORY Hydra admin
//! API.
//!
//! Operators write a root [`config::Configuration`] and named [`role::Role`]s; each credential
//! read creates a brand-new Hydra client and hands it back as a [`secret::LeasedSecret`].
//! Revocation goes through a durable [`journal::RollbackJournal`] so a failed or interrupted
//! delete is retried until Hydra confirms it.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use hydra_broker::{
//! 	backend::{Backend, BackendSettings, Operation, Request},
//! 	store::FileStore,
//! };
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(FileStore::open("/var/lib/hydra-broker/state.json")?);
//! let backend = Backend::hydra(store, BackendSettings::default());
//! let response = backend.handle(Request::new(Operation::Read, "creds/web")).await?;
//! # let _ = response;
//! # Ok(())
//! # }
//! ```

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod backend;
pub mod config;
pub mod duration;
pub mod error;
pub mod http;
pub mod issuer;
pub mod journal;
pub mod lease;
pub mod obs;
pub mod role;
pub mod schema;
pub mod secret;
pub mod store;
pub mod upstream;

#[cfg(test)]
mod _preludet {
	//! Convenience re-exports and a recording upstream stub for unit tests.

	pub use crate::_prelude::*;

	// self
	use crate::{
		config::Configuration,
		error::UpstreamError,
		secret::ClientSecret,
		upstream::{
			ClientRequest, CreatedClient, IdentityProvider, ProviderConnector, UpstreamFuture,
		},
	};

	#[derive(Debug, Default)]
	struct StubState {
		clients: BTreeMap<String, ClientRequest>,
		next_id: u64,
		create_calls: usize,
		delete_calls: usize,
		last_request: Option<ClientRequest>,
		fail_creates: bool,
		fail_deletes: bool,
	}
	impl StubState {
		fn mint_id(&mut self) -> String {
			self.next_id += 1;

			format!("stub-client-{}", self.next_id)
		}
	}

	/// In-process identity provider recording every call; clones share state.
	#[derive(Clone, Debug, Default)]
	pub struct StubProvider(Arc<Mutex<StubState>>);
	impl StubProvider {
		/// Number of `create_client` calls observed.
		pub fn create_calls(&self) -> usize {
			self.0.lock().create_calls
		}

		/// Number of `delete_client` calls observed.
		pub fn delete_calls(&self) -> usize {
			self.0.lock().delete_calls
		}

		/// Most recent create request.
		pub fn last_request(&self) -> Option<ClientRequest> {
			self.0.lock().last_request.clone()
		}

		/// Makes subsequent creates fail with a server error.
		pub fn fail_creates(&self, fail: bool) {
			self.0.lock().fail_creates = fail;
		}

		/// Makes subsequent deletes fail with a server error.
		pub fn fail_deletes(&self, fail: bool) {
			self.0.lock().fail_deletes = fail;
		}

		/// Registers a client without going through `create_client`.
		pub fn seed_client(&self) -> String {
			let mut state = self.0.lock();
			let id = state.mint_id();

			state.clients.insert(id.clone(), ClientRequest {
				grant_types: vec!["client_credentials".into()],
				redirect_uris: Vec::new(),
				scope: String::new(),
				response_types: Vec::new(),
			});

			id
		}

		/// Ids of the clients that currently exist.
		pub fn clients(&self) -> Vec<String> {
			self.0.lock().clients.keys().cloned().collect()
		}
	}
	impl ProviderConnector for StubProvider {
		fn connect(&self, _: &Configuration) -> Result<Arc<dyn IdentityProvider>> {
			Ok(Arc::new(self.clone()))
		}
	}
	impl IdentityProvider for StubProvider {
		fn create_client<'a>(
			&'a self,
			request: &'a ClientRequest,
		) -> UpstreamFuture<'a, CreatedClient> {
			let mut state = self.0.lock();

			state.create_calls += 1;
			state.last_request = Some(request.clone());

			let result = if state.fail_creates {
				Err(UpstreamError::Status {
					status: 500,
					message: "stub create failure".into(),
					retry_after: None,
				})
			} else {
				let client_id = state.mint_id();

				state.clients.insert(client_id.clone(), request.clone());

				Ok(CreatedClient {
					client_secret: ClientSecret::new(format!("{client_id}-secret")),
					client_id,
				})
			};

			Box::pin(async move { result })
		}

		fn delete_client<'a>(&'a self, id: &'a str) -> UpstreamFuture<'a, ()> {
			let mut state = self.0.lock();

			state.delete_calls += 1;

			let result = if state.fail_deletes {
				Err(UpstreamError::Status {
					status: 503,
					message: "stub delete failure".into(),
					retry_after: None,
				})
			} else if state.clients.remove(id).is_some() {
				Ok(())
			} else {
				Err(UpstreamError::NotFound { id: id.to_owned() })
			};

			Box::pin(async move { result })
		}
	}
}

mod _prelude {
	pub use std::{
		collections::BTreeMap,
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		sync::Arc,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

pub use reqwest;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _};

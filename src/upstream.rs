//! Upstream identity provider contract.
//!
//! [`ProviderConnector`] builds a fresh [`IdentityProvider`] from the stored configuration for
//! every issuance and every rollback; connections are never cached across operations.

pub mod hydra;

pub use hydra::{HydraAdminClient, HydraConnector};

// self
use crate::{_prelude::*, config::Configuration, error::UpstreamError, secret::ClientSecret};

/// Boxed future returned by [`IdentityProvider`] operations.
pub type UpstreamFuture<'a, T> =
	Pin<Box<dyn Future<Output = Result<T, UpstreamError>> + 'a + Send>>;

/// Client registration sent upstream.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientRequest {
	/// OAuth 2.0 grant types.
	pub grant_types: Vec<String>,
	/// Allowed redirect URIs.
	pub redirect_uris: Vec<String>,
	/// Space-delimited scope string.
	pub scope: String,
	/// OAuth 2.0 response types.
	pub response_types: Vec<String>,
}

/// Client created upstream.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedClient {
	/// Upstream client id.
	pub client_id: String,
	/// Upstream client secret.
	pub client_secret: ClientSecret,
}

/// Operations the backend needs from the identity provider.
pub trait IdentityProvider
where
	Self: Send + Sync,
{
	/// Registers a new OAuth 2.0 client.
	fn create_client<'a>(&'a self, request: &'a ClientRequest) -> UpstreamFuture<'a, CreatedClient>;

	/// Deletes a client; yields [`UpstreamError::NotFound`] when it does not exist.
	fn delete_client<'a>(&'a self, id: &'a str) -> UpstreamFuture<'a, ()>;
}

/// Builds an [`IdentityProvider`] for the current configuration.
pub trait ProviderConnector
where
	Self: Send + Sync,
{
	/// Connects using `config`; invalid endpoints are configuration errors.
	fn connect(&self, config: &Configuration) -> Result<Arc<dyn IdentityProvider>>;
}
